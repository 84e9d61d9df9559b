//! Ports (traits) the signer depends on
//!
//! These traits are the seams between the signing core and the transport
//! that reaches physical tokens. The core depends on these abstractions,
//! never on a concrete transport.

mod deadline;
mod device_factory;
mod device_handle;

#[cfg(test)]
pub mod contract_tests;

pub use deadline::{Countdown, Deadline};
pub use device_factory::DeviceFactory;
pub use device_handle::DeviceHandle;
