//! Challenge-response signing against a single USB security token.
//!
//! The [`signer`] module drives one token through a list of candidate
//! challenges during enrollment or sign-in. Transports plug in through the
//! traits in [`ports`]; [`adapters`] ships an in-memory software token.

pub mod adapters;
pub mod error;
pub mod model;
pub mod ports;
pub mod signer;

// Re-export commonly used types
pub use error::{SignerError, SignerResult, TokenSignError};
pub use model::{sha256, Challenge, DeviceId, KeyHandle, SignMode, StatusCode};
pub use ports::{Countdown, Deadline, DeviceFactory, DeviceHandle};
pub use signer::{
    completion_channel, Completion, SignerConfig, SignerSnapshot, SignerState, SingleSigner,
};
