//! Adapters - concrete implementations of ports (traits)

mod soft_token;

#[cfg(test)]
pub mod scripted_device;

pub use soft_token::{SoftToken, SoftTokenFactory, SoftTokenHandle, SOFT_TOKEN_VERSION};
