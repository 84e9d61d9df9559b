//! Error types for tokensign
//!
//! Device outcomes travel as [`StatusCode`] values and are resolved inside the
//! signer; only the caller-facing API surfaces [`SignerError`]. The top-level
//! [`TokenSignError`] collects every error the crate can produce.

use thiserror::Error;

use crate::model::{DeviceId, StatusCode, StatusParseError};
use crate::signer::SignerState;

/// Result type alias for signer API calls
pub type SignerResult<T> = Result<T, SignerError>;

/// Top-level error type for all tokensign operations
#[derive(Error, Debug)]
pub enum TokenSignError {
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    /// A device outcome surfaced outside the signer (e.g. by the CLI)
    #[error("Device error: {0}")]
    Device(#[from] StatusCode),

    #[error("Status parse error: {0}")]
    StatusParse(#[from] StatusParseError),
}

/// Errors returned to the caller driving a signer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Challenges can be submitted only once per signer
    #[error("challenges were already submitted to the signer for {device}")]
    AlreadySubmitted { device: DeviceId },

    /// The signer is past the point where it can use new challenges
    #[error("signer for {device} cannot accept challenges while {state:?}")]
    Refused { device: DeviceId, state: SignerState },

    /// The signer task has exited
    #[error("signer for {device} has stopped")]
    Stopped { device: DeviceId },
}
