use std::sync::Arc;

use tokio::sync::oneshot;

use crate::error::SignerResult;
use crate::model::{Challenge, KeyHandle, StatusCode};

/// Lifecycle states of a [`SingleSigner`](super::SingleSigner).
///
/// `Busy` and `Opening` form the open-retry loop; `Idle` and `Signing`
/// alternate while challenges are consumed. Everything from `Complete` on is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignerState {
    /// Nothing requested from the device yet.
    Init,
    /// Waiting for the factory to hand over a handle.
    Opening,
    /// The device opened but reported busy; a re-open is scheduled.
    Busy,
    /// Device open and versioned, no sign in flight.
    Idle,
    /// A sign request (real or synthesized) is outstanding.
    Signing,
    /// An outcome has been decided.
    Complete,
    /// Waiting for the device to close once idle.
    Closing,
    /// The device has been released.
    Closed,
}

impl SignerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Closing | Self::Closed)
    }
}

/// Final result handed to the completion sink.
#[derive(Debug)]
pub enum Completion<D> {
    /// Authentication succeeded; the device now belongs to the receiver.
    Signed {
        device: Arc<D>,
        challenge: Challenge,
        info: Option<Vec<u8>>,
    },
    /// Enrollment succeeded: every challenge came back as wrong data, so the
    /// token is not registered for any supplied app id.
    Unenrolled { device: Arc<D> },
    /// No usable outcome; the signer has already closed the device.
    Failed { status: StatusCode },
}

impl<D> Completion<D> {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Signed { .. } => StatusCode::Ok,
            Self::Unenrolled { .. } => StatusCode::WrongData,
            Self::Failed { status } => *status,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn device(&self) -> Option<&Arc<D>> {
        match self {
            Self::Signed { device, .. } | Self::Unenrolled { device } => Some(device),
            Self::Failed { .. } => None,
        }
    }

    pub fn challenge(&self) -> Option<&Challenge> {
        match self {
            Self::Signed { challenge, .. } => Some(challenge),
            _ => None,
        }
    }

    pub fn info(&self) -> Option<&[u8]> {
        match self {
            Self::Signed { info, .. } => info.as_deref(),
            _ => None,
        }
    }

    pub fn into_device(self) -> Option<Arc<D>> {
        match self {
            Self::Signed { device, .. } | Self::Unenrolled { device } => Some(device),
            Self::Failed { .. } => None,
        }
    }
}

/// Point-in-time view of a signer's internals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSnapshot {
    pub state: SignerState,
    pub cursor: usize,
    pub challenge_count: usize,
    pub challenges_set: bool,
    pub device_version: Option<String>,
    pub holds_device: bool,
    pub rejected_key_handles: Vec<KeyHandle>,
}

/// Requests from the caller-facing handle.
#[derive(Debug)]
pub(crate) enum Command {
    Open,
    Submit {
        challenges: Vec<Challenge>,
        reply: oneshot::Sender<SignerResult<()>>,
    },
    Close,
    Snapshot {
        reply: oneshot::Sender<SignerSnapshot>,
    },
}

/// Completions re-entering the actor from device operations and timers.
#[derive(Debug)]
pub(crate) enum Event<D> {
    Opened {
        status: StatusCode,
        device: Option<D>,
    },
    RetryOpen,
    Version(Result<Vec<u8>, StatusCode>),
    Signed {
        index: usize,
        result: Result<Vec<u8>, StatusCode>,
    },
    RetrySign,
    NoChallenges,
    Closed,
}
