//! Single-device signer
//!
//! A [`SingleSigner`] opens one token, queries its version, then walks the
//! submitted challenges until the outcome is decided:
//!
//! - for [`SignMode::Sign`], success is any challenge the token signs;
//! - for [`SignMode::Enroll`], success is every challenge coming back as
//!   wrong data, meaning the token is not yet registered for any app id.
//!
//! The completion sink fires at most once. On success the device handle is
//! moved into the [`Completion`]; on failure the signer closes it first.
//! Closing the signer (or dropping every handle to it) before an outcome
//! abandons the attempt and the sink never fires.

mod actor;
mod config;
mod state;


use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{SignerError, SignerResult};
use crate::model::{Challenge, DeviceId, SignMode};
use crate::ports::{Deadline, DeviceFactory};
use actor::SignerActor;
use state::Command;

pub use config::{SignerConfig, OPEN_RETRY_DELAY, TOUCH_RETRY_DELAY};
pub use state::{Completion, SignerSnapshot, SignerState};

/// Handle onto a running signer task
#[derive(Debug, Clone)]
pub struct SingleSigner {
    device_id: DeviceId,
    commands: mpsc::UnboundedSender<Command>,
}

impl SingleSigner {
    /// Start a signer for `device_id` on the current tokio runtime
    ///
    /// Nothing is sent to the device until [`open`](Self::open) or
    /// [`submit_challenges`](Self::submit_challenges) is called.
    pub fn spawn<F, T, S>(
        factory: Arc<F>,
        device_id: DeviceId,
        mode: SignMode,
        sink: S,
        deadline: T,
        config: SignerConfig,
    ) -> Self
    where
        F: DeviceFactory,
        T: Deadline,
        S: FnOnce(Completion<F::Device>) + Send + 'static,
    {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let actor = SignerActor::new(
            factory,
            device_id.clone(),
            mode,
            sink,
            deadline,
            config,
            commands_rx,
        );
        tokio::spawn(actor.run());

        Self {
            device_id,
            commands,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Open the device now rather than on submission. Idempotent.
    pub fn open(&self) {
        self.send(Command::Open);
    }

    /// Hand over the full challenge list
    ///
    /// # Errors
    ///
    /// - [`SignerError::AlreadySubmitted`] on every call after the first
    /// - [`SignerError::Refused`] when the signer is busy or already finished
    /// - [`SignerError::Stopped`] when the signer task is gone
    pub async fn submit_challenges(&self, challenges: Vec<Challenge>) -> SignerResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit { challenges, reply })
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())?
    }

    /// Abandon the signer, closing its device if one is held. Idempotent.
    pub fn close(&self) {
        self.send(Command::Close);
    }

    pub async fn snapshot(&self) -> SignerResult<SignerSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Snapshot { reply })
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(device = %self.device_id, "signer already stopped");
        }
    }

    fn stopped(&self) -> SignerError {
        SignerError::Stopped {
            device: self.device_id.clone(),
        }
    }
}

/// A completion sink paired with the receiver it resolves
///
/// The receiver errors if the signer is abandoned without an outcome.
pub fn completion_channel<D: Send + Sync + 'static>() -> (
    impl FnOnce(Completion<D>) + Send + 'static,
    oneshot::Receiver<Completion<D>>,
) {
    let (tx, rx) = oneshot::channel();
    let sink = move |completion: Completion<D>| {
        let _ = tx.send(completion);
    };
    (sink, rx)
}
