//! The task that owns a signer's state and its device handle.
//!
//! Caller commands and device/timer completions arrive on two channels and
//! are applied one at a time. Every completion is checked against the current
//! state before it is acted on, so results that arrive after the signer has
//! moved on (a late open after close, a sign superseded by a terminal
//! outcome) are dropped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, info, warn};

use super::config::SignerConfig;
use super::state::{Command, Completion, Event, SignerSnapshot, SignerState};
use crate::error::{SignerError, SignerResult};
use crate::model::{Challenge, DeviceId, HexCode, KeyHandle, SignMode, StatusCode};
use crate::ports::{Deadline, DeviceFactory, DeviceHandle};

const NO_WINK: bool = false;

enum Input<D> {
    Command(Option<Command>),
    Event(Event<D>),
}

pub(crate) struct SignerActor<F: DeviceFactory, T, S> {
    factory: Arc<F>,
    device_id: DeviceId,
    mode: SignMode,
    config: SignerConfig,
    deadline: T,
    sink: Option<S>,

    state: SignerState,
    challenges: Vec<Challenge>,
    challenges_set: bool,
    cursor: usize,
    not_for_me: HashSet<KeyHandle>,
    device: Option<Arc<F::Device>>,
    version: Option<String>,

    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    events: mpsc::UnboundedReceiver<Event<F::Device>>,
    events_tx: mpsc::UnboundedSender<Event<F::Device>>,
}

impl<F, T, S> SignerActor<F, T, S>
where
    F: DeviceFactory,
    T: Deadline,
    S: FnOnce(Completion<F::Device>) + Send + 'static,
{
    pub(crate) fn new(
        factory: Arc<F>,
        device_id: DeviceId,
        mode: SignMode,
        sink: S,
        deadline: T,
        config: SignerConfig,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            factory,
            device_id,
            mode,
            config,
            deadline,
            sink: Some(sink),
            state: SignerState::Init,
            challenges: Vec::new(),
            challenges_set: false,
            cursor: 0,
            not_for_me: HashSet::new(),
            device: None,
            version: None,
            commands,
            commands_open: true,
            events,
            events_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            if !self.commands_open && self.is_finished() {
                break;
            }

            let input = tokio::select! {
                command = self.commands.recv(), if self.commands_open => Input::Command(command),
                Some(event) = self.events.recv() => Input::Event(event),
                else => break,
            };

            match input {
                Input::Command(Some(command)) => self.handle_command(command),
                Input::Command(None) => {
                    self.commands_open = false;
                    self.abandon();
                }
                Input::Event(event) => self.handle_event(event),
            }
        }
        debug!(device = %self.device_id, "signer task exiting in {:?}", self.state);

        // Opens still in flight now fail to report and close their own handles.
        self.events.close();
        while let Ok(event) = self.events.try_recv() {
            if let Event::Opened {
                device: Some(device),
                ..
            } = event
            {
                tokio::spawn(async move { device.close_when_idle().await });
            }
        }
    }

    fn is_finished(&self) -> bool {
        match self.state {
            SignerState::Closed => true,
            SignerState::Complete => self.device.is_none(),
            _ => false,
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open => self.open(),
            Command::Submit { challenges, reply } => {
                let result = self.submit(challenges);
                let _ = reply.send(result);
            }
            Command::Close => self.abandon(),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_event(&mut self, event: Event<F::Device>) {
        match event {
            Event::Opened { status, device } => self.on_opened(status, device),
            Event::RetryOpen => self.on_retry_open(),
            Event::Version(result) => self.on_version(result),
            Event::Signed { index, result } => self.on_signed(index, result),
            Event::RetrySign => {
                if self.state == SignerState::Signing {
                    self.attempt();
                }
            }
            Event::NoChallenges => {
                // An empty list is expected during enroll (the user has no
                // registered tokens) and degenerate during sign; wrong data
                // is the definitive answer in both cases.
                if self.state == SignerState::Idle {
                    self.fail(StatusCode::WrongData);
                }
            }
            Event::Closed => {
                if self.state == SignerState::Closing {
                    self.device = None;
                    self.state = SignerState::Closed;
                    debug!(device = %self.device_id, "device closed");
                }
            }
        }
    }

    fn open(&mut self) {
        if self.state != SignerState::Init {
            return;
        }
        self.state = SignerState::Opening;
        self.request_open();
    }

    fn request_open(&self) {
        let factory = Arc::clone(&self.factory);
        let device_id = self.device_id.clone();
        let mode = self.mode;
        let log_url = self.config.log_url.clone();
        let events = self.events_tx.clone();

        debug!(device = %self.device_id, "opening ({:?})", mode);
        tokio::spawn(async move {
            let (status, device) = factory.open(&device_id, mode, log_url.as_deref()).await;
            if let Err(SendError(Event::Opened {
                device: Some(device),
                ..
            })) = events.send(Event::Opened { status, device })
            {
                debug!(device = %device_id, "signer gone, closing late handle");
                device.close_when_idle().await;
            }
        });
    }

    fn on_opened(&mut self, status: StatusCode, device: Option<F::Device>) {
        if !matches!(self.state, SignerState::Opening | SignerState::Busy) {
            debug!(device = %self.device_id, "ignoring open completion in {:?}", self.state);
            if let Some(device) = device {
                tokio::spawn(async move { device.close_when_idle().await });
            }
            return;
        }

        match status {
            StatusCode::Ok => match device {
                Some(device) => {
                    let device = Arc::new(device);
                    self.replace_device(Arc::clone(&device));
                    let events = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = device.version().await;
                        let _ = events.send(Event::Version(result));
                    });
                }
                None => {
                    warn!(device = %self.device_id, "open succeeded without a device handle");
                    self.fail(StatusCode::Gone);
                }
            },
            StatusCode::Busy => {
                if let Some(device) = device {
                    self.replace_device(Arc::new(device));
                }
                self.state = SignerState::Busy;
                if self.deadline.is_expired() {
                    self.fail(StatusCode::Busy);
                } else {
                    debug!(device = %self.device_id, "busy, retrying open");
                    self.post_after(self.config.open_retry_delay, Event::RetryOpen);
                }
            }
            other => {
                if let Some(device) = device {
                    self.replace_device(Arc::new(device));
                }
                self.fail(other);
            }
        }
    }

    /// Hold `device`, closing any handle retained from an earlier busy open.
    fn replace_device(&mut self, device: Arc<F::Device>) {
        if let Some(previous) = self.device.replace(device) {
            debug!(device = %self.device_id, "closing superseded handle");
            tokio::spawn(async move { previous.close_when_idle().await });
        }
    }

    fn on_retry_open(&mut self) {
        if self.state != SignerState::Busy {
            return;
        }
        if self.deadline.is_expired() {
            self.fail(StatusCode::Busy);
            return;
        }
        self.request_open();
    }

    fn on_version(&mut self, result: Result<Vec<u8>, StatusCode>) {
        if !matches!(self.state, SignerState::Opening | SignerState::Busy) {
            return;
        }

        match result {
            Ok(version) => {
                let version = String::from_utf8_lossy(&version).into_owned();
                debug!(device = %self.device_id, "device version {}", version);
                self.version = Some(version);
                self.state = SignerState::Idle;
                // Challenges may have been submitted while the device was opening.
                self.attempt();
            }
            Err(status) => self.fail(status),
        }
    }

    fn submit(&mut self, challenges: Vec<Challenge>) -> SignerResult<()> {
        if self.challenges_set {
            return Err(SignerError::AlreadySubmitted {
                device: self.device_id.clone(),
            });
        }

        debug!(device = %self.device_id, "adding {} challenges", challenges.len());
        self.challenges.extend(challenges);
        self.challenges_set = true;

        match self.state {
            SignerState::Init => self.open(),
            SignerState::Opening | SignerState::Signing => {}
            SignerState::Idle => {
                if self.cursor < self.challenges.len() {
                    self.attempt();
                } else {
                    self.post(Event::NoChallenges);
                }
            }
            state => {
                return Err(SignerError::Refused {
                    device: self.device_id.clone(),
                    state,
                })
            }
        }
        Ok(())
    }

    /// Try the challenge at the cursor, or synthesize its outcome when the
    /// device cannot possibly match it.
    fn attempt(&mut self) {
        let Some(device) = self.device.clone() else {
            return;
        };
        if self.deadline.is_expired() {
            // Only part of the challenge set may have been tried, so the
            // outcome is unknown rather than a success.
            self.fail(StatusCode::Timeout);
            return;
        }
        if !self.challenges_set {
            self.state = SignerState::Idle;
            return;
        }

        self.state = SignerState::Signing;
        let index = self.cursor;
        let Some(challenge) = self.challenges.get(index) else {
            self.post_wrong_data(index);
            return;
        };

        if self.not_for_me.contains(&challenge.key_handle) {
            debug!(device = %self.device_id, "challenge {} is a cached miss", index);
            self.post_wrong_data(index);
            return;
        }
        let device_version = self.version.as_deref().unwrap_or_default();
        if challenge.targets_other_version(device_version) {
            debug!(
                device = %self.device_id,
                "challenge {} is for {:?}, device speaks {}",
                index, challenge.version, device_version
            );
            self.post_wrong_data(index);
            return;
        }

        let challenge = challenge.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = device
                .sign(
                    &challenge.challenge_hash,
                    &challenge.app_id_hash,
                    &challenge.key_handle,
                    NO_WINK,
                )
                .await;
            let _ = events.send(Event::Signed { index, result });
        });
    }

    fn on_signed(&mut self, index: usize, result: Result<Vec<u8>, StatusCode>) {
        let status = match &result {
            Ok(_) => StatusCode::Ok,
            Err(status) => *status,
        };
        debug!(
            device = %self.device_id,
            "challenge {} yielded {}",
            index,
            HexCode(status)
        );
        if self.state != SignerState::Signing {
            debug!(device = %self.device_id, "already done");
            return;
        }

        if status == StatusCode::WrongData {
            if let Some(challenge) = self.challenges.get(index) {
                self.not_for_me.insert(challenge.key_handle.clone());
            }
        }

        match status {
            StatusCode::Gone => self.fail(status),
            // TODO: resynchronize with the device before retrying after a timeout.
            StatusCode::Timeout | StatusCode::Busy => self.attempt(),
            StatusCode::Ok => {
                if self.mode.is_enroll() {
                    // Already registered for one of the app ids.
                    self.fail(status);
                    return;
                }
                match self.challenges.get(index).cloned() {
                    Some(challenge) => {
                        let info = result.ok().filter(|info| !info.is_empty());
                        self.succeed(|device| Completion::Signed {
                            device,
                            challenge,
                            info,
                        });
                    }
                    None => self.fail(status),
                }
            }
            StatusCode::WaitTouch => {
                self.post_after(self.config.touch_retry_delay, Event::RetrySign);
            }
            StatusCode::WrongData => {
                if self.has_next() {
                    self.advance();
                } else if self.mode.is_enroll() {
                    self.succeed(|device| Completion::Unenrolled { device });
                } else {
                    self.fail(status);
                }
            }
            other => {
                if !self.mode.is_enroll() && self.has_next() {
                    self.advance();
                } else {
                    self.fail(other);
                }
            }
        }
    }

    fn has_next(&self) -> bool {
        self.cursor + 1 < self.challenges.len()
    }

    fn advance(&mut self) {
        self.cursor += 1;
        self.attempt();
    }

    fn fail(&mut self, status: StatusCode) {
        self.state = SignerState::Complete;
        info!(device = %self.device_id, "failed ({})", HexCode(status));
        // The device can no longer produce a useful result.
        self.close_device();
        self.complete(Completion::Failed { status });
    }

    fn succeed(&mut self, outcome: impl FnOnce(Arc<F::Device>) -> Completion<F::Device>) {
        let Some(device) = self.device.take() else {
            warn!(device = %self.device_id, "success without a device handle");
            self.fail(StatusCode::Gone);
            return;
        };
        self.state = SignerState::Complete;
        let completion = outcome(device);
        info!(
            device = %self.device_id,
            "success ({})",
            HexCode(completion.status())
        );
        self.complete(completion);
    }

    fn complete(&mut self, completion: Completion<F::Device>) {
        if let Some(sink) = self.sink.take() {
            sink(completion);
        }
    }

    /// Tear down at the caller's request: no completion will be delivered.
    fn abandon(&mut self) {
        if self.sink.take().is_some() {
            debug!(device = %self.device_id, "abandoned in {:?}", self.state);
        }
        if self.device.is_some() {
            self.close_device();
        } else if !self.state.is_terminal() {
            self.state = SignerState::Closed;
        }
    }

    fn close_device(&mut self) {
        let Some(device) = self.device.clone() else {
            return;
        };
        if matches!(self.state, SignerState::Closing | SignerState::Closed) {
            return;
        }
        self.state = SignerState::Closing;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            device.close_when_idle().await;
            let _ = events.send(Event::Closed);
        });
    }

    fn snapshot(&self) -> SignerSnapshot {
        SignerSnapshot {
            state: self.state,
            cursor: self.cursor,
            challenge_count: self.challenges.len(),
            challenges_set: self.challenges_set,
            device_version: self.version.clone(),
            holds_device: self.device.is_some(),
            rejected_key_handles: self.not_for_me.iter().cloned().collect(),
        }
    }

    fn post_wrong_data(&self, index: usize) {
        self.post(Event::Signed {
            index,
            result: Err(StatusCode::WrongData),
        });
    }

    fn post(&self, event: Event<F::Device>) {
        let _ = self.events_tx.send(event);
    }

    fn post_after(&self, delay: Duration, event: Event<F::Device>) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        });
    }
}
