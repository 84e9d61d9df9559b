//! Scripted token for exercising the signer
//!
//! Replies are queued per operation (and per key handle for signing); every
//! call is counted so tests can assert which requests reached the device.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::model::{DeviceId, KeyHandle, SignMode, StatusCode};
use crate::ports::{DeviceFactory, DeviceHandle};

pub const SCRIPTED_VERSION: &str = "U2F_V2";

#[derive(Debug)]
struct Script {
    open_replies: VecDeque<(StatusCode, bool)>,
    version_reply: Result<Vec<u8>, StatusCode>,
    sign_replies: HashMap<KeyHandle, VecDeque<StatusCode>>,
    unscripted_sign: StatusCode,
    open_latency: Duration,
    sign_latency: Duration,
    open_calls: usize,
    open_modes: Vec<SignMode>,
    version_calls: usize,
    sign_calls: Vec<KeyHandle>,
    close_calls: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            open_replies: VecDeque::new(),
            version_reply: Ok(SCRIPTED_VERSION.as_bytes().to_vec()),
            sign_replies: HashMap::new(),
            unscripted_sign: StatusCode::WrongData,
            open_latency: Duration::ZERO,
            sign_latency: Duration::ZERO,
            open_calls: 0,
            open_modes: Vec::new(),
            version_calls: 0,
            sign_calls: Vec::new(),
            close_calls: 0,
        }
    }
}

/// Payload the scripted device returns for an `Ok` sign
pub fn scripted_signature(key_handle: &KeyHandle) -> Vec<u8> {
    let mut info = b"signed:".to_vec();
    info.extend_from_slice(key_handle.as_bytes());
    info
}

/// Clones share the script and the closed flag; see [`reopened`](Self::reopened).
#[derive(Debug, Clone, Default)]
pub struct ScriptedDevice {
    script: Arc<Mutex<Script>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh handle onto the same script, as a new open would produce
    pub fn reopened(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Queue open replies; each carries a handle. Once drained, opens succeed.
    pub fn script_opens(self, replies: impl IntoIterator<Item = StatusCode>) -> Self {
        self.script()
            .open_replies
            .extend(replies.into_iter().map(|status| (status, true)));
        self
    }

    /// Queue one open reply that carries no handle
    pub fn script_open_without_handle(self, status: StatusCode) -> Self {
        self.script().open_replies.push_back((status, false));
        self
    }

    pub fn with_version_reply(self, reply: Result<&str, StatusCode>) -> Self {
        self.script().version_reply = reply.map(|v| v.as_bytes().to_vec());
        self
    }

    /// Queue sign replies for `key_handle`; once drained, the unscripted reply applies
    pub fn script_sign(
        self,
        key_handle: &KeyHandle,
        replies: impl IntoIterator<Item = StatusCode>,
    ) -> Self {
        self.script()
            .sign_replies
            .entry(key_handle.clone())
            .or_default()
            .extend(replies);
        self
    }

    pub fn with_unscripted_sign(self, status: StatusCode) -> Self {
        self.script().unscripted_sign = status;
        self
    }

    pub fn with_open_latency(self, latency: Duration) -> Self {
        self.script().open_latency = latency;
        self
    }

    pub fn with_sign_latency(self, latency: Duration) -> Self {
        self.script().sign_latency = latency;
        self
    }

    pub fn open_calls(&self) -> usize {
        self.script().open_calls
    }

    pub fn open_modes(&self) -> Vec<SignMode> {
        self.script().open_modes.clone()
    }

    pub fn version_calls(&self) -> usize {
        self.script().version_calls
    }

    pub fn sign_calls_for(&self, key_handle: &KeyHandle) -> usize {
        self.script()
            .sign_calls
            .iter()
            .filter(|called| *called == key_handle)
            .count()
    }

    pub fn sign_calls(&self) -> Vec<KeyHandle> {
        self.script().sign_calls.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.script().close_calls
    }
}

#[async_trait]
impl DeviceHandle for ScriptedDevice {
    async fn version(&self) -> Result<Vec<u8>, StatusCode> {
        let mut script = self.script();
        script.version_calls += 1;
        script.version_reply.clone()
    }

    async fn sign(
        &self,
        _challenge_hash: &[u8; 32],
        _app_id_hash: &[u8; 32],
        key_handle: &KeyHandle,
        _no_wink: bool,
    ) -> Result<Vec<u8>, StatusCode> {
        let (latency, reply) = {
            let mut script = self.script();
            script.sign_calls.push(key_handle.clone());
            if self.is_closed() {
                return Err(StatusCode::Gone);
            }
            let unscripted = script.unscripted_sign;
            let reply = script
                .sign_replies
                .get_mut(key_handle)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(unscripted);
            (script.sign_latency, reply)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match reply {
            StatusCode::Ok => Ok(scripted_signature(key_handle)),
            other => Err(other),
        }
    }

    async fn close_when_idle(&self) {
        self.script().close_calls += 1;
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory that always opens the same scripted device
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    device: ScriptedDevice,
}

impl ScriptedFactory {
    pub fn new(device: ScriptedDevice) -> Self {
        Self { device }
    }
}

#[async_trait]
impl DeviceFactory for ScriptedFactory {
    type Device = ScriptedDevice;

    async fn open(
        &self,
        _device_id: &DeviceId,
        mode: SignMode,
        _log_url: Option<&str>,
    ) -> (StatusCode, Option<Self::Device>) {
        let (latency, reply) = {
            let mut script = self.device.script();
            script.open_calls += 1;
            script.open_modes.push(mode);
            let reply = script
                .open_replies
                .pop_front()
                .unwrap_or((StatusCode::Ok, true));
            (script.open_latency, reply)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let (status, with_handle) = reply;
        (status, with_handle.then(|| self.device.reopened()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_contract_tests_for;
    use crate::ports::contract_tests::device_contract;

    device_contract_tests_for!(
        scripted_device_contract,
        make = ScriptedDevice::new,
        tests = {
            test_version_is_reported => device_contract::test_version_is_reported,
            test_sign_foreign_key_handle_is_wrong_data => device_contract::test_sign_foreign_key_handle_is_wrong_data,
            test_close_when_idle_returns => device_contract::test_close_when_idle_returns,
            test_closed_handle_is_gone => device_contract::test_closed_handle_is_gone,
        }
    );

    #[tokio::test]
    async fn test_scripted_sign_replies_then_fallback() {
        let key_handle = KeyHandle::from(vec![1; 8]);
        let device = ScriptedDevice::new().script_sign(&key_handle, [StatusCode::Busy, StatusCode::Ok]);

        let first = device.sign(&[0; 32], &[0; 32], &key_handle, false).await;
        let second = device.sign(&[0; 32], &[0; 32], &key_handle, false).await;
        let third = device.sign(&[0; 32], &[0; 32], &key_handle, false).await;

        assert_eq!(first.unwrap_err(), StatusCode::Busy);
        assert_eq!(second.unwrap(), scripted_signature(&key_handle));
        assert_eq!(third.unwrap_err(), StatusCode::WrongData);
        assert_eq!(device.sign_calls_for(&key_handle), 3);
    }

    #[tokio::test]
    async fn test_factory_replays_open_script() {
        let device = ScriptedDevice::new()
            .script_opens([StatusCode::Busy])
            .script_open_without_handle(StatusCode::Gone);
        let factory = ScriptedFactory::new(device.clone());
        let id = DeviceId::new("scripted", 0);

        let (status, handle) = factory.open(&id, SignMode::Enroll, None).await;
        assert_eq!(status, StatusCode::Busy);
        assert!(handle.is_some());

        let (status, handle) = factory.open(&id, SignMode::Enroll, None).await;
        assert_eq!(status, StatusCode::Gone);
        assert!(handle.is_none());

        let (status, handle) = factory.open(&id, SignMode::Sign, None).await;
        assert_eq!(status, StatusCode::Ok);
        let handle = handle.unwrap();
        handle.close_when_idle().await;
        assert!(handle.is_closed());
        assert!(!factory.open(&id, SignMode::Sign, None).await.1.unwrap().is_closed());
        assert_eq!(device.open_calls(), 4);
        assert_eq!(
            device.open_modes(),
            vec![SignMode::Enroll, SignMode::Enroll, SignMode::Sign, SignMode::Sign]
        );
    }
}
