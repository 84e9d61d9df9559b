//! In-memory software token
//!
//! Behaves like a U2F token: it answers version queries, rejects key handles
//! it did not mint with `WrongData`, asks for touch when configured to, and
//! signs with a per-credential Ed25519 key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::{rng, RngCore};
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{DeviceId, KeyHandle, SignMode, StatusCode};
use crate::ports::{DeviceFactory, DeviceHandle};

pub const SOFT_TOKEN_VERSION: &str = "U2F_V2";

const KEY_HANDLE_LEN: usize = 64;
const USER_PRESENT: u8 = 0x01;

#[derive(Debug, Default)]
struct SoftTokenState {
    credentials: HashMap<([u8; 32], KeyHandle), SigningKey>,
    counter: u32,
    pending_touches: u32,
    pending_busy_opens: u32,
    next_open_failure: Option<StatusCode>,
}

/// A software token shared by every handle opened onto it
#[derive(Debug)]
pub struct SoftToken {
    version: String,
    state: Mutex<SoftTokenState>,
}

impl SoftToken {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            state: Mutex::new(SoftTokenState::default()),
        }
    }

    /// Mint a credential for `app_id_hash` and return its key handle
    pub async fn register(&self, app_id_hash: [u8; 32]) -> (KeyHandle, VerifyingKey) {
        let mut secret_bytes = [0u8; 32];
        rng().fill_bytes(&mut secret_bytes);
        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let verifying_key = signing_key.verifying_key();

        let mut handle_bytes = vec![0u8; KEY_HANDLE_LEN];
        rng().fill_bytes(&mut handle_bytes);
        let key_handle = KeyHandle::new(handle_bytes);

        let mut state = self.state.lock().await;
        state
            .credentials
            .insert((app_id_hash, key_handle.clone()), signing_key);
        debug!("Registered credential {:?}", key_handle);

        (key_handle, verifying_key)
    }

    /// Answer the next `count` sign requests for known credentials with `WaitTouch`
    pub async fn require_touches(&self, count: u32) {
        self.state.lock().await.pending_touches = count;
    }

    /// Answer the next `count` opens with `Busy`
    pub async fn stay_busy_for(&self, count: u32) {
        self.state.lock().await.pending_busy_opens = count;
    }

    /// Answer the next open with `status` and no handle
    pub async fn fail_next_open(&self, status: StatusCode) {
        self.state.lock().await.next_open_failure = Some(status);
    }

    pub async fn counter(&self) -> u32 {
        self.state.lock().await.counter
    }

    async fn sign(
        &self,
        challenge_hash: &[u8; 32],
        app_id_hash: &[u8; 32],
        key_handle: &KeyHandle,
    ) -> Result<Vec<u8>, StatusCode> {
        let mut state = self.state.lock().await;
        let Some(signing_key) = state
            .credentials
            .get(&(*app_id_hash, key_handle.clone()))
            .cloned()
        else {
            return Err(StatusCode::WrongData);
        };

        if state.pending_touches > 0 {
            state.pending_touches -= 1;
            return Err(StatusCode::WaitTouch);
        }

        state.counter = state.counter.wrapping_add(1);
        let counter = state.counter.to_be_bytes();

        let mut signed_data = Vec::with_capacity(32 + 1 + 4 + 32);
        signed_data.extend_from_slice(app_id_hash);
        signed_data.push(USER_PRESENT);
        signed_data.extend_from_slice(&counter);
        signed_data.extend_from_slice(challenge_hash);
        let signature = signing_key.sign(&signed_data);

        let mut response = Vec::with_capacity(1 + 4 + 64);
        response.push(USER_PRESENT);
        response.extend_from_slice(&counter);
        response.extend_from_slice(&signature.to_bytes());
        Ok(response)
    }
}

/// One open handle onto a [`SoftToken`]
#[derive(Debug)]
pub struct SoftTokenHandle {
    token: Arc<SoftToken>,
    closed: AtomicBool,
}

impl SoftTokenHandle {
    fn new(token: Arc<SoftToken>) -> Self {
        Self {
            token,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceHandle for SoftTokenHandle {
    async fn version(&self) -> Result<Vec<u8>, StatusCode> {
        if self.is_closed() {
            return Err(StatusCode::Gone);
        }
        Ok(self.token.version.as_bytes().to_vec())
    }

    async fn sign(
        &self,
        challenge_hash: &[u8; 32],
        app_id_hash: &[u8; 32],
        key_handle: &KeyHandle,
        _no_wink: bool,
    ) -> Result<Vec<u8>, StatusCode> {
        if self.is_closed() {
            return Err(StatusCode::Gone);
        }
        self.token.sign(challenge_hash, app_id_hash, key_handle).await
    }

    async fn close_when_idle(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory over a fixed set of software tokens
#[derive(Debug, Default)]
pub struct SoftTokenFactory {
    tokens: HashMap<DeviceId, Arc<SoftToken>>,
}

impl SoftTokenFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device_id: DeviceId, token: Arc<SoftToken>) {
        self.tokens.insert(device_id, token);
    }

    pub fn token(&self, device_id: &DeviceId) -> Option<&Arc<SoftToken>> {
        self.tokens.get(device_id)
    }
}

#[async_trait]
impl DeviceFactory for SoftTokenFactory {
    type Device = SoftTokenHandle;

    async fn open(
        &self,
        device_id: &DeviceId,
        mode: SignMode,
        _log_url: Option<&str>,
    ) -> (StatusCode, Option<Self::Device>) {
        let Some(token) = self.tokens.get(device_id) else {
            debug!("No soft token at {}", device_id);
            return (StatusCode::Gone, None);
        };

        let mut state = token.state.lock().await;
        if let Some(status) = state.next_open_failure.take() {
            debug!("Soft token {} refused open ({})", device_id, status);
            return (status, None);
        }

        let handle = SoftTokenHandle::new(Arc::clone(token));
        if state.pending_busy_opens > 0 {
            state.pending_busy_opens -= 1;
            debug!("Soft token {} busy ({:?})", device_id, mode);
            return (StatusCode::Busy, Some(handle));
        }

        (StatusCode::Ok, Some(handle))
    }
}
