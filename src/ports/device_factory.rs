//! DeviceFactory trait - capability to open a token by id

use async_trait::async_trait;

use super::DeviceHandle;
use crate::model::{DeviceId, SignMode, StatusCode};

/// Capability to open a handle onto one enumerated token
///
/// Implemented by the transport layer that multiplexes access to physical
/// tokens. The signer never talks to the transport any other way.
#[async_trait]
pub trait DeviceFactory: Send + Sync + 'static {
    /// The handle type produced by a successful (or busy) open
    type Device: DeviceHandle;

    /// Open the token identified by `device_id`
    ///
    /// # Arguments
    ///
    /// * `device_id` - Which token to open
    /// * `mode` - Whether the caller is enrolling or signing
    /// * `log_url` - Optional endpoint the transport may post diagnostics to
    ///
    /// # Returns
    ///
    /// The open status and, for `Ok` and sometimes `Busy`, the handle.
    async fn open(
        &self,
        device_id: &DeviceId,
        mode: SignMode,
        log_url: Option<&str>,
    ) -> (StatusCode, Option<Self::Device>);
}
