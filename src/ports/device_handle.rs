//! DeviceHandle trait - operations on one open token

use async_trait::async_trait;

use crate::model::{KeyHandle, StatusCode};

/// Operations on an open token
///
/// Errors are the token's own status codes; `Ok` is never returned inside
/// `Err`.
#[async_trait]
pub trait DeviceHandle: Send + Sync + 'static {
    /// Query the protocol version string the token speaks
    async fn version(&self) -> Result<Vec<u8>, StatusCode>;

    /// Ask the token to sign `challenge_hash` for `app_id_hash` with `key_handle`
    ///
    /// # Arguments
    ///
    /// * `no_wink` - Suppress the token's "touch me" indicator
    ///
    /// # Returns
    ///
    /// The raw signature response on success. `WrongData` means the key
    /// handle is not this token's, `WaitTouch` means user presence is needed.
    async fn sign(
        &self,
        challenge_hash: &[u8; 32],
        app_id_hash: &[u8; 32],
        key_handle: &KeyHandle,
        no_wink: bool,
    ) -> Result<Vec<u8>, StatusCode>;

    /// Close the handle once any in-flight operation has finished
    async fn close_when_idle(&self);
}
