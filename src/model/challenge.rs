use std::fmt;

use sha2::{Digest, Sha256};

/// Opaque credential identifier minted by a token at registration.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct KeyHandle(Vec<u8>);

impl KeyHandle {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for KeyHandle {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for KeyHandle {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "KeyHandle({}", hex::encode(shown))?;
        if self.0.len() > shown.len() {
            write!(f, "..")?;
        }
        write!(f, ")")
    }
}

/// One candidate the token is asked to sign or reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub challenge_hash: [u8; 32],
    pub app_id_hash: [u8; 32],
    pub key_handle: KeyHandle,
    /// Protocol version the key handle was registered under, if pinned.
    pub version: Option<String>,
}

impl Challenge {
    pub fn new(challenge_hash: [u8; 32], app_id_hash: [u8; 32], key_handle: KeyHandle) -> Self {
        Self {
            challenge_hash,
            app_id_hash,
            key_handle,
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Whether this challenge is pinned to a token version other than `device_version`.
    pub fn targets_other_version(&self, device_version: &str) -> bool {
        match &self.version {
            Some(version) => !version.is_empty() && version != device_version,
            None => false,
        }
    }
}

/// SHA-256 of an app id or client data string.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpinned_challenge_matches_any_version() {
        let challenge = Challenge::new([1; 32], [2; 32], KeyHandle::from(vec![3; 16]));
        assert!(!challenge.targets_other_version("U2F_V2"));
        assert!(!challenge.targets_other_version(""));
    }

    #[test]
    fn test_pinned_challenge_rejects_other_version() {
        let challenge =
            Challenge::new([1; 32], [2; 32], KeyHandle::from(vec![3; 16])).with_version("U2F_V1");
        assert!(challenge.targets_other_version("U2F_V2"));
        assert!(!challenge.targets_other_version("U2F_V1"));
    }

    #[test]
    fn test_key_handle_debug_is_truncated() {
        let handle = KeyHandle::from(vec![0xab; 64]);
        let debug_str = format!("{:?}", handle);
        assert_eq!(debug_str, "KeyHandle(abababababababab..)");
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
