use std::time::Duration;

/// How long to wait before re-opening a device that reported busy
pub const OPEN_RETRY_DELAY: Duration = Duration::from_millis(200);

/// How long to wait before re-sending a sign that needs user presence
pub const TOUCH_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Configuration for one signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerConfig {
    /// Backoff between busy opens
    pub open_retry_delay: Duration,
    /// Backoff between sign attempts waiting on touch
    pub touch_retry_delay: Duration,
    /// Forwarded to the device factory with every open
    pub log_url: Option<String>,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            open_retry_delay: OPEN_RETRY_DELAY,
            touch_retry_delay: TOUCH_RETRY_DELAY,
            log_url: None,
        }
    }
}

impl SignerConfig {
    pub fn with_log_url(mut self, log_url: impl Into<String>) -> Self {
        self.log_url = Some(log_url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backoffs() {
        let config = SignerConfig::default();
        assert_eq!(config.open_retry_delay, Duration::from_millis(200));
        assert_eq!(config.touch_retry_delay, Duration::from_millis(200));
        assert!(config.log_url.is_none());
    }
}
