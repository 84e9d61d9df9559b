use std::time::Duration;

use tokio::time::Instant;

/// Advisory deadline consulted before each new device operation
pub trait Deadline: Send + 'static {
    fn is_expired(&self) -> bool;
}

/// Deadline measured on the tokio clock from its creation
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    expires_at: Option<Instant>,
}

impl Countdown {
    pub fn new(budget: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + budget),
        }
    }

    /// A countdown that never expires
    pub fn unbounded() -> Self {
        Self { expires_at: None }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

impl Deadline for Countdown {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }
}
