//! Loader configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`crate::CommentsLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Total attempts a loader may make, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// How long a cancelled attempt waits for in-flight stages to settle
    /// before aborting them, in milliseconds.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    /// Optional deadline applied to every attempt, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_drain_timeout_ms() -> u64 {
    250
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            drain_timeout_ms: default_drain_timeout_ms(),
            attempt_timeout_ms: None,
        }
    }
}

impl LoaderConfig {
    /// Creates a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the drain timeout.
    #[must_use]
    pub fn with_drain_timeout_ms(mut self, timeout: u64) -> Self {
        self.drain_timeout_ms = timeout;
        self
    }

    /// Sets the per-attempt deadline.
    #[must_use]
    pub fn with_attempt_timeout_ms(mut self, timeout: u64) -> Self {
        self.attempt_timeout_ms = Some(timeout);
        self
    }

    /// Returns the drain timeout as a duration.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Returns the per-attempt deadline as a duration.
    #[must_use]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt budget is zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be at least 1");
        }
        if self.attempt_timeout_ms == Some(0) {
            anyhow::bail!("attempt_timeout_ms must be positive when set");
        }
        Ok(())
    }
}
