use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a poller instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Wait between the end of one sweep and the start of the next (default: 60s).
    pub poll_interval: Duration,
    /// Apply a random +/- 1/7 jitter to `poll_interval`.
    pub jitter: bool,
    /// HTTP request timeout for a single status lookup.
    pub request_timeout: Duration,
    /// Total lookup attempts per channel per sweep, including the first.
    pub max_attempts: u32,
    /// Base backoff duration for retries (doubled each attempt).
    pub retry_backoff: Duration,
    /// Upper bound on status lookups in flight during one sweep.
    pub max_concurrent_probes: usize,
    /// Where the channel snapshot is persisted after every sweep.
    pub snapshot_path: PathBuf,
    /// Newline-delimited channel names, used only when no snapshot exists.
    pub seed_path: Option<PathBuf>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            jitter: true,
            request_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            max_concurrent_probes: 4,
            snapshot_path: PathBuf::from("save_data.json"),
            seed_path: None,
        }
    }
}

impl PollConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max.max(1);
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn with_seed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_path = Some(path.into());
        self
    }

    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(self.max_attempts, self.retry_backoff)
    }
}
