//! Job polling configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_interval_secs() -> u64 {
    30
}

const fn default_grace_secs() -> u64 {
    5
}

const fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    /// Seconds between status checks of a pending or running job.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds to wait after a job settles before trusting its state.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Retried jobs followed before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Overall deadline for one wait, in seconds. Unset means no deadline.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            grace_secs: default_grace_secs(),
            max_retries: default_max_retries(),
            timeout_secs: None,
        }
    }
}

impl PollConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
