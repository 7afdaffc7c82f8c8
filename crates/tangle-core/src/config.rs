//! Runtime configuration for the store and indexing pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration supplied by the embedding application.
///
/// All fields have defaults so a partial config deserializes cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Maximum index operations accumulated before a bulk submission
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum time a batch waits before submission, in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Retries for failed documents and timed-out batches
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Interval between edge expiry sweeps, in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub edge_expiry_sweep_interval_ms: u64,
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_timeout_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_sweep_interval_ms() -> u64 {
    30_000
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            edge_expiry_sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl GraphConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn edge_expiry_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.edge_expiry_sweep_interval_ms)
    }

    /// Backoff delay before the given retry attempt (0-based), doubling
    /// per attempt
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(10);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}
