use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Job queue and idempotency settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Attempts per job before it is given up (first run included).
    /// TOML: `pipeline.max_attempts`. Default: `3`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Jobs executed concurrently by the worker.
    /// TOML: `pipeline.worker_concurrency`. Default: `4`.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Bounded queue capacity between the queue actor and the worker.
    /// TOML: `pipeline.queue_capacity`. Default: `1000`.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Age after which a `reserved` idempotency key is considered abandoned.
    /// TOML: `pipeline.idempotency_ttl_secs`. Default: `1800` (30 minutes).
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Lower bound of the exponential delay between job attempts.
    /// TOML: `pipeline.retry_min_delay_ms`. Default: `2000`.
    #[serde(default = "default_retry_min_delay_ms")]
    pub retry_min_delay_ms: u64,

    /// Upper bound of the exponential delay between job attempts.
    /// TOML: `pipeline.retry_max_delay_ms`. Default: `60000`.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl PipelineConfig {
    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    pub fn retry_min_delay(&self) -> Duration {
        Duration::from_millis(self.retry_min_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms.max(self.retry_min_delay_ms))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            worker_concurrency: default_worker_concurrency(),
            queue_capacity: default_queue_capacity(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            retry_min_delay_ms: default_retry_min_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> usize {
    3
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_idempotency_ttl_secs() -> u64 {
    30 * 60
}

fn default_retry_min_delay_ms() -> u64 {
    2_000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}
