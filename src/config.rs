use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{QueueError, QueueResult};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;
pub const DEFAULT_WORKER_POLL_INTERVAL: f64 = 1.0;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 300;

/// A consistent point-in-time view of every tunable parameter.
///
/// Scheduling and backoff decisions each take a fresh snapshot, so a config
/// change applies to the next decision, never retroactively.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    /// Default retry ceiling for jobs enqueued without one
    pub max_retries: u32,

    /// Base of the exponential backoff (delay = base ^ attempts seconds)
    pub backoff_base: f64,

    /// Idle worker sleep between claim attempts, in seconds
    pub worker_poll_interval: f64,

    /// Hard wall-clock deadline for a single execution, in seconds
    pub job_timeout: u64,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            worker_poll_interval: DEFAULT_WORKER_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

impl ConfigSnapshot {
    /// Poll interval as a std Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.worker_poll_interval)
    }

    /// Job timeout as a std Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout)
    }
}

/// Runtime-tunable parameters shared by the scheduler, backoff policy and
/// worker pool. Writes validate key and range and are all-or-nothing.
pub struct ConfigStore {
    inner: RwLock<ConfigSnapshot>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ConfigSnapshot::default()),
        }
    }

    /// Take a consistent snapshot of all parameters
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.inner.read().clone()
    }

    /// All parameters as a JSON mapping, for the config API
    pub fn get_all(&self) -> Value {
        let cfg = self.inner.read();
        json!({
            "max_retries": cfg.max_retries,
            "backoff_base": cfg.backoff_base,
            "worker_poll_interval": cfg.worker_poll_interval,
            "job_timeout": cfg.job_timeout,
        })
    }

    /// Update a single parameter.
    ///
    /// Rejects unknown keys and out-of-range values without touching the
    /// stored config. Kebab-case aliases (`max-retries`) are accepted since
    /// the control panel historically sent them.
    pub fn set(&self, key: &str, value: &Value) -> QueueResult<()> {
        let normalized = key.replace('-', "_");

        match normalized.as_str() {
            "max_retries" => {
                let v = as_u64(&normalized, value)?;
                if v > 100 {
                    return Err(QueueError::invalid_config_value(
                        &normalized,
                        "must be between 0 and 100",
                    ));
                }
                self.inner.write().max_retries = v as u32;
            }
            "backoff_base" => {
                let v = as_f64(&normalized, value)?;
                if !v.is_finite() || !(1.0..=60.0).contains(&v) {
                    return Err(QueueError::invalid_config_value(
                        &normalized,
                        "must be between 1.0 and 60.0",
                    ));
                }
                self.inner.write().backoff_base = v;
            }
            "worker_poll_interval" => {
                let v = as_f64(&normalized, value)?;
                if !v.is_finite() || !(0.01..=3600.0).contains(&v) {
                    return Err(QueueError::invalid_config_value(
                        &normalized,
                        "must be between 0.01 and 3600 seconds",
                    ));
                }
                self.inner.write().worker_poll_interval = v;
            }
            "job_timeout" => {
                let v = as_u64(&normalized, value)?;
                if !(1..=86_400).contains(&v) {
                    return Err(QueueError::invalid_config_value(
                        &normalized,
                        "must be between 1 and 86400 seconds",
                    ));
                }
                self.inner.write().job_timeout = v;
            }
            _ => return Err(QueueError::InvalidConfigKey(key.to_string())),
        }

        Ok(())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

fn as_u64(key: &str, value: &Value) -> QueueResult<u64> {
    value
        .as_u64()
        .ok_or_else(|| QueueError::invalid_config_value(key, "must be a non-negative integer"))
}

fn as_f64(key: &str, value: &Value) -> QueueResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| QueueError::invalid_config_value(key, "must be a number"))
}
