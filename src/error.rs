use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Engine-level errors surfaced to API callers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("job with id '{0}' already exists")]
    DuplicateId(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("unknown configuration key: {0}")]
    InvalidConfigKey(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidConfigValue { key: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_config_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Job execution outcome - handled locally by the state machine's backoff
/// decision, never propagated as an engine error
#[derive(Error, Debug, Clone)]
pub enum JobFailure {
    /// Command exited nonzero or could not be executed
    #[error("{0}")]
    Failed(String),

    /// Command exceeded the job timeout and was terminated
    #[error("timed out after {0}s")]
    TimedOut(u64),

    /// Job sat in processing past its lease; reclaimed by the watchdog
    #[error("worker unresponsive")]
    Unresponsive,
}

impl JobFailure {
    /// Create an execution failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Get the failure detail recorded on the job
    pub fn message(&self) -> String {
        self.to_string()
    }
}
