use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal stable event protocol for structured observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was created in the store
    Enqueued {
        job_id: String,
        at: DateTime<Utc>,
    },

    /// Job was claimed by a worker
    Claimed {
        job_id: String,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// Job completed successfully
    Completed {
        job_id: String,
        at: DateTime<Utc>,
    },

    /// Job failed with budget remaining; retry scheduled
    Retrying {
        job_id: String,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Job exhausted its retry budget and entered the DLQ
    Dead {
        job_id: String,
        error: String,
        at: DateTime<Utc>,
    },

    /// Manual retry pulled the job out of the DLQ
    RetryRequested {
        job_id: String,
        at: DateTime<Utc>,
    },

    /// Job was deleted from the store
    Deleted {
        job_id: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Claimed { .. } => "claimed",
            Self::Completed { .. } => "completed",
            Self::Retrying { .. } => "retrying",
            Self::Dead { .. } => "dead",
            Self::RetryRequested { .. } => "retry_requested",
            Self::Deleted { .. } => "deleted",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &str {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Claimed { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Dead { job_id, .. }
            | Self::RetryRequested { job_id, .. }
            | Self::Deleted { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Claimed { at, .. }
            | Self::Completed { at, .. }
            | Self::Retrying { at, .. }
            | Self::Dead { at, .. }
            | Self::RetryRequested { at, .. }
            | Self::Deleted { at, .. } => at,
        }
    }
}
