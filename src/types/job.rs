use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job lifecycle states.
///
/// `Failed` is part of the wire contract (filterable, counted) but is
/// transient: a failure collapses into `Pending` (retry scheduled) or `Dead`
/// within the same transition, so no stored job rests in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed (possibly gated by `next_retry_at`)
    Pending,

    /// Claimed by a worker and executing
    Processing,

    /// Finished successfully
    Completed,

    /// Transient failure state; collapses into `Pending` or `Dead`
    Failed,

    /// Retry budget exhausted; parked in the dead-letter queue
    Dead,
}

impl JobState {
    /// Check if the state is terminal without manual intervention
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }

    /// Get the state name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for JobState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            _ => Err(()),
        }
    }
}

/// A single job: the authoritative record held by the job store.
///
/// Transitions go through the `mark_*` methods, which the store calls under
/// its write lock; nothing else mutates a job's fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, immutable for the lifetime of the store
    pub id: String,

    /// The shell command to execute, immutable after creation
    pub command: String,

    /// Current lifecycle state
    pub state: JobState,

    /// Number of execution attempts made so far
    pub attempts: u32,

    /// Per-job ceiling on retries; the job runs at most `max_retries + 1` times
    pub max_retries: u32,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When the job was last transitioned
    pub updated_at: DateTime<Utc>,

    /// Eligibility gate set after a failed attempt; absent means claimable now
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Last failure detail; cleared on completion, retained through `dead`
    pub error_message: Option<String>,

    /// Watchdog deadline while processing; not part of the wire contract
    #[serde(skip)]
    pub lease_until: Option<DateTime<Utc>>,

    /// Claim ownership token, rotated on every claim and required to report
    /// an outcome; not part of the wire contract
    #[serde(skip)]
    pub lease_token: Option<String>,
}

impl Job {
    /// Create a new pending job
    pub fn new(id: String, command: String, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            command,
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            next_retry_at: None,
            error_message: None,
            lease_until: None,
            lease_token: None,
        }
    }

    /// Check whether the scheduler may claim this job right now
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending
            && self.next_retry_at.map_or(true, |at| at <= now)
    }

    /// Check whether a processing job has outlived its lease
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Processing
            && self.lease_until.map_or(false, |until| until < now)
    }

    /// Scheduler claim: pending -> processing, attempt counted, new token
    pub fn mark_claimed(&mut self, now: DateTime<Utc>, lease_until: DateTime<Utc>, token: String) {
        self.state = JobState::Processing;
        self.attempts += 1;
        self.next_retry_at = None;
        self.lease_until = Some(lease_until);
        self.lease_token = Some(token);
        self.updated_at = now;
    }

    /// Worker reported success: processing -> completed
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Completed;
        self.error_message = None;
        self.lease_until = None;
        self.lease_token = None;
        self.updated_at = now;
    }

    /// Failure with budget remaining: back to pending, gated by `retry_at`
    pub fn mark_retrying(&mut self, now: DateTime<Utc>, retry_at: DateTime<Utc>, error: String) {
        self.state = JobState::Pending;
        self.next_retry_at = Some(retry_at);
        self.error_message = Some(error);
        self.lease_until = None;
        self.lease_token = None;
        self.updated_at = now;
    }

    /// Failure past the budget: routed to the dead-letter queue
    pub fn mark_dead(&mut self, now: DateTime<Utc>, error: String) {
        self.state = JobState::Dead;
        self.next_retry_at = None;
        self.error_message = Some(error);
        self.lease_until = None;
        self.lease_token = None;
        self.updated_at = now;
    }

    /// Manual DLQ retry: dead -> pending, attempts preserved for audit
    pub fn mark_retry_requested(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Pending;
        self.next_retry_at = None;
        self.lease_until = None;
        self.lease_token = None;
        self.updated_at = now;
    }
}
