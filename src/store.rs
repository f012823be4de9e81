use std::collections::HashMap;
use std::pin::Pin;

use chrono::{DateTime, Duration, Utc};
use futures_core::Stream;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::backoff::backoff_delay;
use crate::config::ConfigSnapshot;
use crate::error::{JobFailure, QueueError, QueueResult};
use crate::types::{Job, JobEvent, JobState};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Job counts by state, for the status summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total_jobs: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
}

/// Authoritative table of all jobs, and the only place transitions happen.
///
/// Every mutation runs under the single write lock, which is what makes the
/// claim atomic: a job is either still pending or already owned by exactly
/// one worker, never both. Reads take the read lock and observe a consistent
/// snapshot of each job.
pub struct JobStore {
    jobs: RwLock<HashMap<String, Job>>,
    events: broadcast::Sender<JobEvent>,
}

impl JobStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            jobs: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Create a new pending job.
    ///
    /// Rejects duplicate ids; generates an id when the caller omits one.
    pub fn create(
        &self,
        id: Option<String>,
        command: String,
        max_retries: u32,
    ) -> QueueResult<Job> {
        if command.trim().is_empty() {
            return Err(QueueError::invalid_argument("command must not be empty"));
        }

        let id = match id {
            Some(id) if !id.trim().is_empty() => id,
            Some(_) => return Err(QueueError::invalid_argument("id must not be empty")),
            None => Uuid::new_v4().to_string(),
        };

        let job = {
            let mut jobs = self.jobs.write();
            if jobs.contains_key(&id) {
                return Err(QueueError::DuplicateId(id));
            }
            let job = Job::new(id.clone(), command, max_retries);
            jobs.insert(id, job.clone());
            job
        };

        self.emit(JobEvent::Enqueued {
            job_id: job.id.clone(),
            at: job.created_at,
        });
        Ok(job)
    }

    /// Get a job by id
    pub fn get(&self, id: &str) -> QueueResult<Job> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// List jobs, optionally filtered by state, ordered by creation time
    /// with the id as a deterministic tie-break
    pub fn list(&self, state: Option<JobState>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|job| state.map_or(true, |s| job.state == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        jobs
    }

    /// The dead-letter queue: jobs whose retry budget ran out
    pub fn dead_jobs(&self) -> Vec<Job> {
        self.list(Some(JobState::Dead))
    }

    /// Delete a job in any state
    pub fn delete(&self, id: &str) -> QueueResult<()> {
        {
            let mut jobs = self.jobs.write();
            if jobs.remove(id).is_none() {
                return Err(QueueError::NotFound(id.to_string()));
            }
        }
        self.emit(JobEvent::Deleted {
            job_id: id.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Job counts by state
    pub fn counts(&self) -> StatusCounts {
        let jobs = self.jobs.read();
        let mut counts = StatusCounts {
            total_jobs: jobs.len(),
            ..StatusCounts::default()
        };
        for job in jobs.values() {
            match job.state {
                JobState::Pending => counts.pending += 1,
                JobState::Processing => counts.processing += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Dead => counts.dead += 1,
            }
        }
        counts
    }

    /// Claim the next eligible pending job: FIFO by creation time, tie broken
    /// by id. Atomic under the write lock, so no two workers can claim the
    /// same job. Counts the attempt, clears the retry gate and stamps a fresh
    /// lease token; reports must present the token to be accepted.
    pub fn claim_next(&self, now: DateTime<Utc>, lease: Duration) -> Option<Job> {
        let claimed = {
            let mut jobs = self.jobs.write();
            let next_id = jobs
                .values()
                .filter(|job| job.is_eligible(now))
                .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
                .map(|job| job.id.clone())?;

            let job = jobs.get_mut(&next_id)?;
            job.mark_claimed(now, now + lease, Uuid::new_v4().to_string());
            job.clone()
        };

        self.emit(JobEvent::Claimed {
            job_id: claimed.id.clone(),
            attempt: claimed.attempts,
            at: now,
        });
        Some(claimed)
    }

    /// Worker reported success: processing -> completed.
    ///
    /// `token` must be the lease token handed out by `claim_next`. A report
    /// for a job no longer in `processing`, or one that was reclaimed and
    /// re-claimed since (token rotated), is rejected so a stale worker cannot
    /// overwrite the current owner's claim.
    pub fn report_success(&self, id: &str, token: &str) -> QueueResult<Job> {
        let now = Utc::now();
        let job = {
            let mut jobs = self.jobs.write();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            check_ownership(job, token)?;
            job.mark_completed(now);
            job.clone()
        };

        self.emit(JobEvent::Completed {
            job_id: job.id.clone(),
            at: now,
        });
        Ok(job)
    }

    /// Worker reported failure: the backoff decision. Requires the claim's
    /// lease token, like `report_success`.
    ///
    /// With budget remaining the job goes back to `pending`, gated by
    /// `next_retry_at = now + backoff(base, attempts)`; past the budget it is
    /// routed to the DLQ. Backoff is computed from the snapshot taken at
    /// failure time.
    pub fn report_failure(
        &self,
        id: &str,
        token: &str,
        failure: &JobFailure,
        cfg: &ConfigSnapshot,
    ) -> QueueResult<Job> {
        let now = Utc::now();
        let (job, event) = {
            let mut jobs = self.jobs.write();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            check_ownership(job, token)?;
            let event = apply_failure(job, failure, cfg, now);
            (job.clone(), event)
        };

        self.emit(event);
        Ok(job)
    }

    /// Manual DLQ retry: dead -> pending, immediately eligible.
    ///
    /// `attempts` is preserved for the audit trail, so a job whose budget is
    /// already spent will die again on its next failure.
    pub fn retry_dead(&self, id: &str) -> QueueResult<Job> {
        let now = Utc::now();
        let job = {
            let mut jobs = self.jobs.write();
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            if job.state != JobState::Dead {
                return Err(QueueError::invalid_argument(format!(
                    "job '{id}' is not in the dead-letter queue"
                )));
            }
            job.mark_retry_requested(now);
            job.clone()
        };

        self.emit(JobEvent::RetryRequested {
            job_id: job.id.clone(),
            at: now,
        });
        Ok(job)
    }

    /// Watchdog sweep: route every processing job whose lease has passed
    /// through the standard failure path. Returns the number reclaimed.
    pub fn reap_expired(&self, now: DateTime<Utc>, cfg: &ConfigSnapshot) -> usize {
        let mut events = Vec::new();
        {
            let mut jobs = self.jobs.write();
            let expired: Vec<String> = jobs
                .values()
                .filter(|job| job.lease_expired(now))
                .map(|job| job.id.clone())
                .collect();

            for id in expired {
                if let Some(job) = jobs.get_mut(&id) {
                    events.push(apply_failure(job, &JobFailure::Unresponsive, cfg, now));
                }
            }
        }

        let reclaimed = events.len();
        for event in events {
            self.emit(event);
        }
        reclaimed
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Event stream for observability (boxed for stable Rust)
    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};
        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine; events are best-effort observability
        let _ = self.events.send(event);
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The backoff decision, applied while holding the store's write lock.
/// A report is only valid while the job is processing under the claim that
/// produced `token`; once the watchdog reclaims the job and another worker
/// re-claims it, the token has rotated and the stale report bounces.
fn check_ownership(job: &Job, token: &str) -> QueueResult<()> {
    if job.state != JobState::Processing {
        return Err(QueueError::invalid_argument(format!(
            "job '{}' is not processing",
            job.id
        )));
    }
    if job.lease_token.as_deref() != Some(token) {
        return Err(QueueError::invalid_argument(format!(
            "stale claim for job '{}'",
            job.id
        )));
    }
    Ok(())
}

/// `attempts > max_retries` means the budget (first attempt + max_retries
/// retries) is spent and the job is routed to the DLQ.
fn apply_failure(
    job: &mut Job,
    failure: &JobFailure,
    cfg: &ConfigSnapshot,
    now: DateTime<Utc>,
) -> JobEvent {
    if job.attempts > job.max_retries {
        let error = format!(
            "max retries ({}) exceeded; last error: {}",
            job.max_retries,
            failure.message()
        );
        job.mark_dead(now, error.clone());
        JobEvent::Dead {
            job_id: job.id.clone(),
            error,
            at: now,
        }
    } else {
        let retry_at = now + backoff_delay(cfg.backoff_base, job.attempts);
        let error = failure.message();
        job.mark_retrying(now, retry_at, error.clone());
        JobEvent::Retrying {
            job_id: job.id.clone(),
            retry_at,
            error,
            at: now,
        }
    }
}
