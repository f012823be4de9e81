use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::error::{QueueError, QueueResult};
use crate::executor::{CommandExecutor, ShellExecutor};
use crate::store::JobStore;
use crate::watchdog::{spawn_watchdog, WATCHDOG_GRACE};

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 10;

/// Upper bound on how long stop() waits for in-flight jobs before aborting
/// their workers; keeps shutdown from hanging behind a runaway command
pub const STOP_GRACE: Duration = Duration::from_secs(30);

/// Worker pool status for the control API
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub active_count: usize,
    pub total_workers: usize,
}

struct PoolInner {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    watchdog: JoinHandle<()>,
}

/// A runtime-adjustable set of concurrent executors.
///
/// Workers poll the store for eligible jobs at the configured interval,
/// execute each claimed command under the job timeout, and report the
/// outcome back to the store's state machine. The watchdog rides along with
/// the pool and reclaims jobs whose worker went silent.
pub struct WorkerPool {
    store: Arc<JobStore>,
    config: Arc<ConfigStore>,
    executor: Arc<dyn CommandExecutor>,
    inner: Mutex<Option<PoolInner>>,
}

impl WorkerPool {
    pub fn new(store: Arc<JobStore>, config: Arc<ConfigStore>) -> Self {
        Self::with_executor(store, config, Arc::new(ShellExecutor))
    }

    /// Build a pool with a custom executor (test doubles go through here)
    pub fn with_executor(
        store: Arc<JobStore>,
        config: Arc<ConfigStore>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            store,
            config,
            executor,
            inner: Mutex::new(None),
        }
    }

    /// Start `count` workers plus the watchdog.
    ///
    /// Rejects counts outside `[MIN_WORKERS, MAX_WORKERS]` and rejects a
    /// start while the pool is already running; the pool does not grow
    /// additively.
    pub fn start(&self, count: usize) -> QueueResult<()> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&count) {
            return Err(QueueError::invalid_argument(format!(
                "worker count must be between {MIN_WORKERS} and {MAX_WORKERS}"
            )));
        }

        let mut inner = self.inner.lock();
        if inner.is_some() {
            return Err(QueueError::invalid_argument("workers are already running"));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let workers = (1..=count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    self.store.clone(),
                    self.config.clone(),
                    self.executor.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();
        let watchdog = spawn_watchdog(self.store.clone(), self.config.clone(), shutdown_rx);

        *inner = Some(PoolInner {
            shutdown: shutdown_tx,
            workers,
            watchdog,
        });

        info!(count, "started workers");
        Ok(())
    }

    /// Stop all workers gracefully.
    ///
    /// In-flight jobs get up to `STOP_GRACE` to finish; workers still busy
    /// after that are aborted and their jobs are left to the watchdog on the
    /// next start.
    pub async fn stop(&self) -> QueueResult<()> {
        let PoolInner {
            shutdown,
            workers,
            watchdog,
        } = self
            .inner
            .lock()
            .take()
            .ok_or_else(|| QueueError::invalid_argument("no workers are running"))?;

        info!("stopping workers");
        let _ = shutdown.send(true);

        let deadline = Instant::now() + STOP_GRACE;
        for (index, mut handle) in workers.into_iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!(worker_id = index + 1, "worker exceeded stop grace, aborting");
                handle.abort();
            }
        }

        watchdog.abort();
        info!("all workers stopped");
        Ok(())
    }

    /// Current pool status
    pub fn status(&self) -> WorkerStatus {
        let inner = self.inner.lock();
        match inner.as_ref() {
            Some(pool) => WorkerStatus {
                running: true,
                active_count: pool.workers.iter().filter(|h| !h.is_finished()).count(),
                total_workers: pool.workers.len(),
            },
            None => WorkerStatus {
                running: false,
                active_count: 0,
                total_workers: 0,
            },
        }
    }

    /// Number of live workers, for the status summary
    pub fn active_workers(&self) -> usize {
        self.status().active_count
    }
}

/// One worker: claim, execute, report, sleep when idle.
///
/// The shutdown signal is checked every cycle, so stop() is observed within
/// one poll interval rather than only between job executions.
async fn worker_loop(
    worker_id: usize,
    store: Arc<JobStore>,
    config: Arc<ConfigStore>,
    executor: Arc<dyn CommandExecutor>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let cfg = config.snapshot();
        let lease = chrono::Duration::from_std(cfg.timeout() + WATCHDOG_GRACE)
            .unwrap_or_else(|_| chrono::Duration::seconds(86_400));

        match store.claim_next(Utc::now(), lease) {
            Some(job) => {
                // The claim always carries a token; it proves ownership when
                // reporting the outcome
                let lease_token = job.lease_token.clone().unwrap_or_default();
                debug!(worker_id, job_id = %job.id, attempt = job.attempts, "executing job");
                let result = executor.run(&job.command, cfg.timeout()).await;

                // Backoff reads the config as of the failure, not the claim
                let report = match result {
                    Ok(()) => store.report_success(&job.id, &lease_token),
                    Err(failure) => {
                        store.report_failure(&job.id, &lease_token, &failure, &config.snapshot())
                    }
                };

                match report {
                    Ok(updated) => {
                        debug!(worker_id, job_id = %updated.id, state = %updated.state, "job reported")
                    }
                    // Reclaimed by the watchdog or deleted mid-flight; the
                    // store's transition stands
                    Err(e) => debug!(worker_id, job_id = %job.id, error = %e, "stale report dropped"),
                }
            }
            None => {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(cfg.poll_interval()) => {}
                }
            }
        }
    }

    debug!(worker_id, "worker stopped");
}
