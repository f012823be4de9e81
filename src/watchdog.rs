use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ConfigStore;
use crate::store::JobStore;

/// Slack added to a claim's lease beyond the job timeout, so a worker that
/// is merely reporting slowly is not reclaimed out from under itself
pub const WATCHDOG_GRACE: Duration = Duration::from_secs(5);

/// Spawn the watchdog task that reclaims jobs stuck in `processing`.
///
/// A worker that crashes mid-execution never reports, leaving its job
/// invisible to the dispatcher forever; the watchdog routes such jobs
/// through the standard failure path once their lease passes. Runs until
/// the pool's shutdown signal fires.
pub fn spawn_watchdog(
    store: Arc<JobStore>,
    config: Arc<ConfigStore>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("watchdog started");
        loop {
            let cfg = config.snapshot();
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(cfg.poll_interval()) => {
                    let reclaimed = store.reap_expired(Utc::now(), &cfg);
                    if reclaimed > 0 {
                        info!(reclaimed, "reclaimed unresponsive jobs");
                    }
                }
            }
        }
        debug!("watchdog stopped");
    })
}
