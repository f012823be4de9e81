//! An embeddable job-queue engine: shell-command jobs, a FIFO dispatcher
//! with atomic claims, a bounded worker pool, exponential retry backoff,
//! a dead-letter queue and a watchdog for unresponsive workers, all behind
//! an axum HTTP control surface.
//!
//! The in-memory [`JobStore`] is the single authority for job state; every
//! transition happens under its lock, and the pool, watchdog and API are
//! thin layers over it.

pub mod api;
pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod store;
pub mod types;
pub mod watchdog;

pub use api::{router, ApiError, AppState};
pub use config::{ConfigSnapshot, ConfigStore};
pub use error::{JobFailure, QueueError, QueueResult};
pub use executor::{CommandExecutor, ShellExecutor};
pub use pool::{WorkerPool, WorkerStatus, MAX_WORKERS, MIN_WORKERS};
pub use store::{JobStore, StatusCounts};
pub use types::{Job, JobEvent, JobState};
