pub mod events;
pub mod job;

pub use events::JobEvent;
pub use job::{Job, JobState};
