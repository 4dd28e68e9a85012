pub mod engine;
pub mod outcome;
pub mod state;

pub use engine::{watch_job_to_completion, JobWatcher};
pub use outcome::{JobHandle, WatchOutcome};
pub use state::{failure_message, is_job_completed, is_job_failed, is_job_succeeded, JobState};
