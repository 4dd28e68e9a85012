//! Assertion-style entry point for test suites.
//!
//! Rust test harnesses fail a test by panicking. Watching a job should not
//! unwind from inside the helper, so failures are recorded on a
//! [`TestReporter`] and the caller decides what to do with them.

use k8s_openapi::api::batch::v1::Job;
use tracing::info;

use crate::{
    config::WatchConfig,
    kubernetes::JobClient,
    watcher::{watch_job_to_completion, WatchOutcome},
};

/// The slice of a test framework the assertion helpers need.
pub trait TestReporter {
    fn log(&mut self, message: &str);

    /// Marks the test failed without stopping it.
    fn fail(&mut self, message: &str);

    fn failed(&self) -> bool;
}

/// Collects log lines and failures in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    pub logs: Vec<String>,
    pub failures: Vec<String>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics with every recorded failure, for use at the end of a test.
    pub fn assert_passed(&self) {
        assert!(
            self.failures.is_empty(),
            "test reported failures:\n{}",
            self.failures.join("\n")
        );
    }
}

impl TestReporter for RecordingReporter {
    fn log(&mut self, message: &str) {
        info!("{}", message);
        self.logs.push(message.to_string());
    }

    fn fail(&mut self, message: &str) {
        self.failures.push(message.to_string());
    }

    fn failed(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Runs `spec` to completion and fails `reporter` unless the job succeeded.
///
/// Returns whether the job passed.
pub async fn assert_job_succeeds<R, C>(
    reporter: &mut R,
    client: &C,
    spec: &Job,
    config: &WatchConfig,
) -> bool
where
    R: TestReporter + ?Sized,
    C: JobClient + ?Sized,
{
    let outcome = watch_job_to_completion(client, spec, config).await;
    match &outcome {
        WatchOutcome::Pass { job, queries } => {
            reporter.log(&format!("job {} succeeded after {} status queries", job, queries));
            true
        }
        WatchOutcome::Fail { error, .. } => {
            reporter.fail(&error.to_string());
            false
        }
    }
}
