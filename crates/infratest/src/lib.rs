//! Test helpers for integration suites that run work on a Kubernetes cluster.
//!
//! The centrepiece is [`watch_job_to_completion`]: submit a `batch/v1` Job,
//! poll it until a terminal condition appears, and report whether it passed.
//! [`assert_job_succeeds`] wraps the same watch for suites that prefer to
//! record failures on a [`TestReporter`].

pub mod config;
pub mod kubernetes;
pub mod logging;
pub mod metrics;
pub mod reporter;
pub mod watcher;

pub use config::WatchConfig;
pub use kubernetes::{JobClient, JobTemplate, KubeJobClient};
pub use reporter::{assert_job_succeeds, RecordingReporter, TestReporter};
pub use watcher::{
    watch_job_to_completion, JobHandle, JobState, JobWatcher, WatchOutcome,
};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to submit job {job}: {source}")]
    Submission {
        job: String,
        #[source]
        source: kube::Error,
    },
    #[error("failed to query status of job {job}: {source}")]
    Query {
        job: JobHandle,
        #[source]
        source: kube::Error,
    },
    #[error("job {job} failed: {message}")]
    JobFailed { job: JobHandle, message: String },
    /// `timeout` is `None` when the deadline had passed before the first query.
    #[error("timed out waiting for job {job} to complete{}", describe_wait(.timeout))]
    DeadlineExceeded {
        job: JobHandle,
        timeout: Option<Duration>,
    },
    #[error("watch of job {job} was cancelled before it completed")]
    Cancelled { job: JobHandle },
    #[error("orchestrator accepted a job without a name; it cannot be polled")]
    UnnamedJob,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Submission { .. } => "submission",
            Error::Query { .. } => "query",
            Error::JobFailed { .. } => "job_failed",
            Error::DeadlineExceeded { .. } => "deadline",
            Error::Cancelled { .. } => "cancelled",
            Error::UnnamedJob => "unnamed_job",
            Error::Config(_) => "config",
        }
    }
}

fn describe_wait(timeout: &Option<Duration>) -> String {
    match timeout {
        Some(timeout) => format!(" after {:?}", timeout),
        None => ": deadline had already passed before the first status query".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
