use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::Error;

/// Identity of a job the watcher submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub name: String,
    pub namespace: String,
    pub submitted_at: DateTime<Utc>,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of one watch: the job passed, or something stopped it from
/// passing. `queries` counts status queries issued after submission.
#[derive(Debug)]
pub enum WatchOutcome {
    Pass { job: JobHandle, queries: u32 },
    Fail { error: Error, queries: u32 },
}

impl WatchOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, WatchOutcome::Pass { .. })
    }

    pub fn queries(&self) -> u32 {
        match self {
            WatchOutcome::Pass { queries, .. } | WatchOutcome::Fail { queries, .. } => *queries,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            WatchOutcome::Pass { .. } => None,
            WatchOutcome::Fail { error, .. } => Some(error),
        }
    }

    /// Converts into a plain `Result` for callers that propagate with `?`.
    pub fn into_result(self) -> crate::Result<JobHandle> {
        match self {
            WatchOutcome::Pass { job, .. } => Ok(job),
            WatchOutcome::Fail { error, .. } => Err(error),
        }
    }

    /// Structured summary for logs and test artifacts.
    pub fn summary(&self) -> Value {
        match self {
            WatchOutcome::Pass { job, queries } => json!({
                "outcome": "pass",
                "job": job,
                "queries": queries,
            }),
            WatchOutcome::Fail { error, queries } => json!({
                "outcome": "fail",
                "kind": error.kind(),
                "error": error.to_string(),
                "queries": queries,
            }),
        }
    }
}

impl fmt::Display for WatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchOutcome::Pass { job, .. } => write!(f, "job {} succeeded", job),
            WatchOutcome::Fail { error, .. } => write!(f, "{}", error),
        }
    }
}
