use std::fmt;

use k8s_openapi::api::batch::v1::{Job, JobCondition};

pub const CONDITION_COMPLETE: &str = "Complete";
pub const CONDITION_FAILED: &str = "Failed";

/// Where a watched job stands after a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Classifies a fetched job by its conditions alone.
    ///
    /// `status.failed` and `status.succeeded` are never consulted. A job that
    /// is still retrying reports failed attempts before its backoff limit is
    /// exhausted.
    pub fn of(job: &Job) -> Self {
        if !is_job_completed(job) {
            JobState::Running
        } else if is_job_succeeded(job) {
            JobState::Succeeded
        } else {
            JobState::Failed
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => write!(f, "Running"),
            JobState::Succeeded => write!(f, "Succeeded"),
            JobState::Failed => write!(f, "Failed"),
        }
    }
}

fn conditions(job: &Job) -> impl Iterator<Item = &JobCondition> {
    job.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
}

fn has_true_condition(job: &Job, type_: &str) -> bool {
    conditions(job).any(|c| c.type_ == type_ && c.status == "True")
}

/// True once a `Complete` or `Failed` condition is `True`.
pub fn is_job_completed(job: &Job) -> bool {
    has_true_condition(job, CONDITION_COMPLETE) || has_true_condition(job, CONDITION_FAILED)
}

/// `Failed` wins when both terminal conditions are set.
pub fn is_job_succeeded(job: &Job) -> bool {
    has_true_condition(job, CONDITION_COMPLETE) && !has_true_condition(job, CONDITION_FAILED)
}

pub fn is_job_failed(job: &Job) -> bool {
    has_true_condition(job, CONDITION_FAILED)
}

/// Reason and message of the `Failed` condition, joined for diagnostics.
pub fn failure_message(job: &Job) -> Option<String> {
    let condition = conditions(job).find(|c| c.type_ == CONDITION_FAILED && c.status == "True")?;
    match (condition.reason.as_deref(), condition.message.as_deref()) {
        (Some(reason), Some(message)) => Some(format!("{}: {}", reason, message)),
        (Some(text), None) | (None, Some(text)) => Some(text.to_string()),
        (None, None) => None,
    }
}
