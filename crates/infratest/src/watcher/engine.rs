use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::batch::v1::Job;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    config::{WatchConfig, DEFAULT_NAMESPACE},
    kubernetes::JobClient,
    metrics,
    watcher::{failure_message, JobHandle, JobState, WatchOutcome},
    Error, Result,
};

/// Submits a job and polls it until it reaches a terminal condition.
///
/// The watcher never deletes the job it created, on success or on any
/// failure path. Callers own cleanup (namespace teardown,
/// `ttlSecondsAfterFinished`, ...).
pub struct JobWatcher<'a, C: JobClient + ?Sized> {
    client: &'a C,
    config: WatchConfig,
}

impl<'a, C: JobClient + ?Sized> JobWatcher<'a, C> {
    pub fn new(client: &'a C, config: WatchConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Creates the job once. Errors are returned as-is, never retried.
    pub async fn submit(&self, spec: &Job) -> Result<JobHandle> {
        let requested = spec
            .metadata
            .name
            .clone()
            .or_else(|| spec.metadata.generate_name.clone());

        let created = self.client.create(spec).await.map_err(|source| {
            error!(job = ?requested, "Job submission rejected: {}", source);
            Error::Submission {
                job: requested.clone().unwrap_or_else(|| "<unnamed>".to_string()),
                source,
            }
        })?;

        let name = spec
            .metadata
            .name
            .clone()
            .or(created.metadata.name)
            .ok_or(Error::UnnamedJob)?;
        let namespace = created
            .metadata
            .namespace
            .or_else(|| spec.metadata.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let handle = JobHandle {
            name,
            namespace,
            submitted_at: Utc::now(),
        };
        info!(job = %handle.name, namespace = %handle.namespace, "Submitted job");
        Ok(handle)
    }

    /// Submits `spec` and waits for it to succeed, fail, or run out of time.
    pub async fn watch(&self, spec: &Job) -> WatchOutcome {
        metrics::WATCHES_STARTED_TOTAL.inc();
        let outcome = self.run(spec).await;
        metrics::record_outcome(&outcome);

        match &outcome {
            WatchOutcome::Pass { job, queries } => {
                info!(job = %job.name, namespace = %job.namespace, queries, "Job succeeded");
            }
            WatchOutcome::Fail { error, queries } => {
                warn!(kind = error.kind(), queries, "Job watch failed: {}", error);
            }
        }
        outcome
    }

    async fn run(&self, spec: &Job) -> WatchOutcome {
        if let Err(error) = self.config.validate() {
            return WatchOutcome::Fail { error, queries: 0 };
        }

        let started = Instant::now();
        let deadline = self.config.deadline_from(started);

        let job = match self.submit(spec).await {
            Ok(job) => job,
            Err(error) => return WatchOutcome::Fail { error, queries: 0 },
        };

        let mut queries: u32 = 0;
        loop {
            if self.is_cancelled() {
                return WatchOutcome::Fail {
                    error: Error::Cancelled { job },
                    queries,
                };
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return WatchOutcome::Fail {
                        error: Error::DeadlineExceeded {
                            job,
                            timeout: self.waited_until(deadline, started),
                        },
                        queries,
                    };
                }
            }

            queries += 1;
            metrics::STATUS_QUERIES_TOTAL.inc();
            let current = match self.client.get(&job.name).await {
                Ok(current) => current,
                Err(source) => {
                    return WatchOutcome::Fail {
                        error: Error::Query { job, source },
                        queries,
                    };
                }
            };

            match JobState::of(&current) {
                JobState::Succeeded => return WatchOutcome::Pass { job, queries },
                JobState::Failed => {
                    let message = failure_message(&current)
                        .unwrap_or_else(|| "job reported a Failed condition".to_string());
                    return WatchOutcome::Fail {
                        error: Error::JobFailed { job, message },
                        queries,
                    };
                }
                JobState::Running => {
                    debug!(
                        job = %job.name,
                        namespace = %job.namespace,
                        attempt = queries,
                        "Job is still running"
                    );
                }
            }

            self.pause(deadline).await;
        }
    }

    /// How long the watch was allowed to wait, as reported on expiry.
    fn waited_until(&self, deadline: Instant, started: Instant) -> Option<Duration> {
        if self.config.deadline.is_none() {
            if let Some(timeout) = self.config.timeout {
                return Some(timeout);
            }
        }
        let allowed = deadline.saturating_duration_since(started);
        (!allowed.is_zero()).then_some(allowed)
    }

    fn is_cancelled(&self) -> bool {
        self.config
            .cancellation
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }

    /// Sleeps one poll interval, cut short by the deadline or cancellation.
    async fn pause(&self, deadline: Option<Instant>) {
        let mut interval = self.config.poll_interval;
        if let Some(deadline) = deadline {
            interval = interval.min(deadline.saturating_duration_since(Instant::now()));
        }

        match &self.config.cancellation {
            Some(token) => {
                tokio::select! {
                    _ = sleep(interval) => {}
                    _ = token.cancelled() => {}
                }
            }
            None => sleep(interval).await,
        }
    }
}

/// Submits `spec` through `client` and watches it to completion.
pub async fn watch_job_to_completion<C>(client: &C, spec: &Job, config: &WatchConfig) -> WatchOutcome
where
    C: JobClient + ?Sized,
{
    JobWatcher::new(client, config.clone()).watch(spec).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubernetes::MockJobClient;
    use crate::watcher::state::fixtures::{condition, job, with_conditions, with_counts};
    use kube::error::ErrorResponse;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    fn not_found(name: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("jobs.batch \"{}\" not found", name),
            reason: "NotFound".to_string(),
            code: 404,
        })
    }

    fn accepting_create(client: &mut MockJobClient) {
        client
            .expect_create()
            .times(1)
            .returning(|spec| Ok(spec.clone()));
    }

    fn config() -> WatchConfig {
        WatchConfig::default().with_poll_interval(Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_complete_passes_with_one_query() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        client
            .expect_get()
            .with(eq("smoke"))
            .times(1)
            .returning(|name| Ok(with_conditions(name, vec![condition("Complete", "True")])));

        let outcome = watch_job_to_completion(&client, &job("smoke"), &config()).await;

        assert!(outcome.is_pass());
        assert_eq!(outcome.queries(), 1);
        let handle = outcome.into_result().unwrap();
        assert_eq!(handle.name, "smoke");
        assert_eq!(handle.namespace, "ci");
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_failed_fails_with_one_query() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        client.expect_get().times(1).returning(|name| {
            let mut failed = condition("Failed", "True");
            failed.reason = Some("BackoffLimitExceeded".to_string());
            Ok(with_conditions(name, vec![failed]))
        });

        let outcome = watch_job_to_completion(&client, &job("boom"), &config()).await;

        assert_eq!(outcome.queries(), 1);
        match outcome.error() {
            Some(Error::JobFailed { job, message }) => {
                assert_eq!(job.name, "boom");
                assert_eq!(message, "BackoffLimitExceeded");
            }
            other => panic!("expected JobFailed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn running_then_complete_sleeps_between_queries() {
        let mut client = MockJobClient::new();
        let mut seq = Sequence::new();
        accepting_create(&mut client);

        let polled_at = Arc::new(Mutex::new(Vec::new()));
        let first = polled_at.clone();
        client
            .expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |name| {
                first.lock().unwrap().push(Instant::now());
                Ok(with_conditions(name, vec![]))
            });
        let second = polled_at.clone();
        client
            .expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |name| {
                second.lock().unwrap().push(Instant::now());
                Ok(with_conditions(name, vec![condition("Complete", "True")]))
            });

        let outcome = watch_job_to_completion(&client, &job("slow"), &config()).await;

        assert!(outcome.is_pass());
        assert_eq!(outcome.queries(), 2);
        let polled_at = polled_at.lock().unwrap();
        assert!(polled_at[1] - polled_at[0] >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_stops_polling_without_a_further_query() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        // polls at t=0s, 5s, 10s; the deadline at 12s is noticed after a
        // shortened sleep, before a fourth query
        client
            .expect_get()
            .times(3)
            .returning(|name| Ok(with_conditions(name, vec![])));

        let started = Instant::now();
        let config = config().with_timeout(Duration::from_secs(12));
        let outcome = watch_job_to_completion(&client, &job("stuck"), &config).await;

        assert_eq!(outcome.queries(), 3);
        assert!(Instant::now() - started < Duration::from_secs(12) + Duration::from_secs(5));
        let error = outcome.error().unwrap();
        assert!(matches!(error, Error::DeadlineExceeded { timeout, .. } if *timeout == Some(Duration::from_secs(12))));
        assert!(error.to_string().starts_with("timed out waiting for job ci/stuck"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_skips_the_first_query() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        client.expect_get().times(0);

        let config = config().with_deadline(Instant::now());
        let outcome = watch_job_to_completion(&client, &job("late"), &config).await;

        assert_eq!(outcome.queries(), 0);
        let error = outcome.error().unwrap();
        assert!(matches!(error, Error::DeadlineExceeded { timeout: None, .. }));
        assert!(!error.to_string().contains("0ns"));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_timeout_keeps_polling_instead_of_panicking() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        client
            .expect_get()
            .times(1)
            .returning(|name| Ok(with_conditions(name, vec![condition("Complete", "True")])));

        let config = config().with_timeout(Duration::from_secs(u64::MAX));
        let outcome = watch_job_to_completion(&client, &job("forever"), &config).await;

        assert!(outcome.is_pass());
        assert_eq!(outcome.queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_counts_alone_keep_the_watch_running() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        client
            .expect_get()
            .times(20)
            .returning(|name| Ok(with_counts(name, 4, 0)));

        // 20 polls fit in 99s at 5s intervals: t=0..95
        let config = config().with_timeout(Duration::from_secs(99));
        let outcome = watch_job_to_completion(&client, &job("retrying"), &config).await;

        assert_eq!(outcome.queries(), 20);
        assert!(matches!(outcome.error(), Some(Error::DeadlineExceeded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn query_error_stops_immediately() {
        let mut client = MockJobClient::new();
        let mut seq = Sequence::new();
        accepting_create(&mut client);
        client
            .expect_get()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|name| Ok(with_conditions(name, vec![])));
        client
            .expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Err(not_found(name)));

        let outcome = watch_job_to_completion(&client, &job("deleted"), &config()).await;

        assert_eq!(outcome.queries(), 3);
        match outcome.error() {
            Some(Error::Query { job, source }) => {
                assert_eq!(job.name, "deleted");
                assert!(source.to_string().contains("not found"));
            }
            other => panic!("expected Query error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn submission_error_issues_no_query() {
        let mut client = MockJobClient::new();
        client
            .expect_create()
            .times(1)
            .returning(|_| Err(kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: "jobs.batch \"dup\" already exists".to_string(),
                reason: "AlreadyExists".to_string(),
                code: 409,
            })));
        client.expect_get().times(0);

        let outcome = watch_job_to_completion(&client, &job("dup"), &config()).await;

        assert_eq!(outcome.queries(), 0);
        match outcome.error() {
            Some(Error::Submission { job, source }) => {
                assert_eq!(job, "dup");
                assert!(matches!(source, kube::Error::Api(resp) if resp.code == 409));
            }
            other => panic!("expected Submission error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn complete_and_failed_together_fail() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        client.expect_get().times(1).returning(|name| {
            Ok(with_conditions(
                name,
                vec![condition("Complete", "True"), condition("Failed", "True")],
            ))
        });

        let outcome = watch_job_to_completion(&client, &job("both"), &config()).await;

        assert!(!outcome.is_pass());
        assert!(matches!(outcome.error(), Some(Error::JobFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_reported_as_failure() {
        let mut client = MockJobClient::new();
        accepting_create(&mut client);
        let token = CancellationToken::new();
        let trigger = token.clone();
        client.expect_get().times(1).returning(move |name| {
            trigger.cancel();
            Ok(with_conditions(name, vec![]))
        });

        let config = config().with_cancellation(token);
        let outcome = watch_job_to_completion(&client, &job("cancel"), &config).await;

        assert_eq!(outcome.queries(), 1);
        assert!(matches!(outcome.error(), Some(Error::Cancelled { .. })));
    }

    #[tokio::test]
    async fn server_assigned_name_is_used_for_generate_name() {
        let mut client = MockJobClient::new();
        client.expect_create().times(1).returning(|spec| {
            let mut created = spec.clone();
            created.metadata.name = Some("gen-x7k2p".to_string());
            created.metadata.namespace = Some("suite".to_string());
            Ok(created)
        });
        client
            .expect_get()
            .with(eq("gen-x7k2p"))
            .times(1)
            .returning(|name| Ok(with_conditions(name, vec![condition("Complete", "True")])));

        let mut spec = job("ignored");
        spec.metadata.name = None;
        spec.metadata.generate_name = Some("gen-".to_string());

        let handle = watch_job_to_completion(&client, &spec, &config())
            .await
            .into_result()
            .unwrap();
        assert_eq!(handle.name, "gen-x7k2p");
        assert_eq!(handle.namespace, "suite");
    }

    #[tokio::test]
    async fn nameless_job_cannot_be_watched() {
        let mut client = MockJobClient::new();
        client.expect_create().times(1).returning(|spec| Ok(spec.clone()));
        client.expect_get().times(0);

        let mut spec = job("ignored");
        spec.metadata.name = None;

        let outcome = watch_job_to_completion(&client, &spec, &config()).await;
        assert!(matches!(outcome.error(), Some(Error::UnnamedJob)));
    }

    #[tokio::test]
    async fn invalid_config_never_submits() {
        let mut client = MockJobClient::new();
        client.expect_create().times(0);

        let config = WatchConfig::default().with_poll_interval(Duration::ZERO);
        let outcome = watch_job_to_completion(&client, &job("never"), &config).await;
        assert!(matches!(outcome.error(), Some(Error::Config(_))));
    }
}
