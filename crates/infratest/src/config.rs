use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_NAMESPACE: &str = "default";

/// Everything a single watch needs besides the client and the job itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Pause between consecutive status queries.
    pub poll_interval: Duration,
    /// How long to wait for a terminal condition, measured from the start
    /// of the watch. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Absolute deadline. Takes precedence over `timeout` when both are set.
    #[serde(skip)]
    pub deadline: Option<Instant>,
    /// Cooperative cancellation, checked before every query.
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            deadline: None,
            cancellation: None,
        }
    }
}

impl WatchConfig {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let poll_interval = match std::env::var("INFRATEST_POLL_INTERVAL_SECS") {
            Ok(raw) => Duration::from_secs(parse_secs("INFRATEST_POLL_INTERVAL_SECS", &raw)?),
            Err(_) => DEFAULT_POLL_INTERVAL,
        };
        let timeout = std::env::var("INFRATEST_JOB_TIMEOUT_SECS")
            .ok()
            .map(|raw| parse_secs("INFRATEST_JOB_TIMEOUT_SECS", &raw).map(Duration::from_secs))
            .transpose()?;

        let config = Self {
            poll_interval,
            timeout,
            ..Default::default()
        };
        config.validate()?;

        tracing::debug!(
            poll_interval = ?config.poll_interval,
            timeout = ?config.timeout,
            "Loaded watch configuration"
        );
        Ok(config)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.poll_interval.is_zero() {
            return Err(crate::Error::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the absolute deadline for a watch that starts at `start`.
    ///
    /// A timeout too large to represent as an `Instant` means no deadline.
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.deadline
            .or_else(|| self.timeout.and_then(|timeout| start.checked_add(timeout)))
    }
}

/// Namespace the production client targets when none is given explicitly.
pub fn namespace_from_env() -> String {
    let _ = dotenvy::dotenv();
    std::env::var("INFRATEST_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string())
}

fn parse_secs(var: &str, raw: &str) -> crate::Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| crate::Error::Config(format!("{} must be a whole number of seconds: {}", var, e)))
}
