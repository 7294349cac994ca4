//! Configuration for the relay service.

use crate::error::ConfigError;
use std::env;
use std::time::Duration;
use url::Url;

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.judgmentlabs.ai";

/// Configuration for [`RelayService`](crate::RelayService).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Base URL of the collection service.
    pub api_url: String,
    /// Bearer token sent with every request.
    pub api_key: String,
    /// Organization id, sent as a header and inside every payload.
    pub organization_id: String,
    /// Path of the span batch endpoint, relative to `api_url`.
    pub spans_path: String,
    /// Path of the evaluation-run batch endpoint, relative to `api_url`.
    pub evaluation_runs_path: String,

    /// Maximum number of envelopes per batch.
    ///
    /// Default: 10
    pub batch_size: usize,

    /// Maximum time a non-empty batch waits before it is delivered.
    ///
    /// Default: 5s
    pub flush_interval: Duration,

    /// Number of background workers draining the queue.
    ///
    /// Use exactly one worker when remote arrival order matters.
    ///
    /// Default: 1
    pub num_workers: usize,

    /// How long an idle worker waits for work before re-checking shutdown.
    ///
    /// Default: 1s
    pub idle_timeout: Duration,

    /// Per-request timeout for delivery calls.
    ///
    /// Default: 30s
    pub request_timeout: Duration,

    /// Upper bound on the final flush performed by shutdown.
    ///
    /// Default: 60s
    pub shutdown_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            organization_id: String::new(),
            spans_path: "/traces/spans/batch/".to_string(),
            evaluation_runs_path: "/traces/evaluation_runs/batch/".to_string(),
            batch_size: 10,
            flush_interval: Duration::from_secs(5),
            num_workers: 1,
            idle_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl RelayConfig {
    /// Creates a configuration with credentials and defaults for everything else.
    pub fn new(api_key: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            organization_id: organization_id.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env::var("JUDGMENT_API_URL").unwrap_or(defaults.api_url),
            api_key: env::var("JUDGMENT_API_KEY").unwrap_or_default(),
            organization_id: env::var("JUDGMENT_ORG_ID").unwrap_or_default(),
            batch_size: parse_env("SPAN_RELAY_BATCH_SIZE").unwrap_or(defaults.batch_size),
            flush_interval: parse_env("SPAN_RELAY_FLUSH_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            num_workers: parse_env("SPAN_RELAY_NUM_WORKERS").unwrap_or(defaults.num_workers),
            request_timeout: parse_env("SPAN_RELAY_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            ..defaults
        }
    }

    /// Sets the API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the number of workers.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Sets the idle wake-up timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the shutdown flush bound.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Worker count actually used; zero is treated as one.
    #[inline]
    pub fn effective_workers(&self) -> usize {
        self.num_workers.max(1)
    }

    /// Full URL of the span batch endpoint.
    pub fn spans_url(&self) -> String {
        join_url(&self.api_url, &self.spans_path)
    }

    /// Full URL of the evaluation-run batch endpoint.
    pub fn evaluation_runs_url(&self) -> String {
        join_url(&self.api_url, &self.evaluation_runs_path)
    }

    /// Checks the settings the worker loop depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("flush_interval"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("idle_timeout"));
        }
        Url::parse(&self.api_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.api_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
