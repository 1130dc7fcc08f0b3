use thiserror::Error;

/// Fetch failures, classified for the retry policy: transient failures
/// (network/timeout class) are retried with backoff, permanent failures
/// (malformed response, auth/key problems) escalate immediately.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// Classify a reqwest error. Timeouts and connection problems are
    /// retryable; anything structural (bad request, decode failure) is not.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || (err.is_request() && err.status().is_none()) {
            FetchError::Transient(err.to_string())
        } else {
            FetchError::Permanent(err.to_string())
        }
    }

    /// Classify an HTTP status: 5xx and 429 are worth retrying, other
    /// non-success codes mean the request itself is wrong.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let msg = format!("HTTP {}: {}", status, body);
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            FetchError::Transient(msg)
        } else {
            FetchError::Permanent(msg)
        }
    }
}

/// A malformed or out-of-range metric value. The offending record is
/// excluded from evaluation; the batch continues.
#[derive(Debug, Clone, Error)]
#[error("invalid {metric} for {player}: {reason}")]
pub struct ValidationError {
    pub player: String,
    pub metric: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(player: &str, metric: &str, reason: impl Into<String>) -> Self {
        Self {
            player: player.to_string(),
            metric: metric.to_string(),
            reason: reason.into(),
        }
    }
}

/// Configuration problems are fatal at load time: no run may start with a
/// broken weight table.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{role} metric weights sum to {sum:.4}, expected 1.0")]
    WeightSum { role: String, sum: f64 },

    #[error("metric {metric} ({role}): {reason}")]
    BadMetric {
        role: String,
        metric: String,
        reason: String,
    },

    #[error("{role} schema has no metrics")]
    EmptySchema { role: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
