//! Error types shared by the autoscaler and its adapters.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for metric and replica reads.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type alias for replica writes.
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Invalid or incomplete configuration. Always fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("either a queue URL or a queue name must be set")]
    MissingQueue,

    #[error("either a deployment name or a deployment selector must be set")]
    MissingDeployment,

    #[error("min_pods ({min}) must not exceed max_pods ({max})")]
    ReplicaBounds { min: u32, max: u32 },

    #[error("scale_down_messages ({down}) must be below scale_up_messages ({up})")]
    Thresholds { up: u64, down: u64 },

    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// A metric or replica read failed. The poll driver logs these and keeps
/// polling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Timeout(_))
    }
}

/// A replica write failed. The cooldown clock must not advance.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("deployment {deployment} was modified concurrently")]
    Conflict { deployment: String },

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ApplyError {
    /// Whether repeating the same write could succeed. Conflicts are not
    /// retried: the observed revision is stale and must be re-read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApplyError::Transport(_) | ApplyError::Timeout(_))
    }
}
