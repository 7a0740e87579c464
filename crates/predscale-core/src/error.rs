//! Error taxonomy shared across the planner crates.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Horizon;

/// Why a forecast could not be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("invalid forecast for {horizon}: {reason}")]
    Invalid { horizon: Horizon, reason: String },

    #[error("stale forecast for {horizon}: {age_secs}s old, limit {max_age_secs}s")]
    Stale {
        horizon: Horizon,
        age_secs: u64,
        max_age_secs: u64,
    },
}

impl ForecastError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::Invalid { .. } => "invalid",
            ForecastError::Stale { .. } => "stale",
        }
    }
}

/// Errors from the pure planning stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("no valid forecast for the required horizons")]
    ForecastMissing,

    /// The candidate could not be placed inside the configured bounds.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Classification of a failed control-plane call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorErrorKind {
    Timeout,
    Transient,
    Rejected,
}

impl ExecutorErrorKind {
    pub const ALL: [ExecutorErrorKind; 3] = [
        ExecutorErrorKind::Timeout,
        ExecutorErrorKind::Transient,
        ExecutorErrorKind::Rejected,
    ];

    pub fn is_retryable(self) -> bool {
        !matches!(self, ExecutorErrorKind::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutorErrorKind::Timeout => "timeout",
            ExecutorErrorKind::Transient => "transient",
            ExecutorErrorKind::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ExecutorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed control-plane call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    #[error("control plane call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transient control plane error: {0}")]
    Transient(String),

    #[error("control plane rejected command: {0}")]
    Rejected(String),
}

impl ExecutorError {
    pub fn kind(&self) -> ExecutorErrorKind {
        match self {
            ExecutorError::Timeout(_) => ExecutorErrorKind::Timeout,
            ExecutorError::Transient(_) => ExecutorErrorKind::Transient,
            ExecutorError::Rejected(_) => ExecutorErrorKind::Rejected,
        }
    }
}

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Irrecoverable configuration problems. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
