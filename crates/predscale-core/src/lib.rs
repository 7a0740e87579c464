//! predscale-core — shared types for the predictive scaling planner.
//!
//! Holds the data model that flows through one planning tick (forecasts,
//! planner state, decisions, execution results), the error taxonomy, and
//! the `planner.toml` configuration with its startup validation.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ExecutorConfig, FallbackConfig, HorizonConfig, LoopConfig, PlannerConfig, RetryPolicy,
    SloConstraints, WorkloadConfig, parse_duration,
};
pub use error::{
    ConfigError, ConfigResult, ExecutorError, ExecutorErrorKind, ForecastError, PlanError,
};
pub use types::*;

/// Current unix time in seconds.
pub fn epoch_secs() -> EpochSecs {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
