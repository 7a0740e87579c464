//! planner.toml configuration parser.
//!
//! The configuration is loaded once at startup and never changes for the
//! lifetime of the planner. Anything [`PlannerConfig::validate`] rejects is
//! fatal: the daemon refuses to start rather than run on bad bounds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Horizon, ResourceProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub workload: WorkloadConfig,
    pub slo: SloConstraints,
    #[serde(default)]
    pub horizons: HorizonConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    pub executor: ExecutorConfig,
    #[serde(default, rename = "loop")]
    pub tick: LoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Workload identifier, e.g. `default/api`.
    pub name: String,
    /// Forecast metric this planner consumes.
    #[serde(default = "default_metric")]
    pub metric: String,
    /// Replica count assumed when no persisted state exists.
    #[serde(default)]
    pub initial_replicas: Option<u32>,
}

/// Service-level constraints. Immutable for the planner's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SloConstraints {
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Throughput one replica sustains, in the forecast metric's unit.
    pub per_replica_capacity: f64,
    /// Fraction of per-replica capacity to plan for (0, 1].
    pub target_utilization: f64,
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
    #[serde(default = "default_scale_up_step")]
    pub max_scale_up_step: u32,
    #[serde(default = "default_scale_down_step")]
    pub max_scale_down_step: u32,
    #[serde(default = "default_scale_up_cooldown", with = "duration_str")]
    pub scale_up_cooldown: Duration,
    #[serde(default = "default_scale_down_cooldown", with = "duration_str")]
    pub scale_down_cooldown: Duration,
    /// Candidate / current ratio above which a scale-up skips its cooldown.
    #[serde(default = "default_emergency_multiple")]
    pub emergency_multiple: f64,
    /// Relative interval width above which a forecast counts as noisy.
    #[serde(default = "default_confidence_width_ratio")]
    pub confidence_width_ratio: f64,
    /// Extra margin multiplier applied on noisy ticks.
    #[serde(default = "default_confidence_margin_boost")]
    pub confidence_margin_boost: f64,
    #[serde(default)]
    pub resources: ResourceProfile,
}

impl SloConstraints {
    /// Clamp a replica count into `[min_replicas, max_replicas]`.
    pub fn clamp(&self, replicas: u32) -> u32 {
        replicas.clamp(self.min_replicas, self.max_replicas)
    }
}

/// Which horizons feed the decision engine and how they are combined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonConfig {
    pub short: u32,
    pub medium: u32,
    pub long: Option<u32>,
    /// Relative shortfall of the long horizon that triggers blending.
    pub relaxation_threshold: f64,
    /// Weight given to the long horizon when blending.
    pub blend_weight: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            short: 5,
            medium: 15,
            long: Some(30),
            relaxation_threshold: 0.3,
            blend_weight: 0.5,
        }
    }
}

impl HorizonConfig {
    pub fn short(&self) -> Horizon {
        Horizon(self.short)
    }

    pub fn medium(&self) -> Horizon {
        Horizon(self.medium)
    }

    pub fn long(&self) -> Option<Horizon> {
        self.long.map(Horizon)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackConfig {
    /// Consecutive failures (N) that push a degraded planner into fallback.
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward N.
    #[serde(with = "duration_str")]
    pub failure_window: Duration,
    /// Consecutive good ticks (M) needed for each recovery step.
    pub recovery_threshold: u32,
    /// Max replica difference for predictive and reactive targets to agree.
    pub agreement_tolerance: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(600),
            recovery_threshold: 3,
            agreement_tolerance: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    /// Control-plane URL that accepts scale commands.
    pub endpoint: String,
    /// Timeout of a single control-plane call.
    #[serde(default = "default_call_timeout", with = "duration_str")]
    pub call_timeout: Duration,
    /// Total time the adapter may spend on one decision, retries included.
    #[serde(default = "default_retry_budget", with = "duration_str")]
    pub retry_budget: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Exponential backoff for retryable control-plane failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    #[serde(with = "duration_str")]
    pub base_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "duration_str")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopConfig {
    #[serde(with = "duration_str")]
    pub tick_interval: Duration,
    /// Slack on top of one tick interval before a forecast counts as stale.
    #[serde(with = "duration_str")]
    pub staleness_tolerance: Duration,
    /// Decisions kept in the state store per workload.
    pub history_limit: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            staleness_tolerance: Duration::from_secs(30),
            history_limit: 500,
        }
    }
}

impl LoopConfig {
    /// Maximum forecast age accepted at tick time.
    pub fn max_forecast_age(&self) -> Duration {
        self.tick_interval + self.staleness_tolerance
    }
}

impl PlannerConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: PlannerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replica count to start from when nothing was persisted.
    pub fn initial_replicas(&self) -> u32 {
        self.slo
            .clamp(self.workload.initial_replicas.unwrap_or(self.slo.min_replicas))
    }

    /// Reject configurations the planner cannot run safely with.
    pub fn validate(&self) -> ConfigResult<()> {
        let slo = &self.slo;
        if self.workload.name.trim().is_empty() {
            return invalid("workload.name must not be empty");
        }
        if slo.min_replicas > slo.max_replicas {
            return invalid(format!(
                "min_replicas ({}) > max_replicas ({})",
                slo.min_replicas, slo.max_replicas
            ));
        }
        if slo.max_replicas == 0 {
            return invalid("max_replicas must be at least 1");
        }
        if !(slo.per_replica_capacity.is_finite() && slo.per_replica_capacity > 0.0) {
            return invalid("per_replica_capacity must be a positive number");
        }
        if !(slo.target_utilization > 0.0 && slo.target_utilization <= 1.0) {
            return invalid("target_utilization must be in (0, 1]");
        }
        if !(slo.safety_margin.is_finite() && slo.safety_margin > 0.0) {
            return invalid("safety_margin must be a positive number");
        }
        if slo.max_scale_up_step == 0 || slo.max_scale_down_step == 0 {
            return invalid("scale steps must be at least 1");
        }
        if !(slo.emergency_multiple.is_finite() && slo.emergency_multiple > 1.0) {
            return invalid("emergency_multiple must be greater than 1");
        }
        if !(slo.confidence_width_ratio > 0.0) {
            return invalid("confidence_width_ratio must be positive");
        }
        if !(slo.confidence_margin_boost.is_finite() && slo.confidence_margin_boost >= 1.0) {
            return invalid("confidence_margin_boost must be at least 1");
        }

        let h = &self.horizons;
        if h.short == 0 || h.short >= h.medium {
            return invalid("horizons must satisfy 0 < short < medium");
        }
        if let Some(long) = h.long
            && long <= h.medium
        {
            return invalid("horizons.long must be greater than horizons.medium");
        }
        if !(0.0..1.0).contains(&h.relaxation_threshold) {
            return invalid("relaxation_threshold must be in [0, 1)");
        }
        if !(0.0..=1.0).contains(&h.blend_weight) {
            return invalid("blend_weight must be in [0, 1]");
        }

        let f = &self.fallback;
        if f.failure_threshold == 0 || f.recovery_threshold == 0 {
            return invalid("failure_threshold and recovery_threshold must be at least 1");
        }
        if f.failure_window.is_zero() {
            return invalid("failure_window must be positive");
        }

        let tick = self.tick.tick_interval;
        if tick.is_zero() {
            return invalid("loop.tick_interval must be positive");
        }
        let e = &self.executor;
        if e.endpoint.trim().is_empty() {
            return invalid("executor.endpoint must not be empty");
        }
        if e.call_timeout.is_zero() || e.call_timeout >= tick {
            return invalid("executor.call_timeout must be positive and shorter than the tick interval");
        }
        if e.retry_budget < e.call_timeout || e.retry_budget >= tick {
            return invalid(
                "executor.retry_budget must cover one call and be shorter than the tick interval",
            );
        }
        if e.retry.max_attempts == 0 {
            return invalid("executor.retry.max_attempts must be at least 1");
        }
        if !(e.retry.multiplier.is_finite() && e.retry.multiplier >= 1.0) {
            return invalid("executor.retry.multiplier must be at least 1");
        }

        if let Some(initial) = self.workload.initial_replicas
            && !(slo.min_replicas..=slo.max_replicas).contains(&initial)
        {
            return invalid(format!(
                "initial_replicas ({initial}) outside [{}, {}]",
                slo.min_replicas, slo.max_replicas
            ));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigResult<()> {
    Err(ConfigError::Invalid(msg.into()))
}

/// Parse a duration string like "500ms", "30s", "5m", "1h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim().to_ascii_lowercase();
    let bad = || ConfigError::Duration(s.clone());
    let (digits, unit_ms) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        (s.as_str(), 1_000)
    };
    let amount: u64 = digits.trim().parse().map_err(|_| bad())?;
    amount
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(bad)
}

/// Render a duration in the shortest unit that represents it exactly.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else if ms != 0 && ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms != 0 && ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else {
        format!("{}s", ms / 1000)
    }
}

/// Serde adapter storing `Duration` fields as strings like "30s".
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

fn default_metric() -> String {
    "requests_per_second".to_string()
}

fn default_safety_margin() -> f64 {
    1.1
}

fn default_scale_up_step() -> u32 {
    2
}

fn default_scale_down_step() -> u32 {
    1
}

fn default_scale_up_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_scale_down_cooldown() -> Duration {
    Duration::from_secs(300)
}

fn default_emergency_multiple() -> f64 {
    2.0
}

fn default_confidence_width_ratio() -> f64 {
    0.5
}

fn default_confidence_margin_boost() -> f64 {
    1.25
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_retry_budget() -> Duration {
    Duration::from_secs(45)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[workload]
name = "default/api"

[slo]
min_replicas = 2
max_replicas = 10
per_replica_capacity = 50.0
target_utilization = 0.8

[executor]
endpoint = "http://127.0.0.1:9000/scale"
"#;

    #[test]
    fn parse_minimal_applies_defaults() {
        let config = PlannerConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.workload.name, "default/api");
        assert_eq!(config.workload.metric, "requests_per_second");
        assert_eq!(config.slo.safety_margin, 1.1);
        assert_eq!(config.slo.scale_down_cooldown, Duration::from_secs(300));
        assert_eq!(config.horizons.long, Some(30));
        assert_eq!(config.fallback.failure_threshold, 3);
        assert_eq!(config.tick.tick_interval, Duration::from_secs(60));
        assert_eq!(config.executor.retry.max_attempts, 4);
        assert_eq!(config.initial_replicas(), 2);
    }

    #[test]
    fn parse_full_sections() {
        let toml_str = r#"
[workload]
name = "shop/checkout"
metric = "rps"
initial_replicas = 4

[slo]
min_replicas = 1
max_replicas = 20
per_replica_capacity = 120.0
target_utilization = 0.7
safety_margin = 1.2
max_scale_up_step = 3
max_scale_down_step = 2
scale_up_cooldown = "30s"
scale_down_cooldown = "10m"

[slo.resources.requests]
cpu_millicores = 250
memory_bytes = 268435456

[slo.resources.limits]
cpu_millicores = 1000
memory_bytes = 536870912

[horizons]
short = 5
medium = 15
long = 60
relaxation_threshold = 0.25
blend_weight = 0.4

[fallback]
failure_threshold = 5
failure_window = "15m"
recovery_threshold = 4
agreement_tolerance = 2

[executor]
endpoint = "http://control-plane:8443/scale"
call_timeout = "5s"
retry_budget = "20s"

[executor.retry]
max_attempts = 3
base_delay = "250ms"
multiplier = 3.0
max_delay = "4s"

[loop]
tick_interval = "30s"
staleness_tolerance = "15s"
history_limit = 100
"#;
        let config = PlannerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.slo.scale_up_cooldown, Duration::from_secs(30));
        assert_eq!(config.slo.resources.limits.cpu_millicores, 1000);
        assert_eq!(config.horizons.long(), Some(Horizon(60)));
        assert_eq!(config.fallback.failure_window, Duration::from_secs(900));
        assert_eq!(config.executor.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.tick.max_forecast_age(), Duration::from_secs(45));
        assert_eq!(config.initial_replicas(), 4);
    }

    #[test]
    fn min_above_max_is_fatal() {
        let bad = MINIMAL.replace("min_replicas = 2", "min_replicas = 12");
        let err = PlannerConfig::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("min_replicas")));
    }

    #[test]
    fn call_timeout_must_be_shorter_than_tick() {
        let bad = format!("{MINIMAL}call_timeout = \"90s\"\n");
        assert!(matches!(
            PlannerConfig::from_toml_str(&bad),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn initial_replicas_outside_bounds_rejected() {
        let bad = MINIMAL.replace("name = \"default/api\"", "name = \"default/api\"\ninitial_replicas = 50");
        assert!(PlannerConfig::from_toml_str(&bad).is_err());
    }

    #[test]
    fn bad_duration_is_parse_error() {
        let bad = format!("{MINIMAL}call_timeout = \"soon\"\n");
        assert!(matches!(
            PlannerConfig::from_toml_str(&bad),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn format_duration_picks_unit() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn retry_delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(30), Duration::from_millis(500));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = PlannerConfig::from_toml_str(MINIMAL).unwrap();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let reparsed = PlannerConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed.slo, config.slo);
        assert_eq!(reparsed.tick, config.tick);
    }
}
