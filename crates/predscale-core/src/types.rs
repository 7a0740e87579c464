//! Domain types for the predictive planning loop.
//!
//! These types describe forecasts coming in, the planner's own state, the
//! decisions it produces, and what the control plane reported back. All of
//! them serialize to JSON for the HTTP surface and the state store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExecutorErrorKind;

/// Identifier of the managed workload (e.g. `default/api`).
pub type WorkloadId = String;

/// Unix timestamp in seconds.
pub type EpochSecs = u64;

// ── Forecasts ─────────────────────────────────────────────────────

/// A forecast horizon, in minutes ahead of generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Horizon(pub u32);

impl Horizon {
    pub fn minutes(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}m", self.0)
    }
}

/// Forecast record as it arrives on the wire, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawForecast {
    /// Metric the forecast describes (e.g. `requests_per_second`).
    pub metric: String,
    pub horizon_minutes: u32,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    /// Unix timestamp (seconds) at which the model produced this record.
    pub generated_at: EpochSecs,
}

impl RawForecast {
    pub fn horizon(&self) -> Horizon {
        Horizon(self.horizon_minutes)
    }
}

/// A validated forecast. `0 <= lower <= point <= upper`, all finite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Forecast {
    pub metric: String,
    pub horizon: Horizon,
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    pub generated_at: EpochSecs,
}

impl Forecast {
    /// Interval width relative to the point estimate.
    ///
    /// A zero point with a non-zero interval is treated as unbounded noise.
    pub fn relative_width(&self) -> f64 {
        let width = self.upper - self.lower;
        if self.point > 0.0 {
            width / self.point
        } else if width > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Validated forecasts for one tick, keyed by horizon.
pub type HorizonSet = BTreeMap<Horizon, Forecast>;

/// Latest observed utilization of the workload (0.0 = idle, 1.0 = saturated).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UtilizationSample {
    pub utilization: f64,
    pub observed_at: EpochSecs,
}

// ── Planner state ─────────────────────────────────────────────────

/// Operating mode of the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// Forecast-driven decisions.
    Predictive,
    /// At least one recent failure; still forecast-driven.
    Degraded,
    /// Forecast ignored, reactive utilization rule in charge.
    Fallback,
    /// Forecasts are back; predictive path runs in shadow until it agrees.
    Recovering,
}

impl ScalingMode {
    pub const ALL: [ScalingMode; 4] = [
        ScalingMode::Predictive,
        ScalingMode::Degraded,
        ScalingMode::Fallback,
        ScalingMode::Recovering,
    ];

    /// Numeric value used for the mode gauge.
    pub fn gauge_value(self) -> u8 {
        match self {
            ScalingMode::Predictive => 0,
            ScalingMode::Degraded => 1,
            ScalingMode::Fallback => 2,
            ScalingMode::Recovering => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScalingMode::Predictive => "predictive",
            ScalingMode::Degraded => "degraded",
            ScalingMode::Fallback => "fallback",
            ScalingMode::Recovering => "recovering",
        }
    }
}

impl fmt::Display for ScalingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a replica change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
    Steady,
}

impl ScaleDirection {
    pub fn between(from: u32, to: u32) -> Self {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => ScaleDirection::Up,
            std::cmp::Ordering::Less => ScaleDirection::Down,
            std::cmp::Ordering::Equal => ScaleDirection::Steady,
        }
    }
}

/// The loop's view of the workload. Only the loop orchestrator writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannerState {
    pub workload: WorkloadId,
    /// Replica count last confirmed applied by the control plane.
    pub current_replicas: u32,
    /// When the last replica change was applied.
    pub last_decision_at: Option<EpochSecs>,
    pub last_direction: ScaleDirection,
    pub mode: ScalingMode,
    pub consecutive_failures: u32,
    /// Mode-dependent streak: clean predictive cycles, fresh-forecast ticks
    /// while in fallback, or agreeing ticks while recovering.
    pub consecutive_successes: u32,
    pub updated_at: EpochSecs,
}

impl PlannerState {
    /// Fresh state for a workload with no recorded history.
    pub fn initial(workload: &str, replicas: u32) -> Self {
        Self {
            workload: workload.to_string(),
            current_replicas: replicas,
            last_decision_at: None,
            last_direction: ScaleDirection::Steady,
            mode: ScalingMode::Predictive,
            consecutive_failures: 0,
            consecutive_successes: 0,
            updated_at: 0,
        }
    }
}

// ── Decisions ─────────────────────────────────────────────────────

/// Resource amounts for one replica.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceQuantity {
    pub cpu_millicores: u32,
    pub memory_bytes: u64,
}

/// Requests and limits applied to each replica.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceProfile {
    pub requests: ResourceQuantity,
    pub limits: ResourceQuantity,
}

/// How the control plane should roll out the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ramp {
    Immediate,
    Gradual,
}

/// The rule that shaped the final target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRationale {
    /// Forecast candidate applied as computed.
    Forecast,
    /// Wide forecast interval widened the margin and blocked scale-down.
    ConfidenceGated,
    /// Change suppressed by the direction's cooldown.
    Cooldown,
    /// Scale-up allowed through a cooldown because demand jumped.
    EmergencyOverride,
    /// Change truncated to the per-tick step.
    RateLimited,
    /// Reactive utilization rule (fallback mode).
    Reactive,
    /// No usable forecast; replicas held.
    ForecastUnavailable,
    /// No utilization observation in fallback; replicas held.
    NoObservation,
}

impl DecisionRationale {
    pub const ALL: [DecisionRationale; 8] = [
        DecisionRationale::Forecast,
        DecisionRationale::ConfidenceGated,
        DecisionRationale::Cooldown,
        DecisionRationale::EmergencyOverride,
        DecisionRationale::RateLimited,
        DecisionRationale::Reactive,
        DecisionRationale::ForecastUnavailable,
        DecisionRationale::NoObservation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DecisionRationale::Forecast => "forecast",
            DecisionRationale::ConfidenceGated => "confidence_gated",
            DecisionRationale::Cooldown => "cooldown",
            DecisionRationale::EmergencyOverride => "emergency_override",
            DecisionRationale::RateLimited => "rate_limited",
            DecisionRationale::Reactive => "reactive",
            DecisionRationale::ForecastUnavailable => "forecast_unavailable",
            DecisionRationale::NoObservation => "no_observation",
        }
    }
}

impl fmt::Display for DecisionRationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final decision for one tick. Consumed once by the execution adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingDecision {
    pub workload: WorkloadId,
    pub target_replicas: u32,
    pub resources: ResourceProfile,
    pub ramp: Ramp,
    pub rationale: DecisionRationale,
    /// Mode the planner was in when it produced this decision.
    pub mode: ScalingMode,
    pub decided_at: EpochSecs,
}

impl ScalingDecision {
    /// The command sent to the control plane for this decision.
    pub fn command(&self) -> ScaleCommand {
        ScaleCommand {
            target_replicas: self.target_replicas,
            resource_requests: self.resources.requests,
            resource_limits: self.resources.limits,
            ramp: self.ramp,
        }
    }
}

/// Wire format of a scaling command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScaleCommand {
    pub target_replicas: u32,
    pub resource_requests: ResourceQuantity,
    pub resource_limits: ResourceQuantity,
    pub ramp: Ramp,
}

impl ScaleCommand {
    /// Whether applying `other` after `self` would change anything on the
    /// workload. Ramp only affects how a change rolls out.
    pub fn same_target(&self, other: &ScaleCommand) -> bool {
        self.target_replicas == other.target_replicas
            && self.resource_requests == other.resource_requests
            && self.resource_limits == other.resource_limits
    }
}

/// Outcome of applying a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    /// Replica count in force after the call (the previous count on failure).
    pub applied_replicas: u32,
    pub error: Option<ExecutorErrorKind>,
    pub latency_ms: u64,
    pub attempts: u32,
    /// False when the command was already applied and nothing was sent.
    pub changed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast(point: f64, lower: f64, upper: f64) -> Forecast {
        Forecast {
            metric: "rps".to_string(),
            horizon: Horizon(5),
            point,
            lower,
            upper,
            generated_at: 1000,
        }
    }

    #[test]
    fn horizon_display() {
        assert_eq!(Horizon(15).to_string(), "+15m");
    }

    #[test]
    fn relative_width_uses_point() {
        assert!((forecast(100.0, 80.0, 140.0).relative_width() - 0.6).abs() < 1e-9);
        assert_eq!(forecast(0.0, 0.0, 0.0).relative_width(), 0.0);
        assert!(forecast(0.0, 0.0, 5.0).relative_width().is_infinite());
    }

    #[test]
    fn direction_between() {
        assert_eq!(ScaleDirection::between(3, 5), ScaleDirection::Up);
        assert_eq!(ScaleDirection::between(5, 3), ScaleDirection::Down);
        assert_eq!(ScaleDirection::between(4, 4), ScaleDirection::Steady);
    }

    #[test]
    fn mode_serializes_snake_case() {
        let json = serde_json::to_string(&ScalingMode::Recovering).unwrap();
        assert_eq!(json, "\"recovering\"");
    }

    #[test]
    fn same_target_ignores_ramp() {
        let a = ScaleCommand {
            target_replicas: 4,
            resource_requests: ResourceQuantity::default(),
            resource_limits: ResourceQuantity::default(),
            ramp: Ramp::Immediate,
        };
        let b = ScaleCommand {
            ramp: Ramp::Gradual,
            ..a
        };
        assert!(a.same_target(&b));
        assert!(!a.same_target(&ScaleCommand {
            target_replicas: 5,
            ..a
        }));
    }

    #[test]
    fn raw_forecast_parses_wire_format() {
        let json = r#"{"metric":"rps","horizon_minutes":15,"point":90.0,"lower":70.0,"upper":120.0,"generated_at":1700000000}"#;
        let raw: RawForecast = serde_json::from_str(json).unwrap();
        assert_eq!(raw.horizon(), Horizon(15));
        assert_eq!(raw.upper, 120.0);
    }
}
