//! Planner metrics — lock-free counters and gauges updated by the loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use serde::Serialize;
use tracing::trace;

use predscale_core::{
    DecisionRationale, EpochSecs, ExecutionResult, ExecutorErrorKind, PlannerState,
    ScalingDecision, ScalingMode,
};

const RATIONALES: usize = DecisionRationale::ALL.len();
const ERROR_KINDS: usize = ExecutorErrorKind::ALL.len();

/// Point-in-time copy of every planner metric.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub mode: ScalingMode,
    pub decisions_total: u64,
    pub decisions_by_rationale: BTreeMap<&'static str, u64>,
    pub last_target_replicas: u32,
    pub last_applied_replicas: u32,
    pub consecutive_failures: u32,
    pub executions_total: u64,
    pub execution_failures: BTreeMap<&'static str, u64>,
    pub last_execution_latency_ms: u64,
    pub forecasts_rejected_total: u64,
    pub mode_transitions_total: u64,
    pub tick_overruns_total: u64,
    pub last_tick_at: EpochSecs,
}

impl MetricsSnapshot {
    pub fn execution_failures_total(&self) -> u64 {
        self.execution_failures.values().sum()
    }
}

/// Metrics for one workload's planning loop. Share behind an `Arc`.
pub struct PlannerMetrics {
    mode: AtomicU8,
    decisions: [AtomicU64; RATIONALES],
    last_target_replicas: AtomicU32,
    last_applied_replicas: AtomicU32,
    consecutive_failures: AtomicU32,
    executions: AtomicU64,
    execution_failures: [AtomicU64; ERROR_KINDS],
    last_execution_latency_ms: AtomicU64,
    forecasts_rejected: AtomicU64,
    mode_transitions: AtomicU64,
    tick_overruns: AtomicU64,
    last_tick_at: AtomicU64,
}

impl Default for PlannerMetrics {
    fn default() -> Self {
        Self::new(ScalingMode::Predictive, 0)
    }
}

impl PlannerMetrics {
    /// Start from the mode and replica count the loop resumes with.
    pub fn new(mode: ScalingMode, replicas: u32) -> Self {
        Self {
            mode: AtomicU8::new(mode.gauge_value()),
            decisions: std::array::from_fn(|_| AtomicU64::new(0)),
            last_target_replicas: AtomicU32::new(replicas),
            last_applied_replicas: AtomicU32::new(replicas),
            consecutive_failures: AtomicU32::new(0),
            executions: AtomicU64::new(0),
            execution_failures: std::array::from_fn(|_| AtomicU64::new(0)),
            last_execution_latency_ms: AtomicU64::new(0),
            forecasts_rejected: AtomicU64::new(0),
            mode_transitions: AtomicU64::new(0),
            tick_overruns: AtomicU64::new(0),
            last_tick_at: AtomicU64::new(0),
        }
    }

    pub fn record_decision(&self, decision: &ScalingDecision) {
        self.decisions[decision.rationale as usize].fetch_add(1, Ordering::Relaxed);
        self.last_target_replicas
            .store(decision.target_replicas, Ordering::Relaxed);
        self.last_tick_at.store(decision.decided_at, Ordering::Relaxed);
        trace!(
            rationale = %decision.rationale,
            target = decision.target_replicas,
            "decision recorded"
        );
    }

    pub fn record_execution(&self, result: &ExecutionResult) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.last_execution_latency_ms
            .store(result.latency_ms, Ordering::Relaxed);
        self.last_applied_replicas
            .store(result.applied_replicas, Ordering::Relaxed);
        if let Some(kind) = result.error {
            self.execution_failures[kind as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Seed gauges from the state the loop starts with.
    pub fn record_resumed(&self, state: &PlannerState) {
        self.record_mode(state.mode, state.consecutive_failures, false);
        self.last_target_replicas
            .store(state.current_replicas, Ordering::Relaxed);
        self.last_applied_replicas
            .store(state.current_replicas, Ordering::Relaxed);
        self.last_tick_at.store(state.updated_at, Ordering::Relaxed);
    }

    /// Mode and failure streak after the fallback monitor ran.
    pub fn record_mode(&self, mode: ScalingMode, consecutive_failures: u32, changed: bool) {
        self.mode.store(mode.gauge_value(), Ordering::Relaxed);
        self.consecutive_failures
            .store(consecutive_failures, Ordering::Relaxed);
        if changed {
            self.mode_transitions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejected_forecasts(&self, count: usize) {
        self.forecasts_rejected
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_overrun(&self) {
        self.tick_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mode(&self) -> ScalingMode {
        let v = self.mode.load(Ordering::Relaxed) as usize;
        ScalingMode::ALL
            .get(v)
            .copied()
            .unwrap_or(ScalingMode::Predictive)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let decisions_by_rationale: BTreeMap<&'static str, u64> = DecisionRationale::ALL
            .iter()
            .map(|r| (r.as_str(), self.decisions[*r as usize].load(Ordering::Relaxed)))
            .collect();
        let execution_failures = ExecutorErrorKind::ALL
            .iter()
            .map(|k| (k.as_str(), self.execution_failures[*k as usize].load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            mode: self.mode(),
            decisions_total: decisions_by_rationale.values().sum(),
            decisions_by_rationale,
            last_target_replicas: self.last_target_replicas.load(Ordering::Relaxed),
            last_applied_replicas: self.last_applied_replicas.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            executions_total: self.executions.load(Ordering::Relaxed),
            execution_failures,
            last_execution_latency_ms: self.last_execution_latency_ms.load(Ordering::Relaxed),
            forecasts_rejected_total: self.forecasts_rejected.load(Ordering::Relaxed),
            mode_transitions_total: self.mode_transitions.load(Ordering::Relaxed),
            tick_overruns_total: self.tick_overruns.load(Ordering::Relaxed),
            last_tick_at: self.last_tick_at.load(Ordering::Relaxed),
        }
    }
}
