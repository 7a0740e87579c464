//! Fallback monitor — the planner's mode state machine.
//!
//! ```text
//!   Predictive ──failure──▶ Degraded ──N failures in window / rejection──▶ Fallback
//!       ▲                      │                                             │
//!       └──────clean tick──────┘                          M fresh forecasts  │
//!       ▲                                                                    ▼
//!       └────────────── M agreeing ticks ─────────────────────────── Recovering
//!                                             disagreement / failure ──▶ Fallback
//! ```
//!
//! The monitor is fed one `TickOutcome` per tick and rewrites the mode and
//! streak counters of the `PlannerState`; the new mode governs the next tick.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use predscale_core::{EpochSecs, ExecutorErrorKind, FallbackConfig, PlannerState, ScalingMode};

/// What happened during one tick, as far as mode tracking is concerned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// A candidate could be computed from valid, fresh forecasts.
    pub forecast_ok: bool,
    /// Outcome of applying the tick's decision.
    pub execution: Result<(), ExecutorErrorKind>,
    /// While recovering: whether the predictive and reactive targets agreed.
    /// `None` when either side could not be computed.
    pub agreement: Option<bool>,
    pub at: EpochSecs,
}

impl TickOutcome {
    fn failed(&self) -> bool {
        !self.forecast_ok || self.execution.is_err()
    }

    fn rejected(&self) -> bool {
        self.execution == Err(ExecutorErrorKind::Rejected)
    }
}

/// Mode change (or lack of one) produced by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeUpdate {
    pub from: ScalingMode,
    pub to: ScalingMode,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl ModeUpdate {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Tracks forecast and execution health across ticks.
#[derive(Debug, Clone)]
pub struct FallbackMonitor {
    config: FallbackConfig,
    /// Timestamps of the current run of failures, oldest first.
    failures: VecDeque<EpochSecs>,
}

impl FallbackMonitor {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            failures: VecDeque::new(),
        }
    }

    /// Rebuild the failure window from persisted state after a restart.
    pub fn resume(config: FallbackConfig, state: &PlannerState, now: EpochSecs) -> Self {
        let mut monitor = Self::new(config);
        if matches!(state.mode, ScalingMode::Predictive | ScalingMode::Degraded) {
            let at = if state.updated_at == 0 { now } else { state.updated_at };
            monitor
                .failures
                .extend(std::iter::repeat_n(at, state.consecutive_failures as usize));
            monitor.prune(now);
        }
        monitor
    }

    /// Failures currently counted toward the fallback threshold.
    pub fn window_failures(&self) -> usize {
        self.failures.len()
    }

    /// Fold one tick's outcome into `state` and report the transition.
    pub fn observe(&mut self, state: &mut PlannerState, outcome: &TickOutcome) -> ModeUpdate {
        let from = state.mode;
        match from {
            ScalingMode::Predictive | ScalingMode::Degraded => {
                self.observe_predictive(state, outcome)
            }
            ScalingMode::Fallback => self.observe_fallback(state, outcome),
            ScalingMode::Recovering => self.observe_recovering(state, outcome),
        }

        let update = ModeUpdate {
            from,
            to: state.mode,
            consecutive_failures: state.consecutive_failures,
            consecutive_successes: state.consecutive_successes,
        };
        if update.changed() {
            if update.to == ScalingMode::Fallback {
                warn!(
                    workload = %state.workload,
                    from = %update.from,
                    failures = update.consecutive_failures,
                    execution = ?outcome.execution,
                    "switching to reactive fallback"
                );
            } else {
                info!(
                    workload = %state.workload,
                    from = %update.from,
                    to = %update.to,
                    "planner mode changed"
                );
            }
        }
        update
    }

    fn observe_predictive(&mut self, state: &mut PlannerState, outcome: &TickOutcome) {
        if !outcome.failed() {
            self.failures.clear();
            state.mode = ScalingMode::Predictive;
            state.consecutive_failures = 0;
            state.consecutive_successes = state.consecutive_successes.saturating_add(1);
            return;
        }

        self.failures.push_back(outcome.at);
        self.prune(outcome.at);
        let count = self.failures.len() as u32;
        state.consecutive_failures = count;
        state.consecutive_successes = 0;

        if outcome.rejected() || count >= self.config.failure_threshold {
            self.failures.clear();
            state.mode = ScalingMode::Fallback;
        } else {
            state.mode = ScalingMode::Degraded;
            debug!(
                workload = %state.workload,
                failures = count,
                threshold = self.config.failure_threshold,
                "failure recorded"
            );
        }
    }

    fn observe_fallback(&mut self, state: &mut PlannerState, outcome: &TickOutcome) {
        state.consecutive_failures = if outcome.execution.is_err() {
            state.consecutive_failures.saturating_add(1)
        } else {
            0
        };

        if !outcome.forecast_ok {
            state.consecutive_successes = 0;
            return;
        }
        state.consecutive_successes = state.consecutive_successes.saturating_add(1);
        if state.consecutive_successes >= self.config.recovery_threshold {
            state.mode = ScalingMode::Recovering;
            state.consecutive_successes = 0;
            state.consecutive_failures = 0;
        }
    }

    fn observe_recovering(&mut self, state: &mut PlannerState, outcome: &TickOutcome) {
        if outcome.failed() || outcome.agreement == Some(false) {
            state.mode = ScalingMode::Fallback;
            state.consecutive_successes = 0;
            state.consecutive_failures = u32::from(outcome.failed());
            return;
        }

        if outcome.agreement == Some(true) {
            state.consecutive_successes = state.consecutive_successes.saturating_add(1);
            if state.consecutive_successes >= self.config.recovery_threshold {
                self.failures.clear();
                state.mode = ScalingMode::Predictive;
                state.consecutive_successes = 0;
                state.consecutive_failures = 0;
            }
        }
    }

    /// Drop failures older than the window.
    fn prune(&mut self, now: EpochSecs) {
        let window = self.config.failure_window.as_secs();
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_sub(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}
