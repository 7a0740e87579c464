//! Stability controller — candidate to final decision.
//!
//! Applies, in order: confidence gating, cooldown hysteresis (with the
//! scale-up emergency override), the per-tick step limit, and the replica
//! bounds. The result never moves more than one step from the current
//! replica count and never leaves `[min_replicas, max_replicas]`.

use tracing::debug;

use predscale_core::{
    DecisionRationale, EpochSecs, PlannerState, Ramp, ScaleDirection, ScalingDecision,
    SloConstraints,
};

use crate::ceil_replicas;
use crate::engine::Candidate;

/// Turn a predictive candidate into the decision for this tick.
pub fn stabilize(
    candidate: &Candidate,
    state: &PlannerState,
    slo: &SloConstraints,
    now: EpochSecs,
) -> ScalingDecision {
    let current = state.current_replicas;
    let mut desired = candidate.target;
    let mut rationale = DecisionRationale::Forecast;

    // Noisy forecast: plan with a wider margin and refuse to shrink.
    if candidate.relative_width > slo.confidence_width_ratio {
        let widened = ceil_replicas(candidate.requirement as f64 * slo.confidence_margin_boost)
            .max(candidate.requirement);
        desired = slo.clamp(widened).max(desired).max(current.min(slo.max_replicas));
        rationale = DecisionRationale::ConfidenceGated;
        debug!(
            workload = %state.workload,
            width = candidate.relative_width,
            limit = slo.confidence_width_ratio,
            desired,
            "wide forecast interval, margin widened"
        );
    }

    let direction = ScaleDirection::between(current, desired);
    let emergency = direction == ScaleDirection::Up
        && desired as f64 > current as f64 * slo.emergency_multiple;

    if in_cooldown(state, direction, slo, now) {
        if emergency {
            rationale = DecisionRationale::EmergencyOverride;
            debug!(
                workload = %state.workload,
                from = current,
                desired,
                "cooldown bypassed for emergency scale-up"
            );
        } else {
            debug!(
                workload = %state.workload,
                from = current,
                desired,
                ?direction,
                "change suppressed by cooldown"
            );
            return hold(state, slo, DecisionRationale::Cooldown, now);
        }
    }

    let limited = rate_limit(current, desired, slo);
    let target = slo.clamp(limited);
    let ramp = if limited != desired && rationale != DecisionRationale::EmergencyOverride {
        rationale = DecisionRationale::RateLimited;
        Ramp::Gradual
    } else {
        Ramp::Immediate
    };

    ScalingDecision {
        workload: state.workload.clone(),
        target_replicas: target,
        resources: slo.resources,
        ramp,
        rationale,
        mode: state.mode,
        decided_at: now,
    }
}

/// Clip a desired count to at most one step away from `current`.
pub fn rate_limit(current: u32, desired: u32, slo: &SloConstraints) -> u32 {
    match ScaleDirection::between(current, desired) {
        ScaleDirection::Up => desired.min(current.saturating_add(slo.max_scale_up_step)),
        ScaleDirection::Down => desired.max(current.saturating_sub(slo.max_scale_down_step)),
        ScaleDirection::Steady => desired,
    }
}

/// Keep the current replica count (pulled into bounds if it drifted out).
pub fn hold(
    state: &PlannerState,
    slo: &SloConstraints,
    rationale: DecisionRationale,
    now: EpochSecs,
) -> ScalingDecision {
    ScalingDecision {
        workload: state.workload.clone(),
        target_replicas: slo.clamp(state.current_replicas),
        resources: slo.resources,
        ramp: Ramp::Immediate,
        rationale,
        mode: state.mode,
        decided_at: now,
    }
}

/// Whether a move in `direction` is still inside a cooldown window.
///
/// Repeating the last direction waits for that direction's cooldown. A
/// scale-down right after a scale-up waits for the scale-down cooldown.
fn in_cooldown(
    state: &PlannerState,
    direction: ScaleDirection,
    slo: &SloConstraints,
    now: EpochSecs,
) -> bool {
    let Some(last) = state.last_decision_at else {
        return false;
    };
    let elapsed = now.saturating_sub(last);
    match (direction, state.last_direction) {
        (ScaleDirection::Up, ScaleDirection::Up) => elapsed < slo.scale_up_cooldown.as_secs(),
        (ScaleDirection::Down, ScaleDirection::Down | ScaleDirection::Up) => {
            elapsed < slo.scale_down_cooldown.as_secs()
        }
        _ => false,
    }
}
