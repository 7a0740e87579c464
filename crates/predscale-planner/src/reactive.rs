//! Reactive rule used while the forecast signal is not trusted.

use tracing::debug;

use predscale_core::{
    DecisionRationale, EpochSecs, PlannerState, Ramp, ScalingDecision, SloConstraints,
    UtilizationSample,
};

use crate::ceil_replicas;
use crate::stability::{hold, rate_limit};

/// Replicas that would bring observed utilization back to the target,
/// clipped to bounds but not rate limited.
pub fn reactive_desired(utilization: f64, current: u32, slo: &SloConstraints) -> u32 {
    let base = current.max(1) as f64;
    slo.clamp(ceil_replicas(utilization / slo.target_utilization * base))
}

/// Decision from last observed utilization, under the same step limits and
/// bounds as the predictive path. Holds when there is no fresh observation.
pub fn reactive_decision(
    sample: Option<UtilizationSample>,
    state: &PlannerState,
    slo: &SloConstraints,
    now: EpochSecs,
) -> ScalingDecision {
    let Some(sample) = sample else {
        debug!(workload = %state.workload, "no fresh utilization sample, holding");
        return hold(state, slo, DecisionRationale::NoObservation, now);
    };

    let current = state.current_replicas;
    let desired = reactive_desired(sample.utilization, current, slo);
    let limited = rate_limit(current, desired, slo);
    let ramp = if limited == desired {
        Ramp::Immediate
    } else {
        Ramp::Gradual
    };
    debug!(
        workload = %state.workload,
        utilization = sample.utilization,
        current,
        desired,
        target = limited,
        "reactive decision"
    );

    ScalingDecision {
        workload: state.workload.clone(),
        target_replicas: slo.clamp(limited),
        resources: slo.resources,
        ramp,
        rationale: DecisionRationale::Reactive,
        mode: state.mode,
        decided_at: now,
    }
}
