//! predscale-planner — the synchronous half of a planning tick.
//!
//! Everything here is deterministic and free of I/O: given forecasts,
//! constraints, the planner state and a timestamp, it produces a decision.
//!
//! # Pipeline
//!
//! ```text
//! HorizonSet ──▶ engine::decide() ──▶ Candidate
//!                                        │
//!              mode = predictive/degraded│
//!                                        ▼
//!                          stability::stabilize() ──▶ ScalingDecision
//!
//!              mode = fallback/recovering
//! UtilizationSample ──▶ reactive::reactive_decision() ──▶ ScalingDecision
//!
//! TickOutcome ──▶ FallbackMonitor::observe() ──▶ ModeUpdate (next tick's mode)
//! ```
//!
//! # Sizing rule
//!
//! ```text
//! requirement(h) = ceil(upper(h) * safety_margin / (capacity * target_utilization))
//! near           = max(requirement(short), requirement(medium))
//! if long present and (near - long) / near > relaxation_threshold:
//!     near = ceil(near * (1 - blend_weight) + long * blend_weight)
//! candidate      = clamp(near, min_replicas, max_replicas)
//! ```

pub mod engine;
pub mod fallback;
pub mod reactive;
pub mod stability;

pub use engine::{Candidate, decide, replica_requirement};
pub use fallback::{FallbackMonitor, ModeUpdate, TickOutcome};
pub use reactive::{reactive_decision, reactive_desired};
pub use stability::{hold, rate_limit, stabilize};

/// Round a fractional replica requirement up, ignoring float noise just
/// above an integer (e.g. `4.000000000001` is 4).
pub(crate) fn ceil_replicas(x: f64) -> u32 {
    let c = (x - 1e-9).ceil();
    if c <= 0.0 {
        0
    } else if c >= u32::MAX as f64 {
        u32::MAX
    } else {
        c as u32
    }
}
