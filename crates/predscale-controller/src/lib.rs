//! predscale-controller — the periodic planning loop.
//!
//! # Tick
//!
//! ```text
//! ForecastFeed ─snapshot─▶ Ingestor ─▶ decide() ─┐
//! UtilizationFeed ─latest_fresh──────────────────┤
//!                                                ▼
//!            mode: predictive/degraded → stabilize() (hold on ForecastMissing)
//!                  fallback            → reactive_decision()
//!                  recovering          → reactive_decision(), predictive in shadow
//!                                                │
//!                                                ▼
//!                                 ExecutionAdapter::apply()
//!                                                │
//!                    PlannerState ◀── FallbackMonitor::observe()
//!                                                │
//!                       StateStore (state + decision history), PlannerMetrics
//! ```
//!
//! Exactly one decision reaches the adapter per tick. Nothing that goes
//! wrong inside a tick stops the loop; only the shutdown signal does.

pub mod planner_loop;

pub use planner_loop::{PlannerLoop, TickReport};
