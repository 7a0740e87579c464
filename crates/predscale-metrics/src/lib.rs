//! predscale-metrics — observability for the planning loop.
//!
//! # Architecture
//!
//! ```text
//! PlannerMetrics (atomics, shared via Arc)
//!   ├── record_resumed()         ← loop start, from persisted state
//!   ├── record_decision()        ← once per tick
//!   ├── record_execution()       ← adapter outcome
//!   ├── record_mode()            ← fallback monitor update
//!   ├── record_rejected_forecasts(), record_overrun()
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{MetricsSnapshot, PlannerMetrics};
pub use prometheus::render_prometheus;
