//! predscale-state — embedded persistence for the planner.
//!
//! Backed by [redb](https://docs.rs/redb). Stores the last written
//! `PlannerState` per workload so a restarted daemon resumes from the last
//! applied replica count, plus a bounded history of `ScalingDecision`s for
//! the HTTP surface.
//!
//! Values are JSON-serialized into redb's `&[u8]` columns. Decision keys
//! are `{workload}:{decided_at:020}:{seq:010}` so a range scan over one
//! workload returns its decisions in chronological order.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
