//! redb table definitions for the planner state store.

use redb::TableDefinition;

/// Latest `PlannerState` keyed by workload id.
pub const PLANNER_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("planner_state");

/// `ScalingDecision` history keyed by `{workload}:{decided_at:020}:{seq:010}`.
pub const DECISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("decisions");
