//! StateStore — redb-backed persistence for planner state and decisions.
//!
//! The loop writes its `PlannerState` after every tick and appends each
//! decision it produced. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use predscale_core::{PlannerState, ScalingDecision};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Tie-breaker for decisions recorded within the same second.
    seq: Arc<AtomicU64>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_db(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_db(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PLANNER_STATE).map_err(map_err!(Table))?;
        txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Planner state ──────────────────────────────────────────────

    /// Insert or replace the planner state for its workload.
    pub fn put_planner_state(&self, state: &PlannerState) -> StateResult<()> {
        let value = serde_json::to_vec(state).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PLANNER_STATE).map_err(map_err!(Table))?;
            table
                .insert(state.workload.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(workload = %state.workload, replicas = state.current_replicas, "planner state stored");
        Ok(())
    }

    /// Last persisted planner state for a workload.
    pub fn get_planner_state(&self, workload: &str) -> StateResult<Option<PlannerState>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PLANNER_STATE).map_err(map_err!(Table))?;
        match table.get(workload).map_err(map_err!(Read))? {
            Some(guard) => {
                let state: PlannerState =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    // ── Decisions ──────────────────────────────────────────────────

    /// Append a decision to the workload's history.
    pub fn append_decision(&self, decision: &ScalingDecision) -> StateResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let key = format!(
            "{}:{:020}:{:010}",
            decision.workload, decision.decided_at, seq
        );
        let value = serde_json::to_vec(decision).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// The `limit` most recent decisions for a workload, oldest first.
    pub fn list_recent_decisions(
        &self,
        workload: &str,
        limit: usize,
    ) -> StateResult<Vec<ScalingDecision>> {
        let (start, end) = workload_range(workload);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
        {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            let decision: ScalingDecision =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(decision);
        }
        results.reverse();
        Ok(results)
    }

    /// Drop all but the newest `keep` decisions of a workload. Returns the
    /// number removed.
    pub fn prune_decisions(&self, workload: &str, keep: usize) -> StateResult<u32> {
        let (start, end) = workload_range(workload);
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table
                .range(start.as_str()..end.as_str())
                .map_err(map_err!(Read))?
            {
                let (key, _) = entry.map_err(map_err!(Read))?;
                keys.push(key.value().to_string());
            }
            keys
        };
        if keys.len() <= keep {
            return Ok(0);
        }
        let stale = &keys[..keys.len() - keep];
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
            for key in stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%workload, removed = stale.len(), "decision history pruned");
        Ok(stale.len() as u32)
    }
}

/// Key range covering every decision of one workload.
fn workload_range(workload: &str) -> (String, String) {
    // ';' sorts directly after ':'.
    (format!("{workload}:"), format!("{workload};"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use predscale_core::*;

    fn test_state(workload: &str, replicas: u32) -> PlannerState {
        PlannerState {
            updated_at: 1000,
            ..PlannerState::initial(workload, replicas)
        }
    }

    fn test_decision(workload: &str, target: u32, decided_at: u64) -> ScalingDecision {
        ScalingDecision {
            workload: workload.to_string(),
            target_replicas: target,
            resources: ResourceProfile::default(),
            ramp: Ramp::Immediate,
            rationale: DecisionRationale::Forecast,
            mode: ScalingMode::Predictive,
            decided_at,
        }
    }

    // ── Planner state ──────────────────────────────────────────────

    #[test]
    fn planner_state_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let state = test_state("default/api", 4);

        store.put_planner_state(&state).unwrap();
        let retrieved = store.get_planner_state("default/api").unwrap();

        assert_eq!(retrieved, Some(state));
    }

    #[test]
    fn planner_state_missing_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_planner_state("nope/nothing").unwrap().is_none());
    }

    #[test]
    fn planner_state_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut state = test_state("default/api", 4);
        store.put_planner_state(&state).unwrap();

        state.current_replicas = 6;
        state.mode = ScalingMode::Fallback;
        state.consecutive_failures = 3;
        store.put_planner_state(&state).unwrap();

        let retrieved = store.get_planner_state("default/api").unwrap().unwrap();
        assert_eq!(retrieved.current_replicas, 6);
        assert_eq!(retrieved.mode, ScalingMode::Fallback);
        assert_eq!(retrieved.consecutive_failures, 3);
    }

    // ── Decisions ──────────────────────────────────────────────────

    #[test]
    fn decisions_listed_oldest_first_and_limited() {
        let store = StateStore::open_in_memory().unwrap();
        for (i, at) in [1000u64, 1060, 1120, 1180].iter().enumerate() {
            store
                .append_decision(&test_decision("default/api", i as u32 + 2, *at))
                .unwrap();
        }

        let all = store.list_recent_decisions("default/api", 10).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].decided_at, 1000);
        assert_eq!(all[3].decided_at, 1180);

        let recent = store.list_recent_decisions("default/api", 2).unwrap();
        let times: Vec<u64> = recent.iter().map(|d| d.decided_at).collect();
        assert_eq!(times, vec![1120, 1180]);
    }

    #[test]
    fn decisions_in_same_second_are_kept() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_decision(&test_decision("w", 3, 1000)).unwrap();
        store.append_decision(&test_decision("w", 4, 1000)).unwrap();

        let all = store.list_recent_decisions("w", 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].target_replicas, 4);
    }

    #[test]
    fn decisions_scoped_per_workload() {
        let store = StateStore::open_in_memory().unwrap();
        store.append_decision(&test_decision("ns/a", 3, 1000)).unwrap();
        store.append_decision(&test_decision("ns/ab", 5, 1000)).unwrap();
        store.append_decision(&test_decision("ns/b", 4, 1000)).unwrap();

        let a = store.list_recent_decisions("ns/a", 10).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].target_replicas, 3);
    }

    #[test]
    fn prune_keeps_newest() {
        let store = StateStore::open_in_memory().unwrap();
        for at in 0..10u64 {
            store.append_decision(&test_decision("w", 2, 1000 + at)).unwrap();
        }

        assert_eq!(store.prune_decisions("w", 3).unwrap(), 7);
        let left = store.list_recent_decisions("w", 10).unwrap();
        let times: Vec<u64> = left.iter().map(|d| d.decided_at).collect();
        assert_eq!(times, vec![1007, 1008, 1009]);

        // Nothing more to drop.
        assert_eq!(store.prune_decisions("w", 3).unwrap(), 0);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("planner.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_planner_state(&test_state("prod/api", 7)).unwrap();
            store.append_decision(&test_decision("prod/api", 7, 1000)).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let state = store.get_planner_state("prod/api").unwrap();
        assert_eq!(state.map(|s| s.current_replicas), Some(7));
        assert_eq!(store.list_recent_decisions("prod/api", 5).unwrap().len(), 1);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.list_recent_decisions("any", 10).unwrap().is_empty());
        assert_eq!(store.prune_decisions("any", 0).unwrap(), 0);
    }
}
