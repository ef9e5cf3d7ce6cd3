//! StateStore — redb-backed persistence for engine state and tick reports.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! tests and throwaway runs).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

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
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(ENGINE_STATE).map_err(map_err!(Table))?;
        txn.open_table(TICK_REPORTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Engine state ───────────────────────────────────────────────

    /// Load the engine state for a pool, or a fresh one if none is stored.
    pub fn load_engine_state(&self, pool: &str) -> StateResult<EngineState> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENGINE_STATE).map_err(map_err!(Table))?;
        match table.get(pool).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(EngineState::default()),
        }
    }

    /// Insert or replace the engine state for a pool.
    pub fn save_engine_state(&self, pool: &str, state: &EngineState) -> StateResult<()> {
        let value = serde_json::to_vec(state).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENGINE_STATE).map_err(map_err!(Table))?;
            table
                .insert(pool, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pool, votes = state.votes.len(), evictions = state.evictions.len(), "engine state stored");
        Ok(())
    }

    /// Forget everything remembered for a pool. Returns true if it existed.
    pub fn reset_engine_state(&self, pool: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ENGINE_STATE).map_err(map_err!(Table))?;
            existed = table.remove(pool).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pool, existed, "engine state reset");
        Ok(existed)
    }

    /// Pool keys that have stored engine state.
    pub fn list_pools(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENGINE_STATE).map_err(map_err!(Table))?;
        let mut pools = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            pools.push(key.value().to_string());
        }
        Ok(pools)
    }

    // ── Tick reports ───────────────────────────────────────────────

    /// Insert a tick report.
    pub fn put_report(&self, report: &TickReport) -> StateResult<()> {
        let key = report.table_key();
        let value = serde_json::to_vec(report).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TICK_REPORTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Most recent reports for a pool, newest first.
    pub fn list_reports(&self, pool: &str, limit: usize) -> StateResult<Vec<TickReport>> {
        let prefix = format!("{pool}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TICK_REPORTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let report: TickReport =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(report);
                if results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }

    pub fn latest_report(&self, pool: &str) -> StateResult<Option<TickReport>> {
        Ok(self.list_reports(pool, 1)?.into_iter().next())
    }

    /// Keep only the newest `keep` reports for a pool. Returns number deleted.
    pub fn prune_reports(&self, pool: &str, keep: usize) -> StateResult<usize> {
        let prefix = format!("{pool}:");
        let stale: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(TICK_REPORTS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(&prefix) {
                    keys.push(key.value().to_string());
                }
            }
            let excess = keys.len().saturating_sub(keep);
            keys.truncate(excess);
            keys
        };

        if stale.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TICK_REPORTS).map_err(map_err!(Table))?;
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%pool, deleted = stale.len(), "tick reports pruned");
        Ok(stale.len())
    }
}
