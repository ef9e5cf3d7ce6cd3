//! redb table definitions for the gwscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized types).

use redb::TableDefinition;

/// Engine state keyed by pool key `{resource_group}/{scale_set_name}`.
pub const ENGINE_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("engine_state");

/// Tick reports keyed by `{pool_key}:{schedule_tick:020}`.
pub const TICK_REPORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tick_reports");
