//! gwscale-state — the controller's memory between invocations.
//!
//! Every invocation is a fresh read of the platform plus a small amount
//! of carried-over state: the cadence counters, the pending scale-down
//! votes, and the recent eviction stamps. These live in an explicit
//! [`EngineState`] value so independent pools never share memory and
//! tests can start from a clean slate.
//!
//! # Persistence
//!
//! [`StateStore`] is backed by [redb](https://docs.rs/redb). Values are
//! JSON-serialized into `&[u8]` columns keyed by the pool key
//! (`{resource_group}/{scale_set_name}`); tick reports use
//! `{pool}:{schedule_tick}` so a prefix scan returns them in order.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
