//! gwscale-health — backend health and bad-node eviction.
//!
//! The gateway's own probe decides which backends are healthy; this crate
//! only classifies the report and maps unhealthy addresses back to scale
//! set instances so they can be removed.
//!
//! # Eviction pass
//!
//! ```text
//! unhealthy addresses ──┐
//! list_members() ───────┼─► Succeeded only ─► primary_address() ─► match
//!                       │                       (failure: skip member)
//! RecentEvictions ──────┴─► drop ids deleted < 10 min ago
//!                          └─► delete_instances(batch) ─► stamp batch
//! ```
//!
//! Stamps are written only after the delete request is accepted, so a
//! failed request leaves the instances eligible on the next pass.

pub mod aggregator;
pub mod evictor;

pub use aggregator::{HealthSummary, aggregate};
pub use evictor::{EvictionOutcome, evict_unhealthy};
