//! Carried-over engine memory and per-tick reports.
//!
//! All types serialize to JSON for storage in redb tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gwscale_core::InstanceId;

/// An eviction stamp younger than this blocks another delete request
/// for the same instance.
pub const EVICTION_COOLDOWN_SECS: u64 = 10 * 60;

/// A scale-down is applied once more than this many votes are pending.
pub const SCALE_DOWN_QUORUM: usize = 3;

// ── Cadence ───────────────────────────────────────────────────────

/// Monotonic counters used for modulo phase selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CadenceCounters {
    /// Incremented on every external invocation.
    pub schedule_tick: u64,
    /// Incremented on every invocation that is not throttled.
    pub run: u64,
}

// ── Scale-down votes ──────────────────────────────────────────────

/// Proposed capacities from consecutive scale-down-eligible ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScaleDownVotes {
    votes: Vec<u32>,
}

impl ScaleDownVotes {
    /// Record a proposal. Once the quorum is exceeded, returns the
    /// truncated mean of all pending votes. The votes are kept until
    /// [`clear`](Self::clear) is called after the capacity write succeeds.
    pub fn record(&mut self, proposal: u32) -> Option<u32> {
        self.votes.push(proposal);
        if self.votes.len() > SCALE_DOWN_QUORUM {
            self.mean()
        } else {
            None
        }
    }

    /// Integer-truncated arithmetic mean of the pending votes.
    pub fn mean(&self) -> Option<u32> {
        if self.votes.is_empty() {
            return None;
        }
        let sum: u64 = self.votes.iter().map(|&v| u64::from(v)).sum();
        Some((sum / self.votes.len() as u64) as u32)
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.votes
    }
}

// ── Recent evictions ──────────────────────────────────────────────

/// Instance id → epoch second of the last accepted delete request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentEvictions {
    stamps: BTreeMap<InstanceId, u64>,
}

impl RecentEvictions {
    /// Whether a delete for `instance_id` was requested within the cooldown.
    pub fn is_cooling_down(&self, instance_id: &str, now: u64) -> bool {
        self.stamps
            .get(instance_id)
            .is_some_and(|&at| now.saturating_sub(at) < EVICTION_COOLDOWN_SECS)
    }

    pub fn stamp(&mut self, instance_id: &str, now: u64) {
        self.stamps.insert(instance_id.to_string(), now);
    }

    /// Drop expired stamps. Returns how many were removed.
    pub fn prune(&mut self, now: u64) -> usize {
        let before = self.stamps.len();
        self.stamps
            .retain(|_, at| now.saturating_sub(*at) < EVICTION_COOLDOWN_SECS);
        before - self.stamps.len()
    }

    pub fn last_eviction(&self, instance_id: &str) -> Option<u64> {
        self.stamps.get(instance_id).copied()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

// ── Engine state ──────────────────────────────────────────────────

/// Everything one pool's controller remembers between invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineState {
    pub cadence: CadenceCounters,
    pub votes: ScaleDownVotes,
    pub evictions: RecentEvictions,
}

// ── Tick reports ──────────────────────────────────────────────────

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Dropped by the cadence controller.
    Throttled,
    /// An enabled platform autoscaler owns the pool; nothing was mutated.
    Guarded { rule: String },
    /// The response-status counter was missing.
    TelemetryGap,
    /// The ideal node count was implausibly high.
    Anomalous,
    /// A scale-down proposal was recorded but quorum is not reached.
    ScaleDownPending { votes: u32 },
    /// Scale-up was wanted but this run is not scale-up eligible.
    ScaleUpDeferred,
    /// At least one capacity write was issued.
    Scaled { from: u32, to: u32 },
    /// No capacity write was needed.
    Unchanged,
    /// An upstream call failed and the rest of the tick was skipped.
    Failed { error: String },
}

/// Health counts observed during a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    pub healthy: u32,
    pub unhealthy: u32,
    pub deploying: u32,
}

/// What one invocation saw and did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub pool: String,
    /// Unix timestamp (seconds) when the tick started.
    pub epoch: u64,
    pub schedule_tick: u64,
    pub run: u64,
    pub outcome: TickOutcome,
    pub health: Option<HealthCounts>,
    /// Instances whose deletion was requested this tick.
    pub evicted: Vec<InstanceId>,
    pub capacity: Option<u32>,
    pub rps: Option<f64>,
    pub ideal_nodes: Option<u32>,
    pub pending_votes: u32,
    /// Capacity values written, in order.
    pub capacity_updates: Vec<u32>,
}

impl TickReport {
    pub fn new(pool: &str, epoch: u64, cadence: CadenceCounters) -> Self {
        Self {
            pool: pool.to_string(),
            epoch,
            schedule_tick: cadence.schedule_tick,
            run: cadence.run,
            outcome: TickOutcome::Throttled,
            health: None,
            evicted: Vec::new(),
            capacity: None,
            rps: None,
            ideal_nodes: None,
            pending_votes: 0,
            capacity_updates: Vec::new(),
        }
    }

    /// Composite key: `{pool}:{schedule_tick}` zero-padded for ordering.
    pub fn table_key(&self) -> String {
        format!("{}:{:020}", self.pool, self.schedule_tick)
    }
}
