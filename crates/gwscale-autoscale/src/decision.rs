//! Scaling decision engine — hysteretic scale-down, gated scale-up.

use tracing::{debug, info, warn};

use gwscale_core::ScalingConfig;
use gwscale_state::ScaleDownVotes;

/// An ideal node count above this is treated as a metric glitch.
pub const OUTLIER_CLAMP: u32 = 160;

/// Node count the observed load calls for, health buffer included.
pub fn ideal_nodes(rps: f64, scaling: &ScalingConfig) -> u32 {
    let per_node = f64::from(scaling.max_concurrent_connections_per_node.max(1));
    let load_nodes = (rps / per_node).max(f64::from(scaling.min_healthy_servers));
    (load_nodes.ceil() as u32).saturating_add(scaling.health_buffer)
}

/// What to do with the pool this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Ideal node count above [`OUTLIER_CLAMP`]; nothing is touched.
    Anomalous { ideal_nodes: u32 },
    /// A scale-down vote was recorded; quorum not reached yet.
    VotePending { votes: u32 },
    /// Quorum reached: ramp down to the averaged vote. The caller clears
    /// the votes once the capacity write is accepted.
    ScaleDown { target: u32 },
    /// Ramp toward the ideal node count.
    ScaleUp { target: u32, quickly: bool },
    /// Scale-up wanted but this run is not scale-up eligible.
    ScaleUpDeferred { target: u32 },
}

/// Turn the ideal node count into a decision, updating the vote list.
///
/// A reading below capacity adds a vote and only acts once more than
/// three votes are pending. A reading at or above capacity clears every
/// pending vote, implausible readings included.
pub fn decide(
    votes: &mut ScaleDownVotes,
    ideal_nodes: u32,
    capacity: u32,
    scale_up_eligible: bool,
    scale_up_quickly: bool,
) -> Decision {
    if ideal_nodes >= capacity {
        clear_votes(votes, ideal_nodes, capacity);
    }

    if ideal_nodes > OUTLIER_CLAMP {
        warn!(ideal_nodes, clamp = OUTLIER_CLAMP, "ideal node count implausible, ignoring tick");
        return Decision::Anomalous { ideal_nodes };
    }

    if ideal_nodes < capacity {
        return match votes.record(ideal_nodes) {
            Some(target) => {
                info!(capacity, target, votes = ?votes.as_slice(), "scale-down quorum reached");
                Decision::ScaleDown { target }
            }
            None => {
                debug!(capacity, ideal_nodes, votes = votes.len(), "scale-down vote recorded");
                Decision::VotePending {
                    votes: votes.len() as u32,
                }
            }
        };
    }

    if scale_up_eligible {
        Decision::ScaleUp {
            target: ideal_nodes,
            quickly: scale_up_quickly,
        }
    } else {
        debug!(ideal_nodes, capacity, "not a scale-up run, skipping");
        Decision::ScaleUpDeferred {
            target: ideal_nodes,
        }
    }
}

/// Drop pending scale-down votes; the streak of low readings is broken.
pub(crate) fn clear_votes(votes: &mut ScaleDownVotes, ideal_nodes: u32, capacity: u32) {
    if !votes.is_empty() {
        debug!(dropped = votes.len(), ideal_nodes, capacity, "pending scale-down votes cleared");
        votes.clear();
    }
}
