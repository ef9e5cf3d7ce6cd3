//! Bad-node eviction — maps unhealthy backend addresses to scale set
//! instances and requests their removal in one batch.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use gwscale_core::{CloudResult, InstanceId, PoolTarget, ProvisioningState, ScaleSet};
use gwscale_state::RecentEvictions;

/// Result of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Instances included in the delete request.
    pub evicted: Vec<InstanceId>,
    /// Unhealthy instances skipped because a delete is already in flight.
    pub cooling_down: Vec<InstanceId>,
    /// Instances whose address could not be resolved.
    pub unresolved: Vec<InstanceId>,
}

impl EvictionOutcome {
    /// Whether a delete request was issued.
    pub fn did_work(&self) -> bool {
        !self.evicted.is_empty()
    }
}

/// Remove every stable instance whose address is reported unhealthy.
///
/// Only `Succeeded` instances are candidates. An instance with a stamp in
/// `evictions` younger than the cooldown is skipped. Listing and delete
/// failures are returned to the caller; an address lookup failure only
/// skips that instance.
///
/// `min_healthy_servers` is reported for operators but does not gate
/// eviction: every unhealthy instance is a candidate.
pub async fn evict_unhealthy(
    scale_set: &dyn ScaleSet,
    target: &PoolTarget,
    unhealthy_addresses: &[String],
    evictions: &mut RecentEvictions,
    min_healthy_servers: u32,
    now: u64,
) -> CloudResult<EvictionOutcome> {
    let mut outcome = EvictionOutcome::default();

    let pruned = evictions.prune(now);
    if pruned > 0 {
        debug!(pruned, "expired eviction stamps dropped");
    }

    if unhealthy_addresses.is_empty() {
        return Ok(outcome);
    }

    info!(
        unhealthy = unhealthy_addresses.len(),
        min_healthy_servers, "unhealthy backends found, scanning scale set"
    );

    let bad: HashSet<&str> = unhealthy_addresses.iter().map(String::as_str).collect();
    let members = scale_set.list_members(target).await?;

    for member in members
        .iter()
        .filter(|m| m.provisioning_state == ProvisioningState::Succeeded)
    {
        let address = match scale_set.primary_address(target, &member.instance_id).await {
            Ok(address) => address,
            Err(e) => {
                warn!(instance_id = %member.instance_id, error = %e, "skipping instance with unresolvable address");
                outcome.unresolved.push(member.instance_id.clone());
                continue;
            }
        };

        if !bad.contains(address.as_str()) {
            continue;
        }

        if evictions.is_cooling_down(&member.instance_id, now) {
            debug!(
                instance_id = %member.instance_id,
                %address,
                "delete already requested, skipping"
            );
            outcome.cooling_down.push(member.instance_id.clone());
            continue;
        }

        info!(instance_id = %member.instance_id, %address, "bad instance detected");
        outcome.evicted.push(member.instance_id.clone());
    }

    if outcome.evicted.is_empty() {
        debug!("no instances to remove");
        return Ok(outcome);
    }

    scale_set.delete_instances(target, &outcome.evicted).await?;
    for id in &outcome.evicted {
        evictions.stamp(id, now);
    }

    info!(count = outcome.evicted.len(), instances = ?outcome.evicted, "removing bad instances");
    Ok(outcome)
}
