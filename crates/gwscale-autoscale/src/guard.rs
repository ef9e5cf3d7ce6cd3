//! External autoscale guard.

use tracing::warn;

use gwscale_core::{AutoscaleRule, AutoscaleRules, PoolTarget};

/// The enabled platform autoscale rule bound to this scale set, if any.
///
/// A failed query counts as "no rule": the controller keeps running
/// rather than going silent on a transient listing error.
pub async fn conflicting_rule(
    rules: &dyn AutoscaleRules,
    target: &PoolTarget,
) -> Option<AutoscaleRule> {
    let rules = match rules.rules(target).await {
        Ok(rules) => rules,
        Err(e) => {
            warn!(error = %e, "autoscale rule query failed, assuming none");
            return None;
        }
    };

    let resource_id = target.scale_set_resource_id();
    let rule = rules
        .into_iter()
        .find(|r| r.enabled && r.target_resource_id.eq_ignore_ascii_case(&resource_id))?;

    warn!(
        rule = %rule.name,
        target = %rule.target_resource_id,
        "platform autoscale rule is active on this scale set, mutations suppressed"
    );
    Some(rule)
}
