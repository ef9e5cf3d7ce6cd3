//! Domain types shared by every gwscale crate.
//!
//! These are produced fresh by the collaborators on every invocation and
//! are never mutated by the controller. Only the pool target is long-lived.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifier of a scale set instance (unique within the pool).
pub type InstanceId = String;

/// Metric name reported by the gateway for open client connections.
pub const CURRENT_CONNECTIONS: &str = "Current Connections";

/// Metric name reported by the gateway for requests served.
pub const TOTAL_REQUESTS: &str = "Total Requests";

/// Metric name reported by the gateway for responses by status code.
pub const RESPONSE_STATUS: &str = "Response Status";

// ── Target ────────────────────────────────────────────────────────

/// The single gateway / scale set pair a controller instance manages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolTarget {
    pub subscription_id: String,
    pub resource_group: String,
    pub gateway_name: String,
    pub scale_set_name: String,
}

impl Default for PoolTarget {
    fn default() -> Self {
        Self {
            subscription_id: "00000000-0000-0000-0000-000000000000".to_string(),
            resource_group: "default".to_string(),
            gateway_name: "appgw".to_string(),
            scale_set_name: "vmss".to_string(),
        }
    }
}

impl PoolTarget {
    /// Storage key for state belonging to this pool: `{resource_group}/{scale_set_name}`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.resource_group, self.scale_set_name)
    }

    /// Fully qualified resource id of the gateway.
    pub fn gateway_resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/applicationGateways/{}",
            self.subscription_id, self.resource_group, self.gateway_name
        )
    }

    /// Fully qualified resource id of the scale set.
    pub fn scale_set_resource_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachineScaleSets/{}",
            self.subscription_id, self.resource_group, self.scale_set_name
        )
    }
}

// ── Backend health ────────────────────────────────────────────────

/// Health classification of a backend member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    /// Classify a raw probe status. Only a case-insensitive `healthy` is
    /// healthy; `Unknown`, `Draining`, empty strings etc. are unhealthy.
    pub fn classify(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("healthy") {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

/// One target of the gateway backend pool, as reported by its probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendMember {
    /// Backend address (the instance's primary private IP).
    pub address: String,
    /// Raw health string from the report.
    pub health: String,
}

impl BackendMember {
    pub fn new(address: impl Into<String>, health: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            health: health.into(),
        }
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::classify(&self.health)
    }
}

/// Backend health for the gateway's single pool / settings binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendHealthReport {
    pub members: Vec<BackendMember>,
}

// ── Pool members ──────────────────────────────────────────────────

/// Lifecycle of a scale set instance as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Succeeded,
    Creating,
    Updating,
    Deleting,
    Failed,
    Other,
}

impl ProvisioningState {
    /// Parse the platform's provisioning state string.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "creating" => Self::Creating,
            "updating" => Self::Updating,
            "deleting" => Self::Deleting,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }

    /// Capacity that is in flight and will soon serve traffic.
    pub fn is_deploying(self) -> bool {
        matches!(self, Self::Creating | Self::Updating)
    }
}

/// One scale set instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolMember {
    pub instance_id: InstanceId,
    pub provisioning_state: ProvisioningState,
}

impl PoolMember {
    pub fn new(instance_id: impl Into<String>, provisioning_state: ProvisioningState) -> Self {
        Self {
            instance_id: instance_id.into(),
            provisioning_state,
        }
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// One read of a named counter over the query window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    /// Aggregated value for the window, if the platform produced one.
    pub value: Option<f64>,
    /// Per-interval values, oldest first. Gaps are `None`.
    #[serde(default)]
    pub history: Vec<Option<f64>>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            name: name.into(),
            value,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Option<f64>>) -> Self {
        self.history = history;
        self
    }

    /// The aggregated value, or the most recent non-empty interval.
    pub fn latest(&self) -> Option<f64> {
        self.value
            .or_else(|| self.history.iter().rev().find_map(|v| *v))
    }
}

/// Metric samples keyed by metric name. Absent counters have no entry.
pub type MetricSet = HashMap<String, MetricSample>;

// ── Autoscale rules ───────────────────────────────────────────────

/// A platform-native autoscale setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoscaleRule {
    pub name: String,
    pub enabled: bool,
    /// Resource id the rule scales.
    pub target_resource_id: String,
}
