//! In-memory cloud — a simulated gateway + scale set pair.
//!
//! Implements every collaborator trait over a single mutex-guarded model.
//! The daemon uses it for development runs, the test suites use it as a
//! recording double: every deletion batch and capacity write is kept, and
//! individual calls can be made to fail once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::cloud::*;
use crate::error::{CloudError, CloudResult};
use crate::types::*;

/// One simulated scale set instance.
#[derive(Debug, Clone)]
struct SimMember {
    instance_id: InstanceId,
    state: ProvisioningState,
    /// `None` makes address resolution fail for this member.
    address: Option<String>,
    /// Raw probe status reported for this member's address.
    health: String,
}

#[derive(Debug, Default)]
struct PoolModel {
    members: Vec<SimMember>,
    /// Backend entries that do not belong to any pool member.
    stray_backends: Vec<BackendMember>,
    capacity: u32,
    rules: Vec<AutoscaleRule>,
    metrics: MetricSet,
    deletions: Vec<Vec<InstanceId>>,
    capacity_updates: Vec<u32>,
    /// One-shot failures keyed by call name.
    failures: HashSet<&'static str>,
    next_index: u32,
}

impl PoolModel {
    fn take_failure(&mut self, call: &'static str) -> CloudResult<()> {
        if self.failures.remove(call) {
            debug!(call, "injected failure");
            return Err(CloudError::upstream(call, "injected failure"));
        }
        Ok(())
    }

    fn live_count(&self) -> u32 {
        self.members
            .iter()
            .filter(|m| m.state != ProvisioningState::Deleting)
            .count() as u32
    }

    fn spawn_member(&mut self) {
        let index = self.next_index;
        self.next_index += 1;
        self.members.push(SimMember {
            instance_id: index.to_string(),
            state: ProvisioningState::Creating,
            address: Some(format!("10.0.{}.{}", index / 250, index % 250 + 4)),
            health: "Unknown".to_string(),
        });
    }

    /// Grow or shrink membership to match capacity. Scale-in removes the
    /// newest live members first.
    fn reconcile(&mut self) {
        while self.live_count() < self.capacity {
            self.spawn_member();
        }
        while self.live_count() > self.capacity {
            if let Some(pos) = self
                .members
                .iter()
                .rposition(|m| m.state != ProvisioningState::Deleting)
            {
                self.members.remove(pos);
            }
        }
    }
}

/// A simulated pool. Cheap to clone; clones share the same model.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCloud {
    model: Arc<Mutex<PoolModel>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn model(&self) -> MutexGuard<'_, PoolModel> {
        self.model.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a member without touching capacity bookkeeping beyond counting it.
    pub fn with_member(
        self,
        instance_id: &str,
        state: ProvisioningState,
        address: Option<&str>,
        health: &str,
    ) -> Self {
        {
            let mut model = self.model();
            model.members.push(SimMember {
                instance_id: instance_id.to_string(),
                state,
                address: address.map(str::to_string),
                health: health.to_string(),
            });
            model.capacity = model.live_count();
            if let Ok(n) = instance_id.parse::<u32>() {
                model.next_index = model.next_index.max(n + 1);
            }
        }
        self
    }

    /// Add `count` succeeded, healthy members with generated ids and addresses.
    pub fn with_healthy_members(self, count: u32) -> Self {
        {
            let mut model = self.model();
            for _ in 0..count {
                model.spawn_member();
                if let Some(m) = model.members.last_mut() {
                    m.state = ProvisioningState::Succeeded;
                    m.health = "Healthy".to_string();
                }
            }
            model.capacity = model.live_count();
        }
        self
    }

    /// Override the reported capacity without reconciling membership.
    pub fn with_capacity(self, capacity: u32) -> Self {
        self.model().capacity = capacity;
        self
    }

    pub fn with_stray_backend(self, address: &str, health: &str) -> Self {
        self.model()
            .stray_backends
            .push(BackendMember::new(address, health));
        self
    }

    pub fn with_rule(self, rule: AutoscaleRule) -> Self {
        self.model().rules.push(rule);
        self
    }

    pub fn set_member_health(&self, instance_id: &str, health: &str) {
        let mut model = self.model();
        if let Some(m) = model.members.iter_mut().find(|m| m.instance_id == instance_id) {
            m.health = health.to_string();
        }
    }

    pub fn set_metric(&self, sample: MetricSample) {
        self.model().metrics.insert(sample.name.clone(), sample);
    }

    pub fn remove_metric(&self, name: &str) {
        self.model().metrics.remove(name);
    }

    /// Make the next call named `call` fail with an upstream error.
    pub fn fail_next(&self, call: &'static str) {
        self.model().failures.insert(call);
    }

    /// Every `delete_instances` batch issued so far.
    pub fn deletions(&self) -> Vec<Vec<InstanceId>> {
        self.model().deletions.clone()
    }

    /// Every `set_capacity` value issued so far.
    pub fn capacity_updates(&self) -> Vec<u32> {
        self.model().capacity_updates.clone()
    }

    pub fn current_capacity(&self) -> u32 {
        self.model().capacity
    }

    pub fn members(&self) -> Vec<PoolMember> {
        self.model()
            .members
            .iter()
            .map(|m| PoolMember::new(m.instance_id.clone(), m.state))
            .collect()
    }

    /// Advance the simulated platform: deleted members disappear and
    /// provisioning members come up healthy.
    pub fn settle(&self) {
        let mut model = self.model();
        model
            .members
            .retain(|m| m.state != ProvisioningState::Deleting);
        for m in model.members.iter_mut() {
            if m.state.is_deploying() {
                m.state = ProvisioningState::Succeeded;
                m.health = "Healthy".to_string();
            }
        }
        model.reconcile();
    }
}

impl GatewayHealth for InMemoryCloud {
    fn backend_health<'a>(
        &'a self,
        _target: &'a PoolTarget,
    ) -> BoxFuture<'a, CloudResult<BackendHealthReport>> {
        let result = {
            let mut model = self.model();
            model.take_failure("backend_health").map(|()| {
                let mut members: Vec<BackendMember> = model
                    .members
                    .iter()
                    .filter(|m| m.state != ProvisioningState::Deleting)
                    .filter_map(|m| {
                        m.address
                            .as_ref()
                            .map(|addr| BackendMember::new(addr.clone(), m.health.clone()))
                    })
                    .collect();
                members.extend(model.stray_backends.iter().cloned());
                BackendHealthReport { members }
            })
        };
        Box::pin(async move { result })
    }
}

impl MetricsSource for InMemoryCloud {
    fn metrics<'a>(
        &'a self,
        _resource_id: &'a str,
        _window: Duration,
    ) -> BoxFuture<'a, CloudResult<MetricSet>> {
        let result = {
            let mut model = self.model();
            model.take_failure("metrics").map(|()| model.metrics.clone())
        };
        Box::pin(async move { result })
    }
}

impl ScaleSet for InMemoryCloud {
    fn list_members<'a>(
        &'a self,
        _target: &'a PoolTarget,
    ) -> BoxFuture<'a, CloudResult<Vec<PoolMember>>> {
        let failure = self.model().take_failure("list_members");
        let result = failure.map(|()| self.members());
        Box::pin(async move { result })
    }

    fn primary_address<'a>(
        &'a self,
        _target: &'a PoolTarget,
        instance_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<String>> {
        let result = {
            let mut model = self.model();
            model.take_failure("primary_address").and_then(|()| {
                let member = model
                    .members
                    .iter()
                    .find(|m| m.instance_id == instance_id)
                    .ok_or_else(|| CloudError::NotFound(instance_id.to_string()))?;
                member.address.clone().ok_or_else(|| CloudError::Resolution {
                    instance_id: instance_id.to_string(),
                    message: "no network interface".to_string(),
                })
            })
        };
        Box::pin(async move { result })
    }

    fn capacity<'a>(&'a self, _target: &'a PoolTarget) -> BoxFuture<'a, CloudResult<u32>> {
        let result = {
            let mut model = self.model();
            model.take_failure("capacity").map(|()| model.capacity)
        };
        Box::pin(async move { result })
    }

    fn delete_instances<'a>(
        &'a self,
        _target: &'a PoolTarget,
        instance_ids: &'a [InstanceId],
    ) -> BoxFuture<'a, CloudResult<()>> {
        let result = {
            let mut model = self.model();
            model.take_failure("delete_instances").map(|()| {
                let mut removed = 0;
                for m in model.members.iter_mut() {
                    if instance_ids.contains(&m.instance_id)
                        && m.state != ProvisioningState::Deleting
                    {
                        m.state = ProvisioningState::Deleting;
                        removed += 1;
                    }
                }
                // Deleting specific instances lowers the sku capacity.
                model.capacity = model.capacity.saturating_sub(removed);
                model.deletions.push(instance_ids.to_vec());
            })
        };
        Box::pin(async move { result })
    }

    fn set_capacity<'a>(
        &'a self,
        _target: &'a PoolTarget,
        capacity: u32,
    ) -> BoxFuture<'a, CloudResult<()>> {
        let result = {
            let mut model = self.model();
            model.take_failure("set_capacity").map(|()| {
                model.capacity = capacity;
                model.capacity_updates.push(capacity);
                model.reconcile();
            })
        };
        Box::pin(async move { result })
    }
}

impl AutoscaleRules for InMemoryCloud {
    fn rules<'a>(&'a self, _target: &'a PoolTarget) -> BoxFuture<'a, CloudResult<Vec<AutoscaleRule>>> {
        let result = {
            let mut model = self.model();
            model.take_failure("rules").map(|()| model.rules.clone())
        };
        Box::pin(async move { result })
    }
}
