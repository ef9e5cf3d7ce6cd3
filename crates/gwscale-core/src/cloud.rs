//! Collaborator interfaces consumed by the controller.
//!
//! Credential handling and concrete SDK clients live outside this
//! workspace; anything implementing these traits can be plugged in.
//! None of the calls retry internally, a failure surfaces immediately.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::CloudResult;
use crate::types::*;

/// Boxed future alias used by every collaborator method.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reads the gateway's backend health report.
pub trait GatewayHealth: Send + Sync {
    /// Health of every member in the gateway's backend pool.
    fn backend_health<'a>(&'a self, target: &'a PoolTarget)
    -> BoxFuture<'a, CloudResult<BackendHealthReport>>;
}

/// Reads named counters for a resource over a trailing window.
///
/// Counters the platform has no data for are left out of the returned
/// set; that is not an error.
pub trait MetricsSource: Send + Sync {
    fn metrics<'a>(
        &'a self,
        resource_id: &'a str,
        window: Duration,
    ) -> BoxFuture<'a, CloudResult<MetricSet>>;
}

/// Operations on the scale set behind the gateway.
pub trait ScaleSet: Send + Sync {
    /// Current instances with their provisioning state.
    fn list_members<'a>(&'a self, target: &'a PoolTarget)
    -> BoxFuture<'a, CloudResult<Vec<PoolMember>>>;

    /// Primary private address of one instance.
    fn primary_address<'a>(
        &'a self,
        target: &'a PoolTarget,
        instance_id: &'a str,
    ) -> BoxFuture<'a, CloudResult<String>>;

    /// Configured capacity (sku capacity) of the scale set.
    fn capacity<'a>(&'a self, target: &'a PoolTarget) -> BoxFuture<'a, CloudResult<u32>>;

    /// Request removal of a batch of instances. Completion of the
    /// deletion on the platform side is not awaited.
    fn delete_instances<'a>(
        &'a self,
        target: &'a PoolTarget,
        instance_ids: &'a [InstanceId],
    ) -> BoxFuture<'a, CloudResult<()>>;

    /// Set the scale set capacity.
    fn set_capacity<'a>(&'a self, target: &'a PoolTarget, capacity: u32)
    -> BoxFuture<'a, CloudResult<()>>;
}

/// Lists platform-native autoscale settings.
pub trait AutoscaleRules: Send + Sync {
    fn rules<'a>(&'a self, target: &'a PoolTarget) -> BoxFuture<'a, CloudResult<Vec<AutoscaleRule>>>;
}
