//! gwscale-core — shared vocabulary for the gwscale controller.
//!
//! Holds the per-invocation data model (backend members, pool members,
//! metric samples), the collaborator interfaces the controller consumes,
//! the `gwscale.toml` configuration, and an in-memory cloud used for
//! development runs and tests.
//!
//! # Collaborators
//!
//! ```text
//! GatewayHealth   → backend_health()      (load balancer probe report)
//! MetricsSource   → metrics()             (named counters over a window)
//! ScaleSet        → list / resolve / delete / capacity / set_capacity
//! AutoscaleRules  → rules()               (platform-native autoscalers)
//! ```
//!
//! All collaborator methods return boxed futures so the traits stay
//! object-safe and the controller can hold them as `Arc<dyn _>`.

pub mod cloud;
pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use cloud::{AutoscaleRules, BoxFuture, GatewayHealth, MetricsSource, ScaleSet};
pub use config::{
    CadenceConfig, ConfigError, MetricsConfig, MetricsSourceKind, ScalerConfig, ScalingConfig,
    parse_duration,
};
pub use error::{CloudError, CloudResult};
pub use memory::InMemoryCloud;
pub use types::*;
