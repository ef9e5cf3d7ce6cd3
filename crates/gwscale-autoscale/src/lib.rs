//! gwscale-autoscale — the decision engine and per-tick controller.
//!
//! # Tick flow
//!
//! ```text
//! CadenceController::advance()      throttled? → done
//!   │
//!   ├── guard: enabled platform autoscaler on the scale set?
//!   ├── aggregate(backend health)
//!   ├── cleanup run && !guarded → evict_unhealthy() → re-read health
//!   ├── members / deploying / capacity
//!   ├── estimate(metrics)           missing response status → done
//!   ├── ideal_nodes()               guarded → done (log only)
//!   ├── decide()                    votes / anomaly / deferred
//!   └── RampController::apply()     set_capacity, one or more steps
//! ```
//!
//! # Scaling Algorithm
//!
//! ```text
//! ideal = ceil(max(rps / max_conn_per_node, min_healthy)) + health_buffer
//!
//! ideal > 160                → anomaly, no action
//! ideal < capacity           → vote; on the 4th vote apply trunc(mean(votes))
//! ideal >= capacity          → clear votes; ramp to ideal if scale-up run
//! ```
//!
//! Engine state (cadence counters, votes, eviction stamps) is loaded from
//! the [`StateStore`](gwscale_state::StateStore) at the start of a tick
//! and written back at the end, whether the tick succeeded or not.

pub mod cadence;
pub mod controller;
pub mod decision;
pub mod error;
pub mod guard;
pub mod ramp;

pub use cadence::{CadenceController, TickPlan};
pub use controller::{Collaborators, Controller};
pub use decision::{Decision, OUTLIER_CLAMP, decide, ideal_nodes};
pub use error::{TickError, TickResult};
pub use guard::conflicting_rule;
pub use ramp::{RampController, RampRequest};
