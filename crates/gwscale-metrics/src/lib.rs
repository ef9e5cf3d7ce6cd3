//! gwscale-metrics — turning gateway counters into a load figure.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (live platform API | FakeLoadSource)
//!   └── metrics() → MetricSet
//!         └── ConnectionInfo::from_samples()
//!               └── estimate() → LoadEstimate { rps }
//!
//! CustomMetric + MetricSink   ← decision inputs pushed for dashboards
//! render_prometheus()         ← tick reports as text exposition
//! ```
//!
//! The response-status counter is a one-minute rolling total, so RPS is
//! that total divided by 60. A missing counter is an error, never zero
//! load.

pub mod custom;
pub mod estimator;
pub mod prometheus;
pub mod source;

pub use custom::{CustomMetric, MetricSink, TracingSink, push_metrics};
pub use estimator::{ConnectionInfo, EstimateError, LoadEstimate, estimate};
pub use prometheus::render_prometheus;
pub use source::{FakeLoadSource, fake_response_status, select_source};
