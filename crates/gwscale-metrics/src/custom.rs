//! Custom metric payloads for dashboards.
//!
//! Each tick that reaches a decision can publish its inputs (RPS, node
//! counts, ideal node count) so operators can chart them next to the
//! gateway's own counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use gwscale_core::BoxFuture;

pub const CUSTOM_METRIC_NAMESPACE: &str = "custommetric";
pub const GATEWAY_DIMENSION: &str = "AppGwName";

/// One custom metric data point, dimensioned by gateway name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomMetric {
    pub time: String,
    pub data: CustomMetricData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMetricData {
    pub base_data: BaseData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseData {
    pub metric: String,
    pub namespace: String,
    pub dim_names: Vec<String>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub dim_values: Vec<String>,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u32,
}

impl CustomMetric {
    /// A single-sample series: min, max and sum are all `value`.
    pub fn new(name: &str, value: f64, gateway: &str, at: DateTime<Utc>) -> Self {
        Self {
            time: at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            data: CustomMetricData {
                base_data: BaseData {
                    metric: name.to_string(),
                    namespace: CUSTOM_METRIC_NAMESPACE.to_string(),
                    dim_names: vec![GATEWAY_DIMENSION.to_string()],
                    series: vec![Series {
                        dim_values: vec![gateway.to_string()],
                        min: value,
                        max: value,
                        sum: value,
                        count: 1,
                    }],
                },
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.data.base_data.metric
    }

    pub fn value(&self) -> f64 {
        self.data
            .base_data
            .series
            .first()
            .map(|s| s.sum)
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Destination for custom metrics.
pub trait MetricSink: Send + Sync {
    fn push<'a>(&'a self, metric: &'a CustomMetric) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Writes custom metrics to the log instead of a metrics endpoint.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    verbose: bool,
}

impl TracingSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl MetricSink for TracingSink {
    fn push<'a>(&'a self, metric: &'a CustomMetric) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if self.verbose {
                let payload = metric.to_json()?;
                info!(%payload, "custom metric");
            } else {
                info!(metric = metric.name(), value = metric.value(), "custom metric");
            }
            Ok(())
        })
    }
}

/// Push each `(name, value)` pair. Failures are logged and skipped.
/// Returns how many were accepted.
pub async fn push_metrics(
    sink: &dyn MetricSink,
    gateway: &str,
    values: &[(&str, f64)],
    at: DateTime<Utc>,
) -> usize {
    let mut pushed = 0;
    for (name, value) in values {
        let metric = CustomMetric::new(name, *value, gateway, at);
        match sink.push(&metric).await {
            Ok(()) => pushed += 1,
            Err(e) => warn!(metric = %name, error = %e, "failed to push custom metric"),
        }
    }
    pushed
}
