//! Load estimation from gateway counters.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use gwscale_core::{
    CURRENT_CONNECTIONS, MetricSample, MetricSet, RESPONSE_STATUS, TOTAL_REQUESTS,
};

/// Seconds covered by one value of the rolling request counters.
pub const COUNTER_WINDOW_SECS: f64 = 60.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EstimateError {
    /// The response-status counter had no data. Acting on this as zero
    /// load would trigger a spurious scale-down.
    #[error("response status counter missing")]
    MissingResponseStatus,
}

/// Aggregated counters for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub current_connections: Option<i64>,
    pub total_requests: Option<i64>,
    pub response_status: Option<i64>,
    pub historical_connections: Vec<Option<f64>>,
    pub historical_total_requests: Vec<Option<f64>>,
    pub historical_response_status: Vec<Option<f64>>,
}

impl ConnectionInfo {
    /// Pick the three gateway counters out of a metric set.
    pub fn from_samples(samples: &MetricSet) -> Self {
        let value = |name: &str| samples.get(name).and_then(MetricSample::latest).map(to_count);
        let history = |name: &str| {
            samples
                .get(name)
                .map(|s| s.history.clone())
                .unwrap_or_default()
        };

        Self {
            current_connections: value(CURRENT_CONNECTIONS),
            total_requests: value(TOTAL_REQUESTS),
            response_status: value(RESPONSE_STATUS),
            historical_connections: history(CURRENT_CONNECTIONS),
            historical_total_requests: history(TOTAL_REQUESTS),
            historical_response_status: history(RESPONSE_STATUS),
        }
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<i64>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "current_connections={} total_requests={} response_status={}",
            show(self.current_connections),
            show(self.total_requests),
            show(self.response_status)
        )
    }
}

fn to_count(v: f64) -> i64 {
    v.max(0.0).round() as i64
}

/// Requests-per-second estimate derived from a [`ConnectionInfo`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadEstimate {
    pub info: ConnectionInfo,
    pub rps: f64,
    /// Whether total requests was reconciled against response status.
    pub reconciled: bool,
}

/// Derive RPS from the response-status counter.
///
/// Above `activity_threshold` current connections, the larger of
/// response status and total requests is used, since either counter can
/// lag behind under load.
pub fn estimate(info: ConnectionInfo, activity_threshold: i64) -> Result<LoadEstimate, EstimateError> {
    let response_status = info
        .response_status
        .ok_or(EstimateError::MissingResponseStatus)?;

    let busy = info
        .current_connections
        .is_some_and(|c| c > activity_threshold);

    let (count, reconciled) = if busy {
        (response_status.max(info.total_requests.unwrap_or(0)), true)
    } else {
        (response_status, false)
    };

    Ok(LoadEstimate {
        rps: count as f64 / COUNTER_WINDOW_SECS,
        reconciled,
        info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(samples: Vec<MetricSample>) -> MetricSet {
        samples.into_iter().map(|s| (s.name.clone(), s)).collect()
    }

    fn info(current: Option<i64>, total: Option<i64>, status: Option<i64>) -> ConnectionInfo {
        ConnectionInfo {
            current_connections: current,
            total_requests: total,
            response_status: status,
            ..Default::default()
        }
    }

    #[test]
    fn from_samples_reads_all_three() {
        let samples = set(vec![
            MetricSample::new(CURRENT_CONNECTIONS, Some(12.0)),
            MetricSample::new(TOTAL_REQUESTS, None).with_history(vec![Some(100.0), None]),
            MetricSample::new(RESPONSE_STATUS, Some(599.6))
                .with_history(vec![Some(540.0), Some(599.6)]),
        ]);
        let info = ConnectionInfo::from_samples(&samples);
        assert_eq!(info.current_connections, Some(12));
        assert_eq!(info.total_requests, Some(100));
        assert_eq!(info.response_status, Some(600));
        assert_eq!(info.historical_response_status.len(), 2);
        assert!(info.historical_connections.is_empty());
    }

    #[test]
    fn absent_counters_are_none() {
        let info = ConnectionInfo::from_samples(&MetricSet::new());
        assert_eq!(info, ConnectionInfo::default());
        assert_eq!(
            info.to_string(),
            "current_connections=- total_requests=- response_status=-"
        );
    }

    #[test]
    fn missing_response_status_is_a_hard_stop() {
        let err = estimate(info(Some(50), Some(6000), None), 8).unwrap_err();
        assert_eq!(err, EstimateError::MissingResponseStatus);
    }

    #[test]
    fn quiet_pool_uses_response_status() {
        let est = estimate(info(Some(2), Some(9000), Some(600)), 8).unwrap();
        assert_eq!(est.rps, 10.0);
        assert!(!est.reconciled);
    }

    #[test]
    fn busy_pool_takes_larger_counter() {
        let est = estimate(info(Some(20), Some(1200), Some(600)), 8).unwrap();
        assert_eq!(est.rps, 20.0);
        assert!(est.reconciled);

        let est = estimate(info(Some(20), None, Some(600)), 8).unwrap();
        assert_eq!(est.rps, 10.0);
    }

    #[test]
    fn threshold_is_exclusive() {
        let est = estimate(info(Some(8), Some(1200), Some(600)), 8).unwrap();
        assert_eq!(est.rps, 10.0);
    }

    #[test]
    fn zero_load_is_valid() {
        let est = estimate(info(None, None, Some(0)), 8).unwrap();
        assert_eq!(est.rps, 0.0);
    }
}
