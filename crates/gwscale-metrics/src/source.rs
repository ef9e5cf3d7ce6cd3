//! Metric sources: the live platform collaborator or a scripted load
//! profile for development.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use gwscale_core::{
    BoxFuture, CloudResult, MetricSample, MetricSet, MetricsSource, MetricsSourceKind,
    RESPONSE_STATUS,
};

/// Response-status counter (requests per minute) for a point in the
/// scripted traffic profile.
///
/// | seconds   | rps                    |
/// |-----------|------------------------|
/// | 0–90      | 5                      |
/// | 90–150    | 0                      |
/// | 150–210   | ramp 0 → 150           |
/// | 210–510   | 150                    |
/// | 510–570   | 0                      |
/// | 570–645   | ramp 0 → 450           |
/// | 645–930   | 450                    |
/// | after 930 | 0                      |
pub fn fake_response_status(seconds_in: u64) -> i64 {
    let s = seconds_in as f64;
    let rps = match seconds_in {
        0..=90 => 5,
        91..=150 => 0,
        151..=210 => ((s - 150.0) / 60.0 * 150.0).round_ties_even() as i64,
        211..=510 => 150,
        511..=570 => 0,
        571..=645 => ((s - 570.0) / 75.0 * 450.0).round_ties_even() as i64,
        646..=930 => 450,
        _ => 0,
    };
    rps * 60
}

/// Replays [`fake_response_status`] relative to when it was created.
///
/// Only the response-status counter is reported, so the estimator never
/// takes the busy-pool path.
#[derive(Debug, Clone)]
pub struct FakeLoadSource {
    started: Instant,
}

impl FakeLoadSource {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// A source whose profile began `elapsed` ago.
    pub fn started_ago(elapsed: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now.checked_sub(elapsed).unwrap_or(now),
        }
    }

    pub fn seconds_in(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for FakeLoadSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for FakeLoadSource {
    fn metrics<'a>(
        &'a self,
        _resource_id: &'a str,
        _window: Duration,
    ) -> BoxFuture<'a, CloudResult<MetricSet>> {
        Box::pin(async move {
            let seconds_in = self.seconds_in();
            let value = fake_response_status(seconds_in);
            debug!(seconds_in, response_status = value, "fake load profile");

            let mut set = HashMap::new();
            set.insert(
                RESPONSE_STATUS.to_string(),
                MetricSample::new(RESPONSE_STATUS, Some(value as f64)),
            );
            Ok(set)
        })
    }
}

/// Pick the metrics source configured by `kind`.
pub fn select_source(
    kind: MetricsSourceKind,
    live: Arc<dyn MetricsSource>,
) -> Arc<dyn MetricsSource> {
    match kind {
        MetricsSourceKind::Live => live,
        MetricsSourceKind::FakeLoad => Arc::new(FakeLoadSource::new()),
    }
}
