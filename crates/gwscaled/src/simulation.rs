//! Simulated platform wiring for development runs.
//!
//! The controller talks to an [`InMemoryCloud`]; a background task plays
//! the platform's part by settling pending creates and deletes once per
//! tick interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use gwscale_autoscale::{Collaborators, Controller};
use gwscale_core::{InMemoryCloud, ScalerConfig};
use gwscale_metrics::{TracingSink, select_source};
use gwscale_state::StateStore;

/// A pool of `nodes` healthy, provisioned instances.
pub fn simulated_pool(nodes: u32) -> InMemoryCloud {
    InMemoryCloud::new().with_healthy_members(nodes)
}

/// Controller over the simulated pool, with the configured metrics source
/// and a log-backed custom metric sink.
pub fn build_controller(
    config: ScalerConfig,
    cloud: &InMemoryCloud,
    store: StateStore,
) -> anyhow::Result<Controller> {
    let cloud = Arc::new(cloud.clone());
    let metrics = select_source(config.metrics.source, cloud.clone());
    let collaborators = Collaborators::from_cloud(cloud).with_metrics(metrics);
    let sink = Arc::new(TracingSink::new(config.metrics.custom_metrics_verbose));

    info!(
        pool = %config.target.key(),
        source = ?config.metrics.source,
        "controller configured"
    );
    Ok(Controller::new(config, collaborators, store)?.with_sink(sink))
}

/// Settle the simulated platform every `interval` until shutdown.
pub async fn settle_loop(
    cloud: InMemoryCloud,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                cloud.settle();
                debug!(capacity = cloud.current_capacity(), "simulated platform settled");
            }
            _ = shutdown.changed() => break,
        }
    }
}
