//! End-to-end controller scenarios against the in-memory cloud.

use std::sync::{Arc, Mutex};

use gwscale_autoscale::{Collaborators, Controller, OUTLIER_CLAMP};
use gwscale_core::{
    AutoscaleRule, BoxFuture, CURRENT_CONNECTIONS, InMemoryCloud, MetricSample, ProvisioningState,
    RESPONSE_STATUS, ScalerConfig, TOTAL_REQUESTS,
};
use gwscale_metrics::{CustomMetric, MetricSink};
use gwscale_state::{EVICTION_COOLDOWN_SECS, StateStore, TickOutcome};

/// Config where ideal nodes equals ceil(rps), every tick runs, and
/// eviction only happens when a test asks for it.
fn plain_config() -> ScalerConfig {
    let mut config = ScalerConfig::default();
    config.scaling.min_healthy_servers = 0;
    config.scaling.health_buffer = 0;
    config.scaling.max_concurrent_connections_per_node = 1;
    config.scaling.ramp_step_delay = "0s".to_string();
    config.cadence.schedule_to_run_factor = 1;
    config.cadence.clean_up_every = 1_000;
    config.cadence.scale_up_every = 1;
    config
}

fn controller(cloud: &InMemoryCloud, config: ScalerConfig) -> Controller {
    controller_with_store(cloud, config, StateStore::open_in_memory().unwrap())
}

fn controller_with_store(cloud: &InMemoryCloud, config: ScalerConfig, store: StateStore) -> Controller {
    Controller::new(config, Collaborators::from_cloud(Arc::new(cloud.clone())), store).unwrap()
}

/// Set the response-status counter so that rps == `rps`.
fn set_rps(cloud: &InMemoryCloud, rps: u32) {
    cloud.set_metric(MetricSample::new(RESPONSE_STATUS, Some(f64::from(rps * 60))));
}

#[tokio::test]
async fn scale_down_waits_for_four_votes() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    let ctl = controller(&cloud, plain_config());

    for (i, rps) in [3, 4, 3].into_iter().enumerate() {
        set_rps(&cloud, rps);
        let report = ctl.tick_at(1000 + i as u64).await.unwrap();
        assert_eq!(
            report.outcome,
            TickOutcome::ScaleDownPending {
                votes: i as u32 + 1
            }
        );
        assert!(cloud.capacity_updates().is_empty());
    }

    set_rps(&cloud, 4);
    let report = ctl.tick_at(1003).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::Scaled { from: 5, to: 3 });
    assert_eq!(cloud.capacity_updates(), vec![3]);
    assert_eq!(report.pending_votes, 0);

    let state = ctl.store().load_engine_state(&ctl.pool_key()).unwrap();
    assert!(state.votes.is_empty());
}

#[tokio::test]
async fn higher_reading_resets_vote_count() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    let ctl = controller(&cloud, plain_config());

    set_rps(&cloud, 3);
    ctl.tick_at(1000).await.unwrap();
    ctl.tick_at(1001).await.unwrap();
    ctl.tick_at(1002).await.unwrap();

    set_rps(&cloud, 5);
    let report = ctl.tick_at(1003).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::Unchanged);
    assert_eq!(report.pending_votes, 0);

    // The count starts over: three more low readings do not act.
    set_rps(&cloud, 3);
    for t in 1004..1007 {
        ctl.tick_at(t).await.unwrap();
    }
    assert!(cloud.capacity_updates().is_empty());
}

#[tokio::test]
async fn quick_ramp_reaches_target_in_unit_steps() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    let ctl = controller(&cloud, plain_config());

    set_rps(&cloud, 35);
    let report = ctl.tick_at(1000).await.unwrap();

    assert_eq!(cloud.capacity_updates(), vec![15, 25, 35]);
    assert_eq!(report.capacity_updates, vec![15, 25, 35]);
    assert_eq!(report.outcome, TickOutcome::Scaled { from: 5, to: 35 });
}

#[tokio::test]
async fn slow_ramp_takes_one_unit_per_tick() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    let mut config = plain_config();
    config.scaling.scale_up_quickly = false;
    let ctl = controller(&cloud, config);

    set_rps(&cloud, 35);
    ctl.tick_at(1000).await.unwrap();
    assert_eq!(cloud.capacity_updates(), vec![15]);

    cloud.settle();
    ctl.tick_at(1001).await.unwrap();
    assert_eq!(cloud.capacity_updates(), vec![15, 25]);
}

#[tokio::test]
async fn capacity_is_capped_at_max_active() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    let mut config = plain_config();
    config.scaling.max_active_servers = 20;
    let ctl = controller(&cloud, config);

    set_rps(&cloud, 60);
    ctl.tick_at(1000).await.unwrap();
    assert_eq!(cloud.capacity_updates(), vec![15, 20]);
}

#[tokio::test]
async fn missing_response_status_never_mutates() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    cloud.set_metric(MetricSample::new(CURRENT_CONNECTIONS, Some(500.0)));
    cloud.set_metric(MetricSample::new(TOTAL_REQUESTS, Some(60_000.0)));
    let ctl = controller(&cloud, plain_config());

    for t in 1000..1006 {
        let report = ctl.tick_at(t).await.unwrap();
        assert_eq!(report.outcome, TickOutcome::TelemetryGap);
        assert_eq!(report.rps, None);
    }
    assert!(cloud.capacity_updates().is_empty());
    assert!(
        ctl.store()
            .load_engine_state(&ctl.pool_key())
            .unwrap()
            .votes
            .is_empty()
    );
}

#[tokio::test]
async fn busy_gateway_reconciles_total_requests() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    cloud.set_metric(MetricSample::new(CURRENT_CONNECTIONS, Some(20.0)));
    cloud.set_metric(MetricSample::new(TOTAL_REQUESTS, Some(600.0)));
    set_rps(&cloud, 5);
    let ctl = controller(&cloud, plain_config());

    let report = ctl.tick_at(1000).await.unwrap();
    assert_eq!(report.rps, Some(10.0));
    assert_eq!(cloud.capacity_updates(), vec![10]);
}

#[tokio::test]
async fn outlier_reading_is_ignored() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    let ctl = controller(&cloud, plain_config());

    set_rps(&cloud, OUTLIER_CLAMP + 1);
    let report = ctl.tick_at(1000).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::Anomalous);
    assert!(cloud.capacity_updates().is_empty());
}

#[tokio::test]
async fn outlier_reading_breaks_vote_streak() {
    let cloud = InMemoryCloud::new().with_healthy_members(10);
    let ctl = controller(&cloud, plain_config());

    set_rps(&cloud, 3);
    for t in 0..3 {
        let report = ctl.tick_at(1000 + t).await.unwrap();
        assert_eq!(report.outcome, TickOutcome::ScaleDownPending { votes: t as u32 + 1 });
    }

    set_rps(&cloud, 500);
    let report = ctl.tick_at(1003).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::Anomalous);
    assert_eq!(report.pending_votes, 0);

    set_rps(&cloud, 3);
    let report = ctl.tick_at(1004).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::ScaleDownPending { votes: 1 });
    assert!(cloud.capacity_updates().is_empty());
}

#[tokio::test]
async fn scale_up_waits_for_eligible_run() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    let mut config = plain_config();
    config.cadence.scale_up_every = 2;
    let ctl = controller(&cloud, config);

    set_rps(&cloud, 8);
    let report = ctl.tick_at(1000).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::ScaleUpDeferred);
    assert!(cloud.capacity_updates().is_empty());

    let report = ctl.tick_at(1001).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::Scaled { from: 5, to: 8 });
}

#[tokio::test]
async fn guarded_pool_reads_but_never_mutates() {
    let cloud = InMemoryCloud::new()
        .with_healthy_members(5)
        .with_member("9", ProvisioningState::Succeeded, Some("10.0.9.9"), "Unhealthy");
    let config = {
        let mut c = plain_config();
        c.cadence.clean_up_every = 1;
        c
    };
    let cloud = cloud.with_rule(AutoscaleRule {
        name: "cpu-rule".to_string(),
        enabled: true,
        target_resource_id: config.target.scale_set_resource_id(),
    });
    let ctl = controller(&cloud, config);

    // Seed a pending vote; a high guarded reading still breaks the streak.
    let mut state = ctl.store().load_engine_state(&ctl.pool_key()).unwrap();
    state.votes.record(2);
    ctl.store().save_engine_state(&ctl.pool_key(), &state).unwrap();

    set_rps(&cloud, 40);
    let report = ctl.tick_at(1000).await.unwrap();

    assert_eq!(
        report.outcome,
        TickOutcome::Guarded {
            rule: "cpu-rule".to_string()
        }
    );
    assert_eq!(report.ideal_nodes, Some(40));
    assert_eq!(report.health.map(|h| h.unhealthy), Some(1));
    assert!(cloud.deletions().is_empty());
    assert!(cloud.capacity_updates().is_empty());
    assert_eq!(report.pending_votes, 0);
}

#[tokio::test]
async fn guarded_low_reading_keeps_pending_votes() {
    let config = plain_config();
    let cloud = InMemoryCloud::new()
        .with_healthy_members(5)
        .with_rule(AutoscaleRule {
            name: "cpu-rule".to_string(),
            enabled: true,
            target_resource_id: config.target.scale_set_resource_id(),
        });
    let ctl = controller(&cloud, config);

    let mut state = ctl.store().load_engine_state(&ctl.pool_key()).unwrap();
    state.votes.record(2);
    ctl.store().save_engine_state(&ctl.pool_key(), &state).unwrap();

    set_rps(&cloud, 2);
    let report = ctl.tick_at(1000).await.unwrap();

    assert!(matches!(report.outcome, TickOutcome::Guarded { .. }));
    assert_eq!(report.pending_votes, 1);
    assert!(cloud.capacity_updates().is_empty());
}

#[tokio::test]
async fn rule_query_failure_fails_open() {
    let config = plain_config();
    let cloud = InMemoryCloud::new()
        .with_healthy_members(5)
        .with_rule(AutoscaleRule {
            name: "cpu-rule".to_string(),
            enabled: true,
            target_resource_id: config.target.scale_set_resource_id(),
        });
    cloud.fail_next("rules");
    let ctl = controller(&cloud, config);

    set_rps(&cloud, 8);
    let report = ctl.tick_at(1000).await.unwrap();
    assert_eq!(report.outcome, TickOutcome::Scaled { from: 5, to: 8 });
}

#[tokio::test]
async fn cleanup_evicts_then_rereads_health() {
    let cloud = InMemoryCloud::new()
        .with_member("0", ProvisioningState::Succeeded, Some("10.0.0.4"), "Healthy")
        .with_member("1", ProvisioningState::Succeeded, Some("10.0.0.5"), "Healthy")
        .with_member("2", ProvisioningState::Succeeded, Some("10.0.0.6"), "Unhealthy")
        .with_member("3", ProvisioningState::Creating, Some("10.0.0.7"), "Unhealthy");
    let mut config = plain_config();
    config.cadence.clean_up_every = 1;
    let ctl = controller(&cloud, config);

    set_rps(&cloud, 4);
    let report = ctl.tick_at(1000).await.unwrap();

    assert_eq!(report.evicted, vec!["2"]);
    assert_eq!(cloud.deletions(), vec![vec!["2".to_string()]]);
    // The deleting instance drops out of the post-eviction health read.
    let health = report.health.unwrap();
    assert_eq!(health.healthy, 2);
    assert_eq!(health.unhealthy, 1);
    assert_eq!(health.deploying, 1);
    // Capacity went 4 → 3 with the delete; ideal is 4 so it is restored.
    assert_eq!(report.capacity, Some(3));
    assert_eq!(cloud.capacity_updates(), vec![4]);

    // A newly failing instance is picked up on the next cleanup run; the
    // one already being deleted is not requested again.
    cloud.set_member_health("1", "Unhealthy");
    let report = ctl.tick_at(1060).await.unwrap();
    assert_eq!(report.evicted, vec!["1"]);
    assert_eq!(cloud.deletions()[1], vec!["1".to_string()]);

    let state = ctl.store().load_engine_state(&ctl.pool_key()).unwrap();
    assert_eq!(state.evictions.last_eviction("2"), Some(1000));
    assert_eq!(state.evictions.last_eviction("1"), Some(1060));
}

#[tokio::test]
async fn eviction_cooldown_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gwscale.redb");
    let mut config = plain_config();
    config.cadence.clean_up_every = 1;

    let stale_view = || {
        InMemoryCloud::new()
            .with_healthy_members(3)
            .with_member("7", ProvisioningState::Succeeded, Some("10.0.7.7"), "Unhealthy")
    };

    let cloud = stale_view();
    set_rps(&cloud, 4);
    {
        let store = StateStore::open(&path).unwrap();
        let ctl = controller_with_store(&cloud, config.clone(), store);
        ctl.tick_at(1000).await.unwrap();
    }
    assert_eq!(cloud.deletions().len(), 1);

    // A restarted controller sees the platform still reporting the
    // instance: the stored stamp suppresses a second delete.
    let cloud = stale_view();
    set_rps(&cloud, 4);
    let store = StateStore::open(&path).unwrap();
    let ctl = controller_with_store(&cloud, config, store);
    let report = ctl.tick_at(1030).await.unwrap();
    assert!(report.evicted.is_empty());
    assert!(cloud.deletions().is_empty());

    let report = ctl.tick_at(1000 + EVICTION_COOLDOWN_SECS).await.unwrap();
    assert_eq!(report.evicted, vec!["7"]);
}

#[tokio::test]
async fn upstream_failure_aborts_tick_without_mutation() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    set_rps(&cloud, 30);
    cloud.fail_next("metrics");
    let ctl = controller(&cloud, plain_config());

    let err = ctl.tick_at(1000).await.unwrap_err();
    assert!(err.to_string().contains("metrics"));
    assert!(cloud.capacity_updates().is_empty());

    let stored = ctl.store().latest_report(&ctl.pool_key()).unwrap().unwrap();
    assert!(matches!(stored.outcome, TickOutcome::Failed { .. }));

    // Next tick proceeds normally.
    ctl.tick_at(1001).await.unwrap();
    assert_eq!(cloud.capacity_updates(), vec![15, 25, 30]);
}

#[tokio::test]
async fn failed_scale_down_write_keeps_votes() {
    let cloud = InMemoryCloud::new().with_healthy_members(8);
    let ctl = controller(&cloud, plain_config());

    set_rps(&cloud, 4);
    for t in 1000..1003 {
        ctl.tick_at(t).await.unwrap();
    }
    cloud.fail_next("set_capacity");
    assert!(ctl.tick_at(1003).await.is_err());

    let state = ctl.store().load_engine_state(&ctl.pool_key()).unwrap();
    assert_eq!(state.votes.len(), 4);
}

#[tokio::test]
async fn pools_keep_separate_state() {
    let store = StateStore::open_in_memory().unwrap();
    let cloud_a = InMemoryCloud::new().with_healthy_members(5);
    let cloud_b = InMemoryCloud::new().with_healthy_members(5);
    set_rps(&cloud_a, 2);
    set_rps(&cloud_b, 2);

    let config_a = plain_config();
    let mut config_b = plain_config();
    config_b.target.scale_set_name = "vmss-b".to_string();

    let a = controller_with_store(&cloud_a, config_a, store.clone());
    let b = controller_with_store(&cloud_b, config_b, store.clone());

    for t in 0..3 {
        a.tick_at(1000 + t).await.unwrap();
    }
    b.tick_at(1000).await.unwrap();

    assert_eq!(store.load_engine_state(&a.pool_key()).unwrap().votes.len(), 3);
    assert_eq!(store.load_engine_state(&b.pool_key()).unwrap().votes.len(), 1);
}

struct RecordingSink {
    pushed: Mutex<Vec<(String, f64)>>,
}

impl MetricSink for RecordingSink {
    fn push<'a>(&'a self, metric: &'a CustomMetric) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.pushed
                .lock()
                .unwrap()
                .push((metric.name().to_string(), metric.value()));
            Ok(())
        })
    }
}

#[tokio::test]
async fn custom_metrics_are_pushed_when_enabled() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    set_rps(&cloud, 5);
    let sink = Arc::new(RecordingSink {
        pushed: Mutex::new(Vec::new()),
    });

    let mut config = plain_config();
    config.metrics.custom_metrics = true;
    let ctl = controller(&cloud, config).with_sink(sink.clone());
    ctl.tick_at(1000).await.unwrap();

    let pushed = sink.pushed.lock().unwrap().clone();
    let names: Vec<&str> = pushed.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "rps",
            "healthy_nodes",
            "unhealthy_nodes",
            "deploying_nodes",
            "logical_healthy_nodes",
            "ideal_nodes"
        ]
    );
    assert_eq!(pushed[0].1, 5.0);
}

#[tokio::test]
async fn custom_metrics_off_by_default() {
    let cloud = InMemoryCloud::new().with_healthy_members(5);
    set_rps(&cloud, 5);
    let sink = Arc::new(RecordingSink {
        pushed: Mutex::new(Vec::new()),
    });
    let ctl = controller(&cloud, plain_config()).with_sink(sink.clone());
    ctl.tick_at(1000).await.unwrap();
    assert!(sink.pushed.lock().unwrap().is_empty());
}
