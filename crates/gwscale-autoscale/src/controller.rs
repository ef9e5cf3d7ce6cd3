//! Controller — one gateway / scale set pair, one tick at a time.
//!
//! Each tick loads the pool's [`EngineState`] from the store, runs the
//! phases its [`TickPlan`] selects, and writes the state back whatever
//! happened. Ticks are never run concurrently for the same pool.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gwscale_core::{
    AutoscaleRules, GatewayHealth, MetricsSource, PoolTarget, ScaleSet, ScalerConfig,
};
use gwscale_health::{HealthSummary, aggregate, evict_unhealthy};
use gwscale_metrics::{ConnectionInfo, MetricSink, estimate, push_metrics};
use gwscale_state::{EngineState, HealthCounts, StateStore, TickOutcome, TickReport};

use crate::cadence::{CadenceController, TickPlan};
use crate::decision::{Decision, clear_votes, decide, ideal_nodes};
use crate::error::TickResult;
use crate::guard::conflicting_rule;
use crate::ramp::{RampController, RampRequest};

/// Tick reports kept per pool.
const REPORT_HISTORY: usize = 500;

/// The platform calls a controller depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub health: Arc<dyn GatewayHealth>,
    pub scale_set: Arc<dyn ScaleSet>,
    pub metrics: Arc<dyn MetricsSource>,
    pub rules: Arc<dyn AutoscaleRules>,
}

impl Collaborators {
    /// Use one client for every call.
    pub fn from_cloud<C>(cloud: Arc<C>) -> Self
    where
        C: GatewayHealth + ScaleSet + MetricsSource + AutoscaleRules + 'static,
    {
        Self {
            health: cloud.clone(),
            scale_set: cloud.clone(),
            metrics: cloud.clone(),
            rules: cloud,
        }
    }

    /// Replace the metrics source, keeping the other collaborators.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = metrics;
        self
    }
}

pub struct Controller {
    config: ScalerConfig,
    cloud: Collaborators,
    store: StateStore,
    sink: Option<Arc<dyn MetricSink>>,
    cadence: CadenceController,
    ramp: RampController,
    metrics_window: Duration,
}

/// What the health phase observed, after any eviction.
struct Observed {
    summary: HealthSummary,
    deploying: u32,
    capacity: u32,
    deleted: bool,
}

impl Controller {
    /// Build a controller. The configuration is validated here.
    pub fn new(config: ScalerConfig, cloud: Collaborators, store: StateStore) -> TickResult<Self> {
        config.validate()?;
        let cadence = CadenceController::from_config(&config.cadence);
        let ramp = RampController::from_config(&config)?;
        let metrics_window = config.metrics_window()?;
        Ok(Self {
            config,
            cloud,
            store,
            sink: None,
            cadence,
            ramp,
            metrics_window,
        })
    }

    /// Push decision inputs to `sink` when custom metrics are enabled.
    pub fn with_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn target(&self) -> &PoolTarget {
        &self.config.target
    }

    pub fn pool_key(&self) -> String {
        self.config.target.key()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one invocation at the current wall-clock time.
    pub async fn tick(&self) -> TickResult<TickReport> {
        self.tick_at(epoch_secs()).await
    }

    /// Run one invocation as if the clock read `now` (epoch seconds).
    ///
    /// Throttled ticks return a report but do not store it. A failed tick
    /// stores a `Failed` report and returns the error.
    pub async fn tick_at(&self, now: u64) -> TickResult<TickReport> {
        let key = self.pool_key();
        let mut state = self.store.load_engine_state(&key)?;
        let plan = self.cadence.advance(&mut state.cadence);
        let mut report = TickReport::new(&key, now, state.cadence);

        if plan.throttled {
            debug!(pool = %key, schedule_tick = state.cadence.schedule_tick, "tick throttled");
            self.store.save_engine_state(&key, &state)?;
            return Ok(report);
        }

        debug!(
            pool = %key,
            run = state.cadence.run,
            cleanup = plan.cleanup,
            scale_up = plan.scale_up,
            "tick started"
        );

        let result = self.evaluate(plan, &mut state, &mut report, now).await;
        report.pending_votes = state.votes.len() as u32;

        if let Err(e) = &result {
            report.outcome = TickOutcome::Failed {
                error: e.to_string(),
            };
        }

        self.store.save_engine_state(&key, &state)?;
        self.store.put_report(&report)?;
        self.store.prune_reports(&key, REPORT_HISTORY)?;

        result.map(|()| report)
    }

    async fn evaluate(
        &self,
        plan: TickPlan,
        state: &mut EngineState,
        report: &mut TickReport,
        now: u64,
    ) -> TickResult<()> {
        let pool = &self.config.target;
        let scaling = &self.config.scaling;

        let guarded = conflicting_rule(self.cloud.rules.as_ref(), pool).await;

        let observed = self
            .observe(plan.cleanup && guarded.is_none(), state, report, now)
            .await?;
        let logical_healthy = observed.summary.healthy + observed.deploying;
        info!(
            healthy = observed.summary.healthy,
            unhealthy = observed.summary.unhealthy,
            deploying = observed.deploying,
            logical_healthy,
            capacity = observed.capacity,
            "pool observed"
        );

        let samples = self
            .cloud
            .metrics
            .metrics(&pool.gateway_resource_id(), self.metrics_window)
            .await?;
        let info = ConnectionInfo::from_samples(&samples);
        debug!(%info, "gateway counters");

        let load = match estimate(info, self.config.metrics.activity_threshold) {
            Ok(load) => load,
            Err(e) => {
                warn!(error = %e, "telemetry gap, skipping scale decision");
                report.outcome = TickOutcome::TelemetryGap;
                return Ok(());
            }
        };

        let ideal = ideal_nodes(load.rps, scaling);
        report.rps = Some(load.rps);
        report.ideal_nodes = Some(ideal);
        info!(rps = load.rps, reconciled = load.reconciled, ideal_nodes = ideal, "load estimated");

        self.publish(&observed, logical_healthy, load.rps, ideal).await;

        if let Some(rule) = guarded {
            if ideal >= observed.capacity {
                clear_votes(&mut state.votes, ideal, observed.capacity);
            }
            report.outcome = TickOutcome::Guarded { rule: rule.name };
            return Ok(());
        }

        let decision = decide(
            &mut state.votes,
            ideal,
            observed.capacity,
            plan.scale_up,
            scaling.scale_up_quickly,
        );

        let (ramp_target, quickly) = match decision {
            Decision::Anomalous { .. } => {
                report.outcome = TickOutcome::Anomalous;
                return Ok(());
            }
            Decision::VotePending { votes } => {
                report.outcome = TickOutcome::ScaleDownPending { votes };
                return Ok(());
            }
            Decision::ScaleUpDeferred { .. } => {
                report.outcome = TickOutcome::ScaleUpDeferred;
                return Ok(());
            }
            Decision::ScaleDown { target } => (target, false),
            Decision::ScaleUp { target, quickly } => (target, quickly),
        };

        let request = RampRequest {
            current: observed.capacity,
            target: ramp_target,
            quickly,
            deleted_this_tick: observed.deleted,
        };
        self.ramp
            .apply(
                self.cloud.scale_set.as_ref(),
                pool,
                request,
                &mut report.capacity_updates,
            )
            .await?;

        if matches!(decision, Decision::ScaleDown { .. }) {
            state.votes.clear();
        }

        report.outcome = match report.capacity_updates.last() {
            Some(&to) => TickOutcome::Scaled {
                from: observed.capacity,
                to,
            },
            None => TickOutcome::Unchanged,
        };
        Ok(())
    }

    /// Read health, evict if `cleanup`, then read membership and capacity.
    async fn observe(
        &self,
        cleanup: bool,
        state: &mut EngineState,
        report: &mut TickReport,
        now: u64,
    ) -> TickResult<Observed> {
        let pool = &self.config.target;
        let health = self.cloud.health.as_ref();

        let mut summary = aggregate(&health.backend_health(pool).await?);
        let mut deleted = false;

        if cleanup {
            let outcome = evict_unhealthy(
                self.cloud.scale_set.as_ref(),
                pool,
                &summary.unhealthy_addresses,
                &mut state.evictions,
                self.config.scaling.min_healthy_servers,
                now,
            )
            .await?;

            if outcome.did_work() {
                deleted = true;
                report.evicted = outcome.evicted;
                summary = aggregate(&health.backend_health(pool).await?);
            }
        }

        let members = self.cloud.scale_set.list_members(pool).await?;
        let deploying = members
            .iter()
            .filter(|m| m.provisioning_state.is_deploying())
            .count() as u32;
        let capacity = self.cloud.scale_set.capacity(pool).await?;

        report.health = Some(HealthCounts {
            healthy: summary.healthy,
            unhealthy: summary.unhealthy,
            deploying,
        });
        report.capacity = Some(capacity);

        Ok(Observed {
            summary,
            deploying,
            capacity,
            deleted,
        })
    }

    async fn publish(&self, observed: &Observed, logical_healthy: u32, rps: f64, ideal: u32) {
        let Some(sink) = self.sink.as_deref() else {
            return;
        };
        if !self.config.metrics.custom_metrics {
            return;
        }

        let values = [
            ("rps", rps),
            ("healthy_nodes", f64::from(observed.summary.healthy)),
            ("unhealthy_nodes", f64::from(observed.summary.unhealthy)),
            ("deploying_nodes", f64::from(observed.deploying)),
            ("logical_healthy_nodes", f64::from(logical_healthy)),
            ("ideal_nodes", f64::from(ideal)),
        ];
        push_metrics(sink, &self.config.target.gateway_name, &values, Utc::now()).await;
    }

    /// Tick every `interval` until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let pool = self.pool_key();
        info!(%pool, interval_ms = interval.as_millis() as u64, "controller started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) => debug!(%pool, outcome = ?report.outcome, "tick finished"),
                        Err(e) => error!(%pool, error = %e, "tick failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!(%pool, "controller shutting down");
                    break;
                }
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
