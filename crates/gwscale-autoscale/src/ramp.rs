//! Ramp controller — turns a target capacity into capacity writes.
//!
//! Decreases are applied in one write. Increases are capped at
//! `max_scale_up_unit` per write; in quick mode the controller keeps
//! stepping (pausing `step_delay` between writes) until the target is
//! reached, otherwise it takes a single step and leaves the rest to later
//! ticks.

use std::time::Duration;

use tracing::{debug, info};

use gwscale_core::{CloudResult, ConfigError, PoolTarget, ScaleSet, ScalerConfig};

/// One ramp invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampRequest {
    pub current: u32,
    pub target: u32,
    pub quickly: bool,
    /// Instances were deleted earlier in the same tick.
    pub deleted_this_tick: bool,
}

#[derive(Debug, Clone)]
pub struct RampController {
    max_scale_up_unit: u32,
    max_active_servers: u32,
    step_delay: Duration,
}

impl RampController {
    pub fn new(max_scale_up_unit: u32, max_active_servers: u32, step_delay: Duration) -> Self {
        Self {
            max_scale_up_unit: max_scale_up_unit.max(1),
            max_active_servers,
            step_delay,
        }
    }

    pub fn from_config(config: &ScalerConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.scaling.max_scale_up_unit,
            config.scaling.max_active_servers,
            config.ramp_step_delay()?,
        ))
    }

    /// Capacity values to write, in order. Empty means no write.
    pub fn plan(&self, req: RampRequest) -> Vec<u32> {
        let target = req.target.min(self.max_active_servers);
        let current = req.current;

        if target <= current {
            if target == current && !req.deleted_this_tick {
                return Vec::new();
            }
            return vec![target];
        }

        if !req.quickly {
            return vec![target.min(current.saturating_add(self.max_scale_up_unit))];
        }

        let mut steps = Vec::new();
        let mut next = current;
        while next < target {
            next = target.min(next.saturating_add(self.max_scale_up_unit));
            steps.push(next);
        }
        steps
    }

    /// Issue the planned writes. Each accepted value is appended to
    /// `written` before the next step, so a failure part-way leaves the
    /// steps that did land visible to the caller.
    pub async fn apply(
        &self,
        scale_set: &dyn ScaleSet,
        pool: &PoolTarget,
        req: RampRequest,
        written: &mut Vec<u32>,
    ) -> CloudResult<()> {
        let steps = self.plan(req);
        if steps.is_empty() {
            debug!(capacity = req.current, "capacity already at target");
            return Ok(());
        }

        info!(
            current = req.current,
            target = req.target,
            quickly = req.quickly,
            steps = steps.len(),
            "adjusting capacity"
        );

        for (i, &capacity) in steps.iter().enumerate() {
            if i > 0 && !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            scale_set.set_capacity(pool, capacity).await?;
            written.push(capacity);
            debug!(capacity, step = i + 1, "capacity written");
        }

        Ok(())
    }
}
