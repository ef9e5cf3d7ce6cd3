//! Cadence controller — which phases run on a given external tick.

use gwscale_core::CadenceConfig;
use gwscale_state::CadenceCounters;

/// Phases selected for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    /// Nothing runs this tick.
    pub throttled: bool,
    /// Bad-node eviction runs this tick.
    pub cleanup: bool,
    /// The scale-up branch may act this tick. Scale-down voting is never
    /// gated on this.
    pub scale_up: bool,
}

impl TickPlan {
    const THROTTLED: Self = Self {
        throttled: true,
        cleanup: false,
        scale_up: false,
    };
}

#[derive(Debug, Clone, Copy)]
pub struct CadenceController {
    schedule_to_run_factor: u64,
    clean_up_every: u64,
    scale_up_every: u64,
}

impl CadenceController {
    pub fn new(schedule_to_run_factor: u64, clean_up_every: u64, scale_up_every: u64) -> Self {
        Self {
            schedule_to_run_factor: schedule_to_run_factor.max(1),
            clean_up_every: clean_up_every.max(1),
            scale_up_every: scale_up_every.max(1),
        }
    }

    pub fn from_config(config: &CadenceConfig) -> Self {
        Self::new(
            config.schedule_to_run_factor,
            config.clean_up_every,
            config.scale_up_every,
        )
    }

    /// Count one external invocation and pick its phases.
    pub fn advance(&self, counters: &mut CadenceCounters) -> TickPlan {
        counters.schedule_tick += 1;
        if counters.schedule_tick % self.schedule_to_run_factor != 0 {
            return TickPlan::THROTTLED;
        }

        counters.run += 1;
        TickPlan {
            throttled: false,
            cleanup: counters.run % self.clean_up_every == 0,
            scale_up: counters.run % self.scale_up_every == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_every_nth_tick_runs() {
        let cadence = CadenceController::new(3, 1, 1);
        let mut counters = CadenceCounters::default();

        let plans: Vec<bool> = (0..6).map(|_| cadence.advance(&mut counters).throttled).collect();
        assert_eq!(plans, vec![true, true, false, true, true, false]);
        assert_eq!(counters.schedule_tick, 6);
        assert_eq!(counters.run, 2);
    }

    #[test]
    fn cleanup_and_scale_up_follow_run_counter() {
        let cadence = CadenceController::new(1, 4, 2);
        let mut counters = CadenceCounters::default();

        let plans: Vec<(bool, bool)> = (0..8)
            .map(|_| {
                let plan = cadence.advance(&mut counters);
                (plan.cleanup, plan.scale_up)
            })
            .collect();
        assert_eq!(
            plans,
            vec![
                (false, false),
                (false, true),
                (false, false),
                (true, true),
                (false, false),
                (false, true),
                (false, false),
                (true, true),
            ]
        );
    }

    #[test]
    fn throttled_ticks_do_not_advance_run() {
        let cadence = CadenceController::new(2, 1, 1);
        let mut counters = CadenceCounters {
            schedule_tick: 10,
            run: 5,
        };
        assert_eq!(cadence.advance(&mut counters), TickPlan::THROTTLED);
        assert_eq!(counters.run, 5);
        assert!(!cadence.advance(&mut counters).throttled);
        assert_eq!(counters.run, 6);
    }

    #[test]
    fn defaults_run_every_third_tick() {
        let cadence = CadenceController::from_config(&CadenceConfig::default());
        let mut counters = CadenceCounters::default();
        let runs = (0..12)
            .filter(|_| !cadence.advance(&mut counters).throttled)
            .count();
        assert_eq!(runs, 4);
    }
}
