//! Health aggregation over a backend health report.

use gwscale_core::{BackendHealthReport, HealthStatus};

/// Classified view of one backend health report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub healthy: u32,
    pub unhealthy: u32,
    /// Addresses of unhealthy members, in report order.
    pub unhealthy_addresses: Vec<String>,
}

impl HealthSummary {
    pub fn total(&self) -> u32 {
        self.healthy + self.unhealthy
    }
}

/// Split a report into healthy and unhealthy members. Pure; an empty
/// report yields all zeros.
pub fn aggregate(report: &BackendHealthReport) -> HealthSummary {
    let mut summary = HealthSummary::default();
    for member in &report.members {
        match member.status() {
            HealthStatus::Healthy => summary.healthy += 1,
            HealthStatus::Unhealthy => {
                summary.unhealthy += 1;
                summary.unhealthy_addresses.push(member.address.clone());
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwscale_core::BackendMember;
    use proptest::prelude::*;

    fn report(members: &[(&str, &str)]) -> BackendHealthReport {
        BackendHealthReport {
            members: members
                .iter()
                .map(|(addr, health)| BackendMember::new(*addr, *health))
                .collect(),
        }
    }

    #[test]
    fn empty_report_is_zero() {
        let summary = aggregate(&BackendHealthReport::default());
        assert_eq!(summary, HealthSummary::default());
    }

    #[test]
    fn anything_but_healthy_is_unhealthy() {
        let summary = aggregate(&report(&[
            ("10.0.0.4", "Healthy"),
            ("10.0.0.5", "healthy"),
            ("10.0.0.6", "Unhealthy"),
            ("10.0.0.7", "Unknown"),
            ("10.0.0.8", "Draining"),
        ]));
        assert_eq!(summary.healthy, 2);
        assert_eq!(summary.unhealthy, 3);
        assert_eq!(
            summary.unhealthy_addresses,
            vec!["10.0.0.6", "10.0.0.7", "10.0.0.8"]
        );
    }

    fn status_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Healthy".to_string()),
            Just("HEALTHY".to_string()),
            Just("Unhealthy".to_string()),
            Just("Unknown".to_string()),
            "[a-zA-Z]{0,10}",
        ]
    }

    proptest! {
        #[test]
        fn counts_cover_every_member(statuses in prop::collection::vec(status_strategy(), 0..40)) {
            let report = BackendHealthReport {
                members: statuses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| BackendMember::new(format!("10.0.1.{i}"), s.clone()))
                    .collect(),
            };
            let first = aggregate(&report);
            prop_assert_eq!(first.total() as usize, report.members.len());
            prop_assert_eq!(first.unhealthy_addresses.len(), first.unhealthy as usize);

            let second = aggregate(&report);
            prop_assert_eq!(first, second);
        }
    }
}
