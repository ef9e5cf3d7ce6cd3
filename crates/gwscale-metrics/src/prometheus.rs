//! Prometheus text exposition of tick reports.

use std::fmt::Write;

use gwscale_state::TickReport;

struct Gauge {
    name: &'static str,
    help: &'static str,
    value: fn(&TickReport) -> Option<f64>,
}

const GAUGES: &[Gauge] = &[
    Gauge {
        name: "gwscale_rps",
        help: "Estimated requests per second.",
        value: |r| r.rps,
    },
    Gauge {
        name: "gwscale_ideal_nodes",
        help: "Ideal node count for the current load.",
        value: |r| r.ideal_nodes.map(f64::from),
    },
    Gauge {
        name: "gwscale_healthy_nodes",
        help: "Backends reported healthy by the gateway.",
        value: |r| r.health.map(|h| f64::from(h.healthy)),
    },
    Gauge {
        name: "gwscale_unhealthy_nodes",
        help: "Backends reported unhealthy by the gateway.",
        value: |r| r.health.map(|h| f64::from(h.unhealthy)),
    },
    Gauge {
        name: "gwscale_capacity",
        help: "Configured scale set capacity.",
        value: |r| r.capacity.map(f64::from),
    },
    Gauge {
        name: "gwscale_pending_scale_down_votes",
        help: "Scale-down votes waiting for quorum.",
        value: |r| Some(f64::from(r.pending_votes)),
    },
];

/// Render the latest report of each pool as Prometheus gauges labelled
/// by `pool`. Values a report did not observe are omitted.
pub fn render_prometheus(reports: &[TickReport]) -> String {
    let mut out = String::new();

    for gauge in GAUGES {
        let _ = writeln!(out, "# HELP {} {}", gauge.name, gauge.help);
        let _ = writeln!(out, "# TYPE {} gauge", gauge.name);
        for report in reports {
            if let Some(value) = (gauge.value)(report) {
                let _ = writeln!(
                    out,
                    "{}{{pool=\"{}\"}} {}",
                    gauge.name,
                    escape_label(&report.pool),
                    format_value(value)
                );
            }
        }
    }

    out
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"")
}
