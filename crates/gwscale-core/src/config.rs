//! gwscale.toml configuration parser.
//!
//! Every field has a default, so an empty file is a valid config. Values
//! are layered: defaults, then the TOML file, then `GWSCALE_*` environment
//! variables, then validation.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PoolTarget;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalerConfig {
    pub target: PoolTarget,
    pub scaling: ScalingConfig,
    pub cadence: CadenceConfig,
    pub metrics: MetricsConfig,
}

/// Thresholds for the scaling decision engine and the ramp controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    /// Floor for the ideal node count before the health buffer is added.
    pub min_healthy_servers: u32,
    /// Requests per second one node is expected to absorb.
    pub max_concurrent_connections_per_node: u32,
    /// Spare nodes added on top of the load-derived count.
    pub health_buffer: u32,
    /// Largest capacity increase applied in one step.
    pub max_scale_up_unit: u32,
    /// Hard cap on scale set capacity.
    pub max_active_servers: u32,
    /// Ramp to the target within one invocation instead of one step per tick.
    pub scale_up_quickly: bool,
    /// Pause between ramp steps when scaling up quickly (e.g. "5s").
    pub ramp_step_delay: String,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_healthy_servers: 3,
            max_concurrent_connections_per_node: 3,
            health_buffer: 3,
            max_scale_up_unit: 10,
            max_active_servers: 100,
            scale_up_quickly: true,
            ramp_step_delay: "5s".to_string(),
        }
    }
}

/// How often the sub-phases run relative to the external tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CadenceConfig {
    /// Only every Nth external tick is evaluated.
    pub schedule_to_run_factor: u64,
    /// Bad-node cleanup runs on every Nth evaluated tick.
    pub clean_up_every: u64,
    /// Scale-up may be applied on every Nth evaluated tick.
    pub scale_up_every: u64,
    /// Period of the external trigger when driven by the daemon.
    pub tick_interval: String,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            schedule_to_run_factor: 3,
            clean_up_every: 4,
            scale_up_every: 1,
            tick_interval: "20s".to_string(),
        }
    }
}

/// Where load metrics come from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSourceKind {
    /// The platform's metrics API.
    #[default]
    Live,
    /// A synthetic, scripted traffic profile.
    FakeLoad,
}

impl FromStr for MetricsSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "fake_load" | "fake-load" | "fake" => Ok(Self::FakeLoad),
            other => Err(format!("unknown metrics source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    pub source: MetricsSourceKind,
    /// Trailing query window (e.g. "6m").
    pub window: String,
    /// Above this many current connections, RPS reconciles response
    /// status against total requests.
    pub activity_threshold: i64,
    /// Push decision inputs as custom metrics.
    pub custom_metrics: bool,
    /// Log full custom metric payloads.
    pub custom_metrics_verbose: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            source: MetricsSourceKind::Live,
            window: "6m".to_string(),
            activity_threshold: 8,
            custom_metrics: false,
            custom_metrics_verbose: false,
        }
    }
}

impl ScalerConfig {
    /// Load from a TOML file, apply `GWSCALE_*` overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlay values from a variable lookup (normally the process
    /// environment). Unset or empty variables keep the current value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GWSCALE_SUBSCRIPTION_ID") {
            self.target.subscription_id = v;
        }
        if let Some(v) = get("GWSCALE_RESOURCE_GROUP") {
            self.target.resource_group = v;
        }
        if let Some(v) = get("GWSCALE_GATEWAY_NAME") {
            self.target.gateway_name = v;
        }
        if let Some(v) = get("GWSCALE_SCALE_SET_NAME") {
            self.target.scale_set_name = v;
        }

        let s = &mut self.scaling;
        override_parsed(&get, "GWSCALE_MIN_HEALTHY_SERVERS", &mut s.min_healthy_servers)?;
        override_parsed(
            &get,
            "GWSCALE_MAX_CONCURRENT_CONNECTIONS",
            &mut s.max_concurrent_connections_per_node,
        )?;
        override_parsed(&get, "GWSCALE_HEALTH_BUFFER", &mut s.health_buffer)?;
        override_parsed(&get, "GWSCALE_MAX_SCALE_UP_UNIT", &mut s.max_scale_up_unit)?;
        override_parsed(&get, "GWSCALE_MAX_ACTIVE_SERVERS", &mut s.max_active_servers)?;
        override_parsed(&get, "GWSCALE_SCALE_UP_QUICKLY", &mut s.scale_up_quickly)?;
        if let Some(v) = get("GWSCALE_RAMP_STEP_DELAY") {
            s.ramp_step_delay = v;
        }

        let c = &mut self.cadence;
        override_parsed(&get, "GWSCALE_SCHEDULE_TO_RUN_FACTOR", &mut c.schedule_to_run_factor)?;
        override_parsed(&get, "GWSCALE_CLEAN_UP_EVERY", &mut c.clean_up_every)?;
        override_parsed(&get, "GWSCALE_SCALE_UP_EVERY", &mut c.scale_up_every)?;
        if let Some(v) = get("GWSCALE_TICK_INTERVAL") {
            c.tick_interval = v;
        }

        let m = &mut self.metrics;
        override_parsed(&get, "GWSCALE_METRICS_SOURCE", &mut m.source)?;
        if let Some(v) = get("GWSCALE_METRICS_WINDOW") {
            m.window = v;
        }
        override_parsed(&get, "GWSCALE_ACTIVITY_THRESHOLD", &mut m.activity_threshold)?;
        override_parsed(&get, "GWSCALE_CUSTOM_METRICS", &mut m.custom_metrics)?;
        override_parsed(&get, "GWSCALE_CUSTOM_METRICS_VERBOSE", &mut m.custom_metrics_verbose)?;

        Ok(())
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scaling;
        if s.max_scale_up_unit == 0 {
            return Err(ConfigError::Invalid("max_scale_up_unit must be at least 1".into()));
        }
        if s.max_concurrent_connections_per_node == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_connections_per_node must be at least 1".into(),
            ));
        }
        if s.min_healthy_servers > s.max_active_servers {
            return Err(ConfigError::Invalid(format!(
                "min_healthy_servers ({}) exceeds max_active_servers ({})",
                s.min_healthy_servers, s.max_active_servers
            )));
        }

        let c = &self.cadence;
        for (name, value) in [
            ("schedule_to_run_factor", c.schedule_to_run_factor),
            ("clean_up_every", c.clean_up_every),
            ("scale_up_every", c.scale_up_every),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }

        self.ramp_step_delay()?;
        self.tick_interval()?;
        self.metrics_window()?;
        Ok(())
    }

    pub fn ramp_step_delay(&self) -> Result<Duration, ConfigError> {
        parse_field("ramp_step_delay", &self.scaling.ramp_step_delay)
    }

    pub fn tick_interval(&self) -> Result<Duration, ConfigError> {
        parse_field("tick_interval", &self.cadence.tick_interval)
    }

    pub fn metrics_window(&self) -> Result<Duration, ConfigError> {
        parse_field("window", &self.metrics.window)
    }
}

fn override_parsed<T, G>(get: &G, name: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(name) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

fn parse_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "6m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
