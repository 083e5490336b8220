//! Agent configuration
//!
//! Defaults, then an optional TOML file (`flowguard.toml`, or the path in
//! `FLOWGUARD_CONFIG`), then `FLOWGUARD_*` environment variables with `__`
//! between section and key, e.g. `FLOWGUARD_REROUTER__IN_PORT=3`.

use anyhow::{ensure, Context, Result};
use flowguard_lib::classifier::{CongestionThresholds, PredictionThresholds};
use flowguard_lib::controller::{ControllerConfig, DEFAULT_FLOW_PRIORITY};
use flowguard_lib::monitor::ReportingConfig;
use flowguard_lib::pipeline::PollConfig;
use flowguard_lib::reroute::RerouteConfig;
use flowguard_lib::telemetry::{EstimatorConfig, DEFAULT_ALPHA};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "flowguard.toml";

/// Longest accepted measurement window, one day
const MAX_WINDOW_SECS: f64 = 86_400.0;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name attached to structured log events
    pub node_name: String,
    /// Port for the reporting, health and metrics API
    pub api_port: u16,
    /// Failed ticks in a row before a loop reports degraded
    pub degraded_after: u32,
    pub controller: ControllerSection,
    pub detector: DetectorSection,
    pub predictor: PredictorSection,
    pub rerouter: RerouterSection,
    pub reporting: ReportingSection,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "flowguard".to_string()),
            api_port: 5000,
            degraded_after: 3,
            controller: ControllerSection::default(),
            detector: DetectorSection::default(),
            predictor: PredictorSection::default(),
            rerouter: RerouterSection::default(),
            reporting: ReportingSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub request_timeout_ms: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            base_url: defaults.base_url,
            username: defaults.username,
            password: defaults.password,
            request_timeout_ms: defaults.request_timeout.as_millis() as u64,
        }
    }
}

impl ControllerSection {
    pub fn client_config(&self) -> ControllerConfig {
        ControllerConfig {
            base_url: self.base_url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    pub enabled: bool,
    pub link_capacity_bps: f64,
    pub min_traffic_bps: f64,
    pub u_high: f64,
    pub u_mid: f64,
    pub g_high: f64,
    pub interval_secs: u64,
}

impl Default for DetectorSection {
    fn default() -> Self {
        let thresholds = CongestionThresholds::default();
        Self {
            enabled: true,
            link_capacity_bps: 1_000_000_000.0,
            min_traffic_bps: 1_000_000.0,
            u_high: thresholds.u_high,
            u_mid: thresholds.u_mid,
            g_high: thresholds.g_high,
            interval_secs: 2,
        }
    }
}

impl DetectorSection {
    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            link_capacity_bps: self.link_capacity_bps,
            min_traffic_bps: self.min_traffic_bps,
            alpha: DEFAULT_ALPHA,
        }
    }

    pub fn thresholds(&self) -> CongestionThresholds {
        CongestionThresholds {
            u_high: self.u_high,
            u_mid: self.u_mid,
            g_high: self.g_high,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictorSection {
    pub enabled: bool,
    pub link_capacity_bps: f64,
    pub min_traffic_bps: f64,
    pub alpha: f64,
    pub threshold: f64,
    pub interval_secs: u64,
}

impl Default for PredictorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            link_capacity_bps: 100_000_000.0,
            min_traffic_bps: 1_000_000.0,
            alpha: DEFAULT_ALPHA,
            threshold: 0.75,
            interval_secs: 2,
        }
    }
}

impl PredictorSection {
    pub fn estimator(&self) -> EstimatorConfig {
        EstimatorConfig {
            link_capacity_bps: self.link_capacity_bps,
            min_traffic_bps: self.min_traffic_bps,
            alpha: self.alpha,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RerouterSection {
    pub enabled: bool,
    pub link_capacity_bps: f64,
    pub min_traffic_bps: f64,
    pub alpha: f64,
    pub threshold: f64,
    pub interval_secs: u64,
    pub in_port: String,
    pub out_port: String,
    pub flow_priority: u32,
    pub link_aware: bool,
    /// Read the mode over HTTP instead of from this process
    pub mode_url: Option<String>,
    /// Post reroute notices over HTTP instead of to this process
    pub notify_url: Option<String>,
    pub notify_timeout_ms: u64,
}

impl Default for RerouterSection {
    fn default() -> Self {
        Self {
            enabled: true,
            link_capacity_bps: 1_000_000_000.0,
            min_traffic_bps: 0.0,
            alpha: DEFAULT_ALPHA,
            threshold: 0.75,
            interval_secs: 5,
            in_port: "1".to_string(),
            out_port: "2".to_string(),
            flow_priority: DEFAULT_FLOW_PRIORITY,
            link_aware: false,
            mode_url: None,
            notify_url: None,
            notify_timeout_ms: 1000,
        }
    }
}

impl RerouterSection {
    pub fn reroute_config(&self) -> RerouteConfig {
        RerouteConfig {
            estimator: EstimatorConfig {
                link_capacity_bps: self.link_capacity_bps,
                min_traffic_bps: self.min_traffic_bps,
                alpha: self.alpha,
            },
            thresholds: PredictionThresholds::single(self.threshold),
            in_port: self.in_port.clone(),
            out_port: self.out_port.clone(),
            flow_priority: self.flow_priority,
            link_aware: self.link_aware,
        }
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingSection {
    pub link_capacity_bps: f64,
    pub alpha: f64,
    pub congested_threshold: f64,
    pub predicted_threshold: f64,
    pub utilization_cap: f64,
    pub window_secs: f64,
    pub top_ports: usize,
}

impl Default for ReportingSection {
    fn default() -> Self {
        let defaults = ReportingConfig::default();
        Self {
            link_capacity_bps: defaults.link_capacity_bps,
            alpha: defaults.alpha,
            congested_threshold: 0.85,
            predicted_threshold: 0.65,
            utilization_cap: defaults.utilization_cap,
            window_secs: defaults.window.as_secs_f64(),
            top_ports: defaults.top_ports,
        }
    }
}

impl ReportingSection {
    pub fn reporting_config(&self) -> ReportingConfig {
        ReportingConfig {
            link_capacity_bps: self.link_capacity_bps,
            alpha: self.alpha,
            thresholds: PredictionThresholds::two_tier(
                self.congested_threshold,
                self.predicted_threshold,
            ),
            utilization_cap: self.utilization_cap,
            window: Duration::from_secs_f64(self.window_secs),
            top_ports: self.top_ports,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let file = std::env::var("FLOWGUARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::build(Some(&file), environment())
    }

    fn build(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(
                config::File::from(file)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?;
        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.controller.request_timeout_ms > 0,
            "controller.request_timeout_ms must be positive"
        );
        ensure!(
            self.detector.u_mid <= self.detector.u_high,
            "detector.u_mid must not exceed detector.u_high"
        );
        ensure!(
            self.reporting.predicted_threshold <= self.reporting.congested_threshold,
            "reporting.predicted_threshold must not exceed reporting.congested_threshold"
        );
        for (name, alpha) in [
            ("predictor.alpha", self.predictor.alpha),
            ("rerouter.alpha", self.rerouter.alpha),
            ("reporting.alpha", self.reporting.alpha),
        ] {
            ensure!(alpha > 0.0 && alpha <= 1.0, "{} must be in (0, 1]", name);
        }
        for (name, capacity) in [
            ("detector.link_capacity_bps", self.detector.link_capacity_bps),
            ("predictor.link_capacity_bps", self.predictor.link_capacity_bps),
            ("rerouter.link_capacity_bps", self.rerouter.link_capacity_bps),
            ("reporting.link_capacity_bps", self.reporting.link_capacity_bps),
        ] {
            ensure!(capacity > 0.0, "{} must be positive", name);
        }
        for (name, secs) in [
            ("detector.interval_secs", self.detector.interval_secs),
            ("predictor.interval_secs", self.predictor.interval_secs),
            ("rerouter.interval_secs", self.rerouter.interval_secs),
        ] {
            ensure!(secs > 0, "{} must be positive", name);
        }
        ensure!(
            (0.0..=MAX_WINDOW_SECS).contains(&self.reporting.window_secs),
            "reporting.window_secs must be between 0 and {} seconds",
            MAX_WINDOW_SECS
        );
        Ok(())
    }

    pub fn poll_config(&self, interval_secs: u64) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(interval_secs),
            degraded_after: self.degraded_after,
        }
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("FLOWGUARD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
