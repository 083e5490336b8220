//! Mode-gated, one-shot reroute controller
//!
//! Each tick reads the operating mode, updates the rate estimator and EWMA
//! for every port, and installs a single redirect flow rule the first time
//! any port is predicted to congest. The latch that makes the action
//! one-shot is cleared whenever the mode leaves active control, including
//! exits that happen entirely between two ticks.

use super::{ModeSource, RerouteNotifier};
use crate::classifier::{PredictionThresholds, DEFAULT_PREDICTED_THRESHOLD};
use crate::controller::{FlowRule, NetworkController, DEFAULT_FLOW_PRIORITY};
use crate::error::ControllerResult;
use crate::health::{components, HealthRegistry};
use crate::models::{Device, Link, OperatingMode, RerouteNotice};
use crate::observability::{FlowguardMetrics, StructuredLogger};
use crate::pipeline::{sample_ports, PollTask, TickOutcome};
use crate::telemetry::{EstimatorConfig, PortTracker, DEFAULT_ALPHA};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Reroute controller parameters
#[derive(Debug, Clone)]
pub struct RerouteConfig {
    pub estimator: EstimatorConfig,
    pub thresholds: PredictionThresholds,
    /// Port matched by the installed rule
    pub in_port: String,
    /// Port the rule forwards to
    pub out_port: String,
    pub flow_priority: u32,
    /// Prefer a linked port on the chosen device over `out_port`
    pub link_aware: bool,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorConfig {
                link_capacity_bps: 1_000_000_000.0,
                min_traffic_bps: 0.0,
                alpha: DEFAULT_ALPHA,
            },
            thresholds: PredictionThresholds::single(DEFAULT_PREDICTED_THRESHOLD),
            in_port: "1".to_string(),
            out_port: "2".to_string(),
            flow_priority: DEFAULT_FLOW_PRIORITY,
            link_aware: false,
        }
    }
}

/// Where the redirect rule is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RerouteTarget {
    pub device: String,
    pub in_port: String,
    pub out_port: String,
}

/// What one evaluation did
///
/// `ports` counts the ports measured this tick, `flagged` those predicted
/// to congest.
#[derive(Debug, Clone, PartialEq)]
pub enum RerouteOutcome {
    /// Mode gate closed; latch cleared
    Inactive(OperatingMode),
    /// Controller unavailable; tick skipped
    StatsUnavailable(String),
    /// No port predicted to congest
    Clear { ports: usize },
    /// Congestion predicted but this episode already rerouted
    AlreadyLatched { ports: usize, flagged: usize },
    /// Controller reported no devices
    NoTarget { ports: usize, flagged: usize },
    /// Rule rejected or not delivered; latch left clear
    InstallFailed(String),
    Rerouted {
        target: RerouteTarget,
        ports: usize,
        flagged: usize,
    },
}

/// One-shot latch and the mode session it belongs to
#[derive(Debug, Default)]
struct Latch {
    fired: bool,
    session: Option<u64>,
}

/// Choose the device and ports for the redirect rule
///
/// The first device wins. With `link_aware`, the out port is the
/// lowest-numbered port of that device carrying an inter-switch link,
/// excluding `in_port`; otherwise, or when no such port exists, the
/// configured fallback is used.
pub fn select_target(
    devices: &[Device],
    links: &[Link],
    in_port: &str,
    fallback_out: &str,
    link_aware: bool,
) -> Option<RerouteTarget> {
    let device = devices.first()?;

    let linked_port = if link_aware {
        links
            .iter()
            .filter(|link| link.src.device == device.id && link.src.port != in_port)
            .map(|link| link.src.port.as_str())
            .min_by(|a, b| port_order(a).cmp(&port_order(b)))
    } else {
        None
    };

    Some(RerouteTarget {
        device: device.id.clone(),
        in_port: in_port.to_string(),
        out_port: linked_port.unwrap_or(fallback_out).to_string(),
    })
}

/// Numeric ports sort numerically and ahead of named ones
fn port_order(port: &str) -> (u8, u64, &str) {
    match port.parse::<u64>() {
        Ok(n) => (0, n, port),
        Err(_) => (1, 0, port),
    }
}

pub struct Rerouter {
    controller: Arc<dyn NetworkController>,
    mode_source: Arc<dyn ModeSource>,
    notifier: Arc<dyn RerouteNotifier>,
    tracker: PortTracker,
    config: RerouteConfig,
    /// Held for the whole evaluation so two ticks never race the install
    latch: Mutex<Latch>,
    metrics: FlowguardMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Rerouter {
    pub fn new(
        controller: Arc<dyn NetworkController>,
        mode_source: Arc<dyn ModeSource>,
        notifier: Arc<dyn RerouteNotifier>,
        config: RerouteConfig,
    ) -> Self {
        Self {
            controller,
            mode_source,
            notifier,
            tracker: PortTracker::new(config.estimator.clone()),
            config,
            latch: Mutex::new(Latch::default()),
            metrics: FlowguardMetrics::new(),
            logger: StructuredLogger::new("flowguard"),
            health: None,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Report controller reachability to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn is_latched(&self) -> bool {
        self.latch.lock().await.fired
    }

    /// Run the mode gate, prediction and (at most once per episode) the reroute
    pub async fn evaluate(&self, now: DateTime<Utc>) -> RerouteOutcome {
        let mut latch = self.latch.lock().await;

        let (mode, session) = match self.mode_source.current_mode().await {
            Ok(status) => (status.mode, Some(status.session)),
            Err(e) => {
                warn!(error = %e, "Mode source unreachable, assuming baseline");
                (OperatingMode::Baseline, None)
            }
        };

        // A new session means the mode changed since the last tick, even if
        // this tick sees proposed again
        if let Some(session) = session {
            let previous = latch.session.replace(session);
            if previous.is_some_and(|previous| previous != session) {
                if latch.fired {
                    info!(session, "Mode changed since last tick, reroute latch cleared");
                }
                latch.fired = false;
                self.tracker.clear();
            }
        }

        if !mode.is_active_control() {
            if latch.fired {
                info!(mode = %mode, "Active control ended, reroute latch cleared");
            }
            latch.fired = false;
            // Rates and EWMA restart from scratch when control resumes
            self.tracker.clear();
            return RerouteOutcome::Inactive(mode);
        }

        let observations = match sample_ports(
            self.controller.as_ref(),
            &self.tracker,
            &self.metrics,
            self.health.as_ref(),
            now,
        )
        .await
        {
            Ok(observations) => observations,
            Err(e) => return RerouteOutcome::StatsUnavailable(e.to_string()),
        };

        let mut ports = 0;
        let mut flagged = 0;
        for (port, observation) in &observations {
            let Some(reading) = observation.reading() else {
                continue;
            };
            ports += 1;
            self.metrics.set_port_reading(
                components::REROUTER,
                port,
                reading.utilization,
                reading.ewma,
            );
            if self.config.thresholds.classify(reading.ewma).is_congestion() {
                flagged += 1;
                self.logger.log_congestion_predicted(
                    port,
                    reading.ewma,
                    self.config.thresholds.predicted,
                );
            }
        }

        if flagged == 0 {
            return RerouteOutcome::Clear { ports };
        }
        if latch.fired {
            debug!(flagged, "Reroute already fired this episode");
            return RerouteOutcome::AlreadyLatched { ports, flagged };
        }

        let target = match self.choose_target().await {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!("Controller reported no devices, nothing to reroute");
                return RerouteOutcome::NoTarget { ports, flagged };
            }
            Err(e) => {
                self.metrics.inc_controller_errors();
                return RerouteOutcome::StatsUnavailable(e.to_string());
            }
        };

        let rule = FlowRule::redirect(
            &target.device,
            &target.in_port,
            &target.out_port,
            self.config.flow_priority,
        );
        if let Err(e) = self.controller.install_flow(&rule).await {
            self.metrics.inc_flow_install_failures();
            self.logger.log_reroute_failed(&target.device, &e.to_string());
            return RerouteOutcome::InstallFailed(e.to_string());
        }

        latch.fired = true;
        self.metrics.inc_reroutes();
        self.logger
            .log_reroute_installed(&target.device, &target.in_port, &target.out_port);

        let notice = RerouteNotice {
            device: target.device.clone(),
            in_port: target.in_port.clone(),
            out_port: target.out_port.clone(),
            fired_at: Some(now),
        };
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(error = %e, device = %target.device, "Reroute notification not delivered");
        }

        RerouteOutcome::Rerouted {
            target,
            ports,
            flagged,
        }
    }

    async fn choose_target(&self) -> ControllerResult<Option<RerouteTarget>> {
        let devices = self.controller.devices().await?;

        let links = if self.config.link_aware {
            match self.controller.links().await {
                Ok(links) => links,
                Err(e) => {
                    debug!(error = %e, "Link inventory unavailable, using configured out port");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(select_target(
            &devices,
            &links,
            &self.config.in_port,
            &self.config.out_port,
            self.config.link_aware,
        ))
    }
}

#[async_trait]
impl PollTask for Rerouter {
    fn name(&self) -> &'static str {
        components::REROUTER
    }

    async fn tick(&self) -> TickOutcome {
        match self.evaluate(Utc::now()).await {
            RerouteOutcome::Inactive(_) => TickOutcome::Inactive,
            RerouteOutcome::StatsUnavailable(reason) | RerouteOutcome::InstallFailed(reason) => {
                TickOutcome::Failed(reason)
            }
            RerouteOutcome::Clear { ports } => TickOutcome::Completed { ports, flagged: 0 },
            RerouteOutcome::AlreadyLatched { ports, flagged }
            | RerouteOutcome::NoTarget { ports, flagged }
            | RerouteOutcome::Rerouted { ports, flagged, .. } => {
                TickOutcome::Completed { ports, flagged }
            }
        }
    }
}
