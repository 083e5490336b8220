//! Aggregate monitoring service behind the reporting API
//!
//! Owns the state the reporting surface exposes: operating mode, aggregate
//! throughput baseline and EWMA, per-port rates and the post-reroute
//! measurement window. Controller calls happen outside the state lock; the
//! update that follows is serialized.

mod report;

pub use report::{MetricsReport, PortUtilization};

use crate::classifier::PredictionThresholds;
use crate::controller::NetworkController;
use crate::error::ControllerResult;
use crate::health::{components, HealthRegistry, DEFAULT_DEGRADED_AFTER};
use crate::models::{OperatingMode, RerouteNotice};
use crate::observability::{FlowguardMetrics, StructuredLogger};
use crate::reroute::{
    MeasurementWindow, ModeSource, ModeStatus, RerouteNotifier, WindowStatus, DEFAULT_WINDOW,
};
use crate::telemetry::{Ewma, EstimatorConfig, Observation, PortTracker, DEFAULT_ALPHA};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use report::round_to;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Reporting path parameters
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub link_capacity_bps: f64,
    pub alpha: f64,
    pub thresholds: PredictionThresholds,
    /// Upper bound on the displayed utilization
    pub utilization_cap: f64,
    pub window: Duration,
    pub top_ports: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            link_capacity_bps: 100_000_000.0,
            alpha: DEFAULT_ALPHA,
            thresholds: PredictionThresholds::two_tier(0.85, 0.65),
            utilization_cap: 1.2,
            window: DEFAULT_WINDOW,
            top_ports: 5,
        }
    }
}

struct ReportingState {
    mode: OperatingMode,
    /// Advances on every mode change
    mode_session: u64,
    ewma: Option<f64>,
    window: MeasurementWindow,
    last_report: Option<MetricsReport>,
}

impl ReportingState {
    /// Copy the mode and window fields into a cached report
    fn refresh(&self, report: &mut MetricsReport, now: DateTime<Utc>) {
        report.mode = self.mode.clone();
        report.measuring_reroute = self.window.is_open(now);
        report.proposed_samples = self.window.sample_count();
        report.reroute_since = self.window.fired_at();
        report.throughput_proposed = round_to(self.window.reported(report.throughput), 2);
    }
}

/// Throughput summed over the ports that produced a rate this tick
///
/// First samples, counter resets and duplicate timestamps contribute
/// nothing; `rate_bps` is `None` when no port produced a rate. `stale` marks
/// a tick where every port repeated its previous timestamp.
#[derive(Debug, Default)]
struct Aggregate {
    rate_bps: Option<f64>,
    stale: bool,
}

impl Aggregate {
    fn from_observations<'a>(observations: impl IntoIterator<Item = &'a Observation>) -> Self {
        let mut rate_bps: Option<f64> = None;
        let mut seen = 0usize;
        let mut stale = 0usize;
        for observation in observations {
            seen += 1;
            let rate = match observation {
                Observation::Measured(reading) => reading.rate_bps,
                Observation::Idle { rate_bps, .. } => *rate_bps,
                Observation::NonPositiveElapsed => {
                    stale += 1;
                    continue;
                }
                Observation::FirstSample | Observation::CounterReset => continue,
            };
            *rate_bps.get_or_insert(0.0) += rate;
        }
        Self {
            rate_bps,
            stale: seen > 0 && stale == seen,
        }
    }
}

pub struct MonitoringService {
    controller: Arc<dyn NetworkController>,
    config: ReportingConfig,
    smoother: Ewma,
    ports: PortTracker,
    state: Mutex<ReportingState>,
    metrics: FlowguardMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl MonitoringService {
    pub fn new(controller: Arc<dyn NetworkController>, config: ReportingConfig) -> Self {
        let ports = PortTracker::new(EstimatorConfig {
            link_capacity_bps: config.link_capacity_bps,
            min_traffic_bps: 0.0,
            alpha: config.alpha,
        });
        let state = ReportingState {
            mode: OperatingMode::Baseline,
            mode_session: 0,
            ewma: None,
            window: MeasurementWindow::new(config.window),
            last_report: None,
        };

        Self {
            controller,
            smoother: Ewma::new(config.alpha),
            ports,
            config,
            state: Mutex::new(state),
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

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    pub async fn sample(&self) -> ControllerResult<MetricsReport> {
        self.sample_at(Utc::now()).await
    }

    /// Sample the controller once and produce a report stamped `now`
    ///
    /// Aggregate throughput is the sum of the per-port rates, so a port seen
    /// for the first time or one whose counter reset adds nothing.
    pub async fn sample_at(&self, now: DateTime<Utc>) -> ControllerResult<MetricsReport> {
        let result = self.controller.port_statistics().await;
        if let Some(health) = &self.health {
            health
                .record_result(components::CONTROLLER, &result, DEFAULT_DEGRADED_AFTER)
                .await;
        }
        let stats = result.map_err(|e| {
            self.metrics.inc_controller_errors();
            e
        })?;
        let flows = match self.controller.flow_count().await {
            Ok(flows) => flows,
            Err(e) => {
                debug!(error = %e, "Flow count unavailable");
                0
            }
        };

        let mut state = self.state.lock().await;

        let observations = self.ports.observe_all(&stats, now);
        let aggregate = Aggregate::from_observations(observations.iter().map(|(_, o)| o));
        for (port, observation) in &observations {
            if matches!(observation, Observation::CounterReset) {
                debug!(port = %port, "Counter went backwards, port left out of this sample");
                self.metrics.inc_counter_resets();
            }
        }

        if aggregate.stale {
            if let Some(mut report) = state.last_report.clone() {
                state.refresh(&mut report, now);
                state.last_report = Some(report.clone());
                return Ok(report);
            }
        }

        let rate_bps = aggregate.rate_bps;
        let throughput_mbps = rate_bps.unwrap_or(0.0) / 1e6;
        let utilization = (rate_bps.unwrap_or(0.0) / self.config.link_capacity_bps)
            .min(self.config.utilization_cap);
        if rate_bps.is_some() {
            state.ewma = Some(self.smoother.next(state.ewma, utilization));
            state.window.record(throughput_mbps, now);
        }
        let ewma = state.ewma.unwrap_or(0.0);
        self.metrics.set_window_samples(state.window.sample_count());

        let mut top_ports: Vec<PortUtilization> = observations
            .iter()
            .filter_map(|(port, observation)| {
                observation.reading().map(|reading| PortUtilization {
                    port: port.to_string(),
                    utilization: round_to(reading.utilization, 3),
                    rate_bps: reading.rate_bps as u64,
                })
            })
            .collect();
        top_ports.sort_by(|a, b| {
            b.utilization
                .partial_cmp(&a.utilization)
                .unwrap_or(Ordering::Equal)
        });
        top_ports.truncate(self.config.top_ports);

        // Mode and window fields are filled in by `refresh`
        let mut report = MetricsReport {
            timestamp: now,
            throughput: round_to(throughput_mbps, 2),
            throughput_baseline: round_to(throughput_mbps, 2),
            throughput_proposed: 0.0,
            utilization: round_to(utilization, 3),
            ewma: round_to(ewma, 2),
            ewma_percent: round_to(ewma * 100.0, 2),
            state: self.config.thresholds.classify(ewma),
            mode: OperatingMode::Baseline,
            measuring_reroute: false,
            proposed_samples: 0,
            reroute_since: None,
            flows,
            top_ports,
        };
        state.refresh(&mut report, now);
        state.last_report = Some(report.clone());

        Ok(report)
    }

    /// Most recent report, without sampling
    pub async fn last_report(&self) -> Option<MetricsReport> {
        self.state.lock().await.last_report.clone()
    }

    pub async fn mode(&self) -> OperatingMode {
        self.state.lock().await.mode.clone()
    }

    pub async fn mode_status(&self) -> ModeStatus {
        let state = self.state.lock().await;
        ModeStatus::new(state.mode.clone(), state.mode_session)
    }

    /// Switch mode; leaving active control returns the window to rest
    pub async fn set_mode(&self, mode: OperatingMode) -> OperatingMode {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut state.mode, mode.clone());

        if previous.is_active_control() && !mode.is_active_control() {
            state.window.reset();
            self.metrics.set_window_samples(0);
        }
        if previous != mode {
            state.mode_session += 1;
            self.logger.log_mode_changed(&previous, &mode);
        }
        self.metrics.set_mode(&mode);

        previous
    }

    /// Arm the measurement window for a reroute received at `now`
    pub async fn notify_reroute(&self, mut notice: RerouteNotice, now: DateTime<Utc>) -> WindowStatus {
        let mut state = self.state.lock().await;
        notice.fired_at.get_or_insert(now);

        self.logger
            .log_window_armed(&notice.device, self.config.window.as_secs_f64());
        state.window.arm(Some(notice), now);
        self.metrics.set_window_samples(0);

        state.window.status(now)
    }

    pub async fn window_status(&self, now: DateTime<Utc>) -> WindowStatus {
        self.state.lock().await.window.status(now)
    }
}

#[async_trait]
impl ModeSource for MonitoringService {
    async fn current_mode(&self) -> anyhow::Result<ModeStatus> {
        Ok(self.mode_status().await)
    }
}

#[async_trait]
impl RerouteNotifier for MonitoringService {
    async fn notify(&self, notice: &RerouteNotice) -> anyhow::Result<()> {
        self.notify_reroute(notice.clone(), Utc::now()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrafficState;
    use crate::test_support::MockController;
    use chrono::TimeZone;

    const MB: u64 = 1_000_000;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn notice() -> RerouteNotice {
        RerouteNotice {
            device: "of:0000000000000001".into(),
            in_port: "1".into(),
            out_port: "2".into(),
            fired_at: None,
        }
    }

    fn service() -> (Arc<MockController>, MonitoringService) {
        let controller = Arc::new(MockController::new());
        let service = MonitoringService::new(controller.clone(), ReportingConfig::default());
        (controller, service)
    }

    #[tokio::test]
    async fn test_first_sample_reports_zero() {
        let (controller, service) = service();
        controller.set_counters("of:1", &[("1", 500 * MB)]);
        controller.set_flow_count(4);

        let report = service.sample_at(at(0)).await.unwrap();
        assert_eq!(report.throughput, 0.0);
        assert_eq!(report.ewma, 0.0);
        assert_eq!(report.state, TrafficState::Safe);
        assert_eq!(report.flows, 4);
        assert!(report.top_ports.is_empty());
        assert_eq!(report.mode, OperatingMode::Baseline);
    }

    #[tokio::test]
    async fn test_aggregate_rate_and_two_tier_state() {
        let (controller, service) = service();
        controller.set_counters("of:1", &[("1", 0), ("2", 0)]);
        service.sample_at(at(0)).await.unwrap();

        // 12.5 MB + 10 MB in 2 s = 90 Mbps on a 100 Mbps reference
        controller.set_counters("of:1", &[("1", 12_500_000), ("2", 10 * MB)]);
        let report = service.sample_at(at(2)).await.unwrap();

        assert_eq!(report.throughput, 90.0);
        assert_eq!(report.utilization, 0.9);
        assert_eq!(report.ewma, 0.9);
        assert_eq!(report.ewma_percent, 90.0);
        assert_eq!(report.state, TrafficState::Congested);

        assert_eq!(report.top_ports.len(), 2);
        assert_eq!(report.top_ports[0].port, "of:1:1");
        assert_eq!(report.top_ports[0].utilization, 0.5);
        assert_eq!(report.top_ports[0].rate_bps, 50_000_000);
        assert_eq!(report.top_ports[1].port, "of:1:2");
    }

    #[tokio::test]
    async fn test_utilization_display_is_capped() {
        let (controller, service) = service();
        controller.set_counters("of:1", &[("1", 0)]);
        service.sample_at(at(0)).await.unwrap();

        // 400 Mbps against 100 Mbps
        controller.set_counters("of:1", &[("1", 100 * MB)]);
        let report = service.sample_at(at(2)).await.unwrap();
        assert_eq!(report.utilization, 1.2);
        assert_eq!(report.ewma, 1.2);
    }

    #[tokio::test]
    async fn test_top_ports_limited() {
        let (controller, service) = service();
        let ports: Vec<(String, u64)> = (1..=8).map(|p| (p.to_string(), 0)).collect();
        let refs: Vec<(&str, u64)> = ports.iter().map(|(p, b)| (p.as_str(), *b)).collect();
        controller.set_counters("of:1", &refs);
        service.sample_at(at(0)).await.unwrap();

        let ports: Vec<(String, u64)> = (1..=8).map(|p| (p.to_string(), p * MB)).collect();
        let refs: Vec<(&str, u64)> = ports.iter().map(|(p, b)| (p.as_str(), *b)).collect();
        controller.set_counters("of:1", &refs);
        let report = service.sample_at(at(2)).await.unwrap();

        let names: Vec<_> = report.top_ports.iter().map(|p| p.port.as_str()).collect();
        assert_eq!(names, vec!["of:1:8", "of:1:7", "of:1:6", "of:1:5", "of:1:4"]);
    }

    #[tokio::test]
    async fn test_non_positive_elapsed_returns_last_report() {
        let (controller, service) = service();
        controller.set_counters("of:1", &[("1", 0)]);
        service.sample_at(at(0)).await.unwrap();
        controller.set_counters("of:1", &[("1", 5 * MB)]);
        let first = service.sample_at(at(2)).await.unwrap();

        controller.set_counters("of:1", &[("1", 90 * MB)]);
        let repeated = service.sample_at(at(2)).await.unwrap();
        assert_eq!(repeated, first);
    }

    #[tokio::test]
    async fn test_window_mean_is_frozen_after_close() {
        let (controller, service) = service();
        service.set_mode(OperatingMode::Proposed).await;
        controller.set_counters("of:1", &[("1", 0)]);
        service.sample_at(at(0)).await.unwrap();

        let status = service.notify_reroute(notice(), at(0)).await;
        assert!(status.open);
        assert_eq!(status.samples, 0);

        // 20 Mbps then 40 Mbps inside the window
        controller.set_counters("of:1", &[("1", 5 * MB)]);
        let r1 = service.sample_at(at(2)).await.unwrap();
        controller.set_counters("of:1", &[("1", 15 * MB)]);
        let r2 = service.sample_at(at(4)).await.unwrap();
        assert!(r1.measuring_reroute && r2.measuring_reroute);
        assert_eq!(r2.proposed_samples, 2);
        assert_eq!(r2.throughput_proposed, 30.0);
        assert_eq!(r2.reroute_since, Some(at(0)));

        // 80 Mbps after the window closed
        controller.set_counters("of:1", &[("1", 45 * MB)]);
        let r3 = service.sample_at(at(7)).await.unwrap();
        assert!(!r3.measuring_reroute);
        assert_eq!(r3.proposed_samples, 2);
        assert_eq!(r3.throughput, 80.0);
        assert_eq!(r3.throughput_proposed, 30.0);
    }

    #[tokio::test]
    async fn test_counter_reset_adds_no_window_sample() {
        let (controller, service) = service();
        service.set_mode(OperatingMode::Proposed).await;
        controller.set_counters("of:1", &[("1", 0)]);
        service.sample_at(at(0)).await.unwrap();
        service.notify_reroute(notice(), at(0)).await;

        // 40 Mbps, then the switch restarts and its counter drops
        controller.set_counters("of:1", &[("1", 10 * MB)]);
        let r1 = service.sample_at(at(2)).await.unwrap();
        assert_eq!(r1.throughput_proposed, 40.0);

        controller.set_counters("of:1", &[("1", MB)]);
        let r2 = service.sample_at(at(4)).await.unwrap();
        assert_eq!(r2.proposed_samples, 1);
        assert_eq!(r2.throughput_proposed, 40.0);
        assert_eq!(r2.throughput, 0.0);
        assert_eq!(r2.ewma, r1.ewma);
    }

    #[tokio::test]
    async fn test_new_port_counter_is_not_throughput() {
        let (controller, service) = service();
        controller.set_counters("of:1", &[("1", 0)]);
        service.sample_at(at(0)).await.unwrap();

        // 8 Mbps on port 1
        controller.set_counters("of:1", &[("1", 2 * MB)]);
        let before = service.sample_at(at(2)).await.unwrap();
        assert_eq!(before.throughput, 8.0);

        // Port 9 appears carrying a 50 GB lifetime counter
        controller.set_counters("of:1", &[("1", 4 * MB), ("9", 50_000 * MB)]);
        let after = service.sample_at(at(4)).await.unwrap();
        assert_eq!(after.throughput, 8.0);
        assert_eq!(after.ewma, 0.08);
        assert_eq!(after.state, TrafficState::Safe);
        assert_eq!(after.top_ports.len(), 1);

        // From the next tick on port 9 is measured like any other
        controller.set_counters("of:1", &[("1", 6 * MB), ("9", 50_001 * MB)]);
        let next = service.sample_at(at(6)).await.unwrap();
        assert_eq!(next.throughput, 12.0);
        assert_eq!(next.top_ports.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_timestamp_refreshes_mode_and_window() {
        let (controller, service) = service();
        controller.set_counters("of:1", &[("1", 0)]);
        service.sample_at(at(0)).await.unwrap();
        controller.set_counters("of:1", &[("1", 5 * MB)]);
        let first = service.sample_at(at(2)).await.unwrap();
        assert_eq!(first.mode, OperatingMode::Baseline);

        service.set_mode(OperatingMode::Proposed).await;
        service.notify_reroute(notice(), at(2)).await;

        let repeated = service.sample_at(at(2)).await.unwrap();
        assert_eq!(repeated.throughput, first.throughput);
        assert_eq!(repeated.mode, OperatingMode::Proposed);
        assert!(repeated.measuring_reroute);
        assert_eq!(repeated.reroute_since, Some(at(2)));
        assert_eq!(repeated.proposed_samples, 0);
    }

    #[tokio::test]
    async fn test_mode_session_advances_on_change() {
        let (_controller, service) = service();
        assert_eq!(service.mode_status().await, ModeStatus::new(OperatingMode::Baseline, 0));

        service.set_mode(OperatingMode::Proposed).await;
        service.set_mode(OperatingMode::Proposed).await;
        assert_eq!(service.mode_status().await.session, 1);

        service.set_mode(OperatingMode::Baseline).await;
        service.set_mode(OperatingMode::Proposed).await;
        let status = service.current_mode().await.unwrap();
        assert_eq!(status, ModeStatus::new(OperatingMode::Proposed, 3));
    }

    #[tokio::test]
    async fn test_sampling_reports_controller_health() {
        let controller = Arc::new(MockController::new());
        let health = HealthRegistry::new();
        health.register(components::CONTROLLER).await;
        let service = MonitoringService::new(controller.clone(), ReportingConfig::default())
            .with_health(health.clone());

        controller
            .fail_stats
            .store(true, std::sync::atomic::Ordering::SeqCst);
        for _ in 0..DEFAULT_DEGRADED_AFTER {
            assert!(service.sample_at(at(0)).await.is_err());
        }
        let status = health.health().await.components[components::CONTROLLER].status;
        assert_eq!(status, crate::health::ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_leaving_proposed_resets_window() {
        let (_controller, service) = service();
        service.set_mode(OperatingMode::Proposed).await;
        service.notify_reroute(notice(), at(0)).await;

        let previous = service.set_mode(OperatingMode::Baseline).await;
        assert_eq!(previous, OperatingMode::Proposed);

        let status = service.window_status(at(1)).await;
        assert!(!status.open);
        assert_eq!(status.fired_at, None);
    }

    #[tokio::test]
    async fn test_service_as_mode_source_and_notifier() {
        let (_controller, service) = service();
        let service = Arc::new(service);
        let source: Arc<dyn ModeSource> = service.clone();
        let notifier: Arc<dyn RerouteNotifier> = service.clone();

        assert_eq!(source.current_mode().await.unwrap().mode, OperatingMode::Baseline);
        service.set_mode("PROPOSED".parse().unwrap()).await;
        assert_eq!(source.current_mode().await.unwrap().mode, OperatingMode::Proposed);

        notifier.notify(&notice()).await.unwrap();
        let status = service.window_status(Utc::now()).await;
        assert!(status.open);
        assert!(status.trigger.unwrap().fired_at.is_some());
    }

    #[tokio::test]
    async fn test_controller_failure_is_error() {
        let (controller, service) = service();
        controller
            .fail_stats
            .store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(service.sample_at(at(0)).await.is_err());
        assert!(service.last_report().await.is_none());
    }
}
