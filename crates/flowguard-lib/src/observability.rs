//! Observability infrastructure for the flowguard agent
//!
//! Provides:
//! - Prometheus metrics (loop ticks, controller errors, reroutes, per-port gauges)
//! - Structured JSON logging with tracing

use crate::models::{OperatingMode, PortKey, TrafficState};
use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick latency (in seconds)
const TICK_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<FlowguardMetricsInner> = OnceLock::new();

struct FlowguardMetricsInner {
    ticks_total: IntCounterVec,
    ticks_skipped_total: IntCounterVec,
    tick_latency_seconds: HistogramVec,
    controller_errors_total: IntCounter,
    counter_resets_total: IntCounter,
    reroutes_total: IntCounter,
    flow_install_failures_total: IntCounter,
    window_samples: IntGauge,
    port_utilization: GaugeVec,
    port_ewma: GaugeVec,
    operating_mode: GaugeVec,
}

impl FlowguardMetricsInner {
    fn new() -> Self {
        Self {
            ticks_total: register_int_counter_vec!(
                "flowguard_ticks_total",
                "Completed polling ticks per loop",
                &["loop"]
            )
            .expect("Failed to register ticks_total"),

            ticks_skipped_total: register_int_counter_vec!(
                "flowguard_ticks_skipped_total",
                "Polling ticks skipped because the controller was unavailable",
                &["loop"]
            )
            .expect("Failed to register ticks_skipped_total"),

            tick_latency_seconds: register_histogram_vec!(
                "flowguard_tick_latency_seconds",
                "Time spent in one polling tick",
                &["loop"],
                TICK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            controller_errors_total: register_int_counter!(
                "flowguard_controller_errors_total",
                "Failed controller REST calls"
            )
            .expect("Failed to register controller_errors_total"),

            counter_resets_total: register_int_counter!(
                "flowguard_counter_resets_total",
                "Port counters observed going backwards"
            )
            .expect("Failed to register counter_resets_total"),

            reroutes_total: register_int_counter!(
                "flowguard_reroutes_total",
                "Reroute flow rules installed"
            )
            .expect("Failed to register reroutes_total"),

            flow_install_failures_total: register_int_counter!(
                "flowguard_flow_install_failures_total",
                "Reroute flow rules rejected or not delivered"
            )
            .expect("Failed to register flow_install_failures_total"),

            window_samples: register_int_gauge!(
                "flowguard_window_samples",
                "Throughput samples in the current measurement window"
            )
            .expect("Failed to register window_samples"),

            port_utilization: register_gauge_vec!(
                "flowguard_port_utilization",
                "Instantaneous port utilization as a fraction of capacity",
                &["loop", "port"]
            )
            .expect("Failed to register port_utilization"),

            port_ewma: register_gauge_vec!(
                "flowguard_port_ewma",
                "Smoothed port utilization",
                &["loop", "port"]
            )
            .expect("Failed to register port_ewma"),

            operating_mode: register_gauge_vec!(
                "flowguard_operating_mode_info",
                "Currently selected operating mode",
                &["mode"]
            )
            .expect("Failed to register operating_mode"),
        }
    }
}

/// Flowguard metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct FlowguardMetrics {
    _private: (),
}

impl Default for FlowguardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowguardMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(FlowguardMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &FlowguardMetricsInner {
        GLOBAL_METRICS.get_or_init(FlowguardMetricsInner::new)
    }

    pub fn inc_ticks(&self, loop_name: &str) {
        self.inner().ticks_total.with_label_values(&[loop_name]).inc();
    }

    pub fn inc_ticks_skipped(&self, loop_name: &str) {
        self.inner()
            .ticks_skipped_total
            .with_label_values(&[loop_name])
            .inc();
    }

    pub fn observe_tick_latency(&self, loop_name: &str, duration_secs: f64) {
        self.inner()
            .tick_latency_seconds
            .with_label_values(&[loop_name])
            .observe(duration_secs);
    }

    pub fn inc_controller_errors(&self) {
        self.inner().controller_errors_total.inc();
    }

    pub fn inc_counter_resets(&self) {
        self.inner().counter_resets_total.inc();
    }

    pub fn inc_reroutes(&self) {
        self.inner().reroutes_total.inc();
    }

    pub fn inc_flow_install_failures(&self) {
        self.inner().flow_install_failures_total.inc();
    }

    pub fn set_window_samples(&self, samples: usize) {
        self.inner().window_samples.set(samples as i64);
    }

    /// Update the per-port gauges for one loop
    pub fn set_port_reading(&self, loop_name: &str, port: &PortKey, utilization: f64, ewma: f64) {
        let port = port.to_string();
        self.inner()
            .port_utilization
            .with_label_values(&[loop_name, &port])
            .set(utilization);
        self.inner()
            .port_ewma
            .with_label_values(&[loop_name, &port])
            .set(ewma);
    }

    /// Update current mode info
    pub fn set_mode(&self, mode: &OperatingMode) {
        // Only the active mode carries a value
        self.inner().operating_mode.reset();
        self.inner()
            .operating_mode
            .with_label_values(&[mode.as_str()])
            .set(1.0);
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for state transitions,
/// reroutes and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log a port classification from the detector
    pub fn log_port_state(
        &self,
        port: &PortKey,
        state: TrafficState,
        utilization: f64,
        growth_rate: f64,
    ) {
        if state.is_congestion() {
            warn!(
                event = "port_state",
                node = %self.node_name,
                port = %port,
                state = %state,
                utilization = utilization,
                growth_rate = growth_rate,
                "Congestion detected"
            );
        } else {
            info!(
                event = "port_state",
                node = %self.node_name,
                port = %port,
                state = %state,
                utilization = utilization,
                growth_rate = growth_rate,
                "Port state"
            );
        }
    }

    /// Log a predicted congestion from the EWMA classifier
    pub fn log_congestion_predicted(&self, port: &PortKey, ewma: f64, threshold: f64) {
        warn!(
            event = "congestion_predicted",
            node = %self.node_name,
            port = %port,
            ewma = ewma,
            threshold = threshold,
            "Congestion predicted"
        );
    }

    pub fn log_reroute_installed(&self, device: &str, in_port: &str, out_port: &str) {
        info!(
            event = "reroute_installed",
            node = %self.node_name,
            device = %device,
            in_port = %in_port,
            out_port = %out_port,
            "Reroute flow rule installed"
        );
    }

    pub fn log_reroute_failed(&self, device: &str, reason: &str) {
        warn!(
            event = "reroute_failed",
            node = %self.node_name,
            device = %device,
            reason = %reason,
            "Reroute flow rule not installed, latch left clear"
        );
    }

    pub fn log_mode_changed(&self, previous: &OperatingMode, current: &OperatingMode) {
        info!(
            event = "mode_changed",
            node = %self.node_name,
            previous = %previous,
            current = %current,
            "Operating mode changed"
        );
    }

    pub fn log_window_armed(&self, device: &str, window_secs: f64) {
        info!(
            event = "window_armed",
            node = %self.node_name,
            device = %device,
            window_secs = window_secs,
            "Measurement window armed"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, loops: &[&str]) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            loops = ?loops,
            "Flowguard agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Flowguard agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = FlowguardMetrics::new();
        let other = metrics.clone();

        metrics.inc_ticks("detector");
        other.inc_ticks("detector");
        metrics.observe_tick_latency("detector", 0.01);
        metrics.set_port_reading("predictor", &PortKey::new("of:1", "2"), 0.5, 0.4);
        metrics.set_mode(&OperatingMode::Proposed);
        metrics.set_window_samples(3);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "flowguard_ticks_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
    }
}
