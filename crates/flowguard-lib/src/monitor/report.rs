//! Reporting payloads

use crate::models::{OperatingMode, TrafficState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One aggregate metrics sample as served by `GET /api/metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub timestamp: DateTime<Utc>,
    /// Total throughput across all ports, Mbps
    pub throughput: f64,
    pub throughput_baseline: f64,
    /// Mean throughput measured since the last reroute, or the current value
    pub throughput_proposed: f64,
    /// Display utilization, capped
    pub utilization: f64,
    pub ewma: f64,
    pub ewma_percent: f64,
    pub state: TrafficState,
    pub mode: OperatingMode,
    pub measuring_reroute: bool,
    pub proposed_samples: usize,
    pub reroute_since: Option<DateTime<Utc>>,
    pub flows: usize,
    pub top_ports: Vec<PortUtilization>,
}

/// A port ranked by utilization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortUtilization {
    /// `device:port`
    pub port: String,
    pub utilization: f64,
    pub rate_bps: u64,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
