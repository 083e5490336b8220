//! Traffic state classification
//!
//! Both policies are pure functions of the current tick's inputs. There is
//! no debounce stage; flap avoidance comes only from EWMA smoothing and the
//! chosen thresholds.

use crate::models::TrafficState;
use serde::{Deserialize, Serialize};

/// Thresholds for the instantaneous+growth classifier used by the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CongestionThresholds {
    /// Utilization at or above which a link is congested
    pub u_high: f64,
    /// Utilization at or above which fast growth means potential congestion
    pub u_mid: f64,
    /// Growth rate (fraction of capacity per second) considered fast
    pub g_high: f64,
}

impl Default for CongestionThresholds {
    fn default() -> Self {
        Self {
            u_high: 0.8,
            u_mid: 0.6,
            g_high: 0.08,
        }
    }
}

impl CongestionThresholds {
    /// Classify one port from its instantaneous utilization and growth rate
    ///
    /// A fast-rising link below `u_mid` is reported as `Congested`, not
    /// `PotentialCongestion`: growth alone counts as saturation evidence.
    pub fn classify(&self, utilization: f64, growth_rate: f64) -> TrafficState {
        if utilization >= self.u_high {
            TrafficState::Congested
        } else if utilization >= self.u_mid && growth_rate > self.g_high {
            TrafficState::PotentialCongestion
        } else if growth_rate > self.g_high {
            TrafficState::Congested
        } else {
            TrafficState::Normal
        }
    }
}

/// Default cut for the per-port predictive classifier
pub const DEFAULT_PREDICTED_THRESHOLD: f64 = 0.75;

/// Thresholds for the EWMA-based predictive classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionThresholds {
    /// EWMA at or above which congestion is predicted
    pub predicted: f64,
    /// Optional higher tier reported as already congested
    pub congested: Option<f64>,
}

impl PredictionThresholds {
    /// `PredictedCongestion` / `Safe`, as used by the predictor and rerouter
    pub fn single(predicted: f64) -> Self {
        Self {
            predicted,
            congested: None,
        }
    }

    /// `Congested` / `PredictedCongestion` / `Safe`, as used by the aggregate report
    pub fn two_tier(congested: f64, predicted: f64) -> Self {
        Self {
            predicted,
            congested: Some(congested),
        }
    }

    pub fn classify(&self, ewma: f64) -> TrafficState {
        match self.congested {
            Some(congested) if ewma >= congested => TrafficState::Congested,
            _ if ewma >= self.predicted => TrafficState::PredictedCongestion,
            _ => TrafficState::Safe,
        }
    }
}

impl Default for PredictionThresholds {
    fn default() -> Self {
        Self::single(DEFAULT_PREDICTED_THRESHOLD)
    }
}
