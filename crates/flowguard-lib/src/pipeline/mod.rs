//! Periodic telemetry-to-decision loops
//!
//! Each loop is a [`PollTask`] driven by the generic [`PollLoop`]. Loops keep
//! their own [`PortTracker`](crate::telemetry::PortTracker) and never share
//! per-port state with each other.

mod detector;
mod r#loop;
mod predictor;

pub use detector::CongestionDetector;
pub use predictor::CongestionPredictor;
pub use r#loop::{PollConfig, PollLoop};

use crate::controller::NetworkController;
use crate::error::ControllerResult;
use crate::health::{components, HealthRegistry, DEFAULT_DEGRADED_AFTER};
use crate::models::{PortKey, TrafficState};
use crate::observability::FlowguardMetrics;
use crate::telemetry::{Observation, PortReading, PortTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Ports were evaluated; `flagged` of them were in a congestion state
    Completed { ports: usize, flagged: usize },
    /// Nothing to do this tick (e.g. mode gate closed)
    Inactive,
    /// Tick skipped; the loop keeps running
    Failed(String),
}

/// One periodic unit of work
#[async_trait]
pub trait PollTask: Send + Sync {
    /// Name used in logs, metrics and health
    fn name(&self) -> &'static str;

    async fn tick(&self) -> TickOutcome;
}

/// Classification of one measured port
#[derive(Debug, Clone, PartialEq)]
pub struct PortVerdict {
    pub port: PortKey,
    pub state: TrafficState,
    pub reading: PortReading,
}

impl PortVerdict {
    pub fn is_congestion(&self) -> bool {
        self.state.is_congestion()
    }
}

/// Fetch the controller's counters and feed them through a tracker
///
/// The fetch result is reported against the `controller` health component.
pub(crate) async fn sample_ports(
    controller: &dyn NetworkController,
    tracker: &PortTracker,
    metrics: &FlowguardMetrics,
    health: Option<&HealthRegistry>,
    now: DateTime<Utc>,
) -> ControllerResult<Vec<(PortKey, Observation)>> {
    let result = controller.port_statistics().await;
    if let Some(health) = health {
        health
            .record_result(components::CONTROLLER, &result, DEFAULT_DEGRADED_AFTER)
            .await;
    }
    let stats = result.map_err(|e| {
        metrics.inc_controller_errors();
        e
    })?;

    let observations = tracker.observe_all(&stats, now);
    for (_, observation) in &observations {
        if matches!(observation, Observation::CounterReset) {
            metrics.inc_counter_resets();
        }
    }
    Ok(observations)
}

/// Last reported state per port, for logging only on transitions
#[derive(Debug, Default)]
pub(crate) struct TransitionLog {
    states: DashMap<PortKey, TrafficState>,
}

impl TransitionLog {
    /// Record `state`; true when it differs from the previous one
    pub(crate) fn changed(&self, port: &PortKey, state: TrafficState) -> bool {
        match self.states.insert(port.clone(), state) {
            Some(previous) => previous != state,
            None => true,
        }
    }
}
