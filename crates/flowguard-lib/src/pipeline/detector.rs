//! Threshold congestion detector
//!
//! Classifies every active port from its instantaneous utilization and
//! utilization growth rate.

use super::{sample_ports, PollTask, PortVerdict, TickOutcome, TransitionLog};
use crate::classifier::CongestionThresholds;
use crate::controller::NetworkController;
use crate::error::ControllerResult;
use crate::health::{components, HealthRegistry};
use crate::observability::{FlowguardMetrics, StructuredLogger};
use crate::telemetry::{EstimatorConfig, PortTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub struct CongestionDetector {
    controller: Arc<dyn NetworkController>,
    tracker: PortTracker,
    thresholds: CongestionThresholds,
    transitions: TransitionLog,
    metrics: FlowguardMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl CongestionDetector {
    pub fn new(
        controller: Arc<dyn NetworkController>,
        estimator: EstimatorConfig,
        thresholds: CongestionThresholds,
    ) -> Self {
        Self {
            controller,
            tracker: PortTracker::new(estimator),
            thresholds,
            transitions: TransitionLog::default(),
            metrics: FlowguardMetrics::new(),
            logger: StructuredLogger::new("flowguard"),
            health: None,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Sample once and classify every port that carried traffic
    pub async fn evaluate(&self, now: DateTime<Utc>) -> ControllerResult<Vec<PortVerdict>> {
        let observations = sample_ports(
            self.controller.as_ref(),
            &self.tracker,
            &self.metrics,
            self.health.as_ref(),
            now,
        )
        .await?;

        let mut verdicts = Vec::new();
        for (port, observation) in observations {
            let Some(reading) = observation.reading().copied() else {
                debug!(port = %port, ?observation, "Port not classified this tick");
                continue;
            };

            let state = self
                .thresholds
                .classify(reading.utilization, reading.growth_rate);
            self.metrics.set_port_reading(
                components::DETECTOR,
                &port,
                reading.utilization,
                reading.ewma,
            );
            if self.transitions.changed(&port, state) {
                self.logger
                    .log_port_state(&port, state, reading.utilization, reading.growth_rate);
            }

            verdicts.push(PortVerdict {
                port,
                state,
                reading,
            });
        }
        Ok(verdicts)
    }
}

#[async_trait]
impl PollTask for CongestionDetector {
    fn name(&self) -> &'static str {
        components::DETECTOR
    }

    async fn tick(&self) -> TickOutcome {
        match self.evaluate(Utc::now()).await {
            Ok(verdicts) => TickOutcome::Completed {
                ports: verdicts.len(),
                flagged: verdicts.iter().filter(|v| v.is_congestion()).count(),
            },
            Err(e) => TickOutcome::Failed(e.to_string()),
        }
    }
}
