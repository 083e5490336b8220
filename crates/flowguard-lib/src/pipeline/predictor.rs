//! EWMA congestion predictor
//!
//! Flags a port once its smoothed utilization crosses the predicted
//! threshold, before the instantaneous rule would call it congested.

use super::{sample_ports, PollTask, PortVerdict, TickOutcome, TransitionLog};
use crate::classifier::PredictionThresholds;
use crate::controller::NetworkController;
use crate::error::ControllerResult;
use crate::health::{components, HealthRegistry};
use crate::models::TrafficState;
use crate::observability::{FlowguardMetrics, StructuredLogger};
use crate::telemetry::{EstimatorConfig, PortTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

pub struct CongestionPredictor {
    controller: Arc<dyn NetworkController>,
    tracker: PortTracker,
    thresholds: PredictionThresholds,
    transitions: TransitionLog,
    metrics: FlowguardMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl CongestionPredictor {
    pub fn new(
        controller: Arc<dyn NetworkController>,
        estimator: EstimatorConfig,
        thresholds: PredictionThresholds,
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
                continue;
            };

            let state = self.thresholds.classify(reading.ewma);
            self.metrics.set_port_reading(
                components::PREDICTOR,
                &port,
                reading.utilization,
                reading.ewma,
            );

            if self.transitions.changed(&port, state) {
                if state == TrafficState::PredictedCongestion {
                    self.logger
                        .log_congestion_predicted(&port, reading.ewma, self.thresholds.predicted);
                } else {
                    info!(
                        port = %port,
                        state = %state,
                        ewma = reading.ewma,
                        "Predicted state changed"
                    );
                }
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
impl PollTask for CongestionPredictor {
    fn name(&self) -> &'static str {
        components::PREDICTOR
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockController;
    use chrono::TimeZone;

    const MB: u64 = 1_000_000;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_prediction_follows_smoothed_utilization() {
        let controller = Arc::new(MockController::new());
        let predictor = CongestionPredictor::new(
            controller.clone(),
            EstimatorConfig {
                link_capacity_bps: 100_000_000.0,
                min_traffic_bps: 1_000_000.0,
                alpha: 0.6,
            },
            PredictionThresholds::default(),
        );

        controller.set_counters("of:1", &[("3", 0)]);
        predictor.evaluate(at(0)).await.unwrap();

        // 10 MB in 2 s = 40 Mbps → u = 0.4, ewma seeded at 0.4
        controller.set_counters("of:1", &[("3", 10 * MB)]);
        let verdicts = predictor.evaluate(at(2)).await.unwrap();
        assert_eq!(verdicts[0].state, TrafficState::Safe);
        assert!((verdicts[0].reading.ewma - 0.4).abs() < 1e-9);

        // 25 MB in 2 s = 100 Mbps → u = 1.0, ewma = 0.6 + 0.16 = 0.76
        controller.set_counters("of:1", &[("3", 35 * MB)]);
        let verdicts = predictor.evaluate(at(4)).await.unwrap();
        assert_eq!(verdicts[0].state, TrafficState::PredictedCongestion);
        assert!((verdicts[0].reading.ewma - 0.76).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tick_reports_flagged_ports() {
        let controller = Arc::new(MockController::new());
        let predictor = CongestionPredictor::new(
            controller.clone(),
            EstimatorConfig {
                link_capacity_bps: 100_000_000.0,
                min_traffic_bps: 0.0,
                alpha: 1.0,
            },
            PredictionThresholds::default(),
        );

        controller.set_counters("of:1", &[("1", 0), ("2", 0)]);
        assert_eq!(
            predictor.tick().await,
            TickOutcome::Completed { ports: 0, flagged: 0 }
        );

        // Port 1 moves 10 MB within a few milliseconds, port 2 stays silent
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        controller.set_counters("of:1", &[("1", 10 * MB), ("2", 0)]);
        assert_eq!(
            predictor.tick().await,
            TickOutcome::Completed { ports: 2, flagged: 1 }
        );
    }
}
