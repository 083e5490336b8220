//! Generic polling loop
//!
//! Runs a [`PollTask`] on a fixed interval until the shutdown broadcast
//! fires. A tick that is still waiting on the controller when shutdown
//! arrives is abandoned rather than awaited.

use super::{PollTask, TickOutcome};
use crate::health::{HealthRegistry, DEFAULT_DEGRADED_AFTER};
use crate::observability::FlowguardMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for a polling loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between ticks (default: 2 seconds)
    pub interval: Duration,
    /// Failed ticks in a row before the loop reports itself degraded
    pub degraded_after: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }
}

/// Drives one task periodically
pub struct PollLoop {
    task: Arc<dyn PollTask>,
    config: PollConfig,
    health: Option<HealthRegistry>,
    metrics: FlowguardMetrics,
}

impl PollLoop {
    pub fn new(task: Arc<dyn PollTask>, config: PollConfig) -> Self {
        Self {
            task,
            config,
            health: None,
            metrics: FlowguardMetrics::new(),
        }
    }

    /// Report tick results to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until a shutdown message is received
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let name = self.task.name();
        info!(
            task = name,
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting polling loop"
        );

        // Second receiver so an in-flight tick can be raced against shutdown
        let mut cancel = shutdown.resubscribe();
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();

                    let outcome = tokio::select! {
                        outcome = self.task.tick() => Some(outcome),
                        _ = cancel.recv() => None,
                    };
                    let Some(outcome) = outcome else {
                        info!(task = name, "Shutdown during tick, abandoning it");
                        break;
                    };

                    tick_count += 1;
                    self.metrics
                        .observe_tick_latency(name, start.elapsed().as_secs_f64());
                    self.record(name, tick_count, outcome).await;
                }
                _ = shutdown.recv() => {
                    info!(task = name, "Shutting down polling loop");
                    break;
                }
            }
        }
    }

    async fn record(&self, name: &'static str, tick_count: u64, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Completed { ports, flagged } => {
                self.metrics.inc_ticks(name);
                debug!(task = name, tick = tick_count, ports, flagged, "Tick complete");
                if let Some(health) = &self.health {
                    health.record_success(name).await;
                }
            }
            TickOutcome::Inactive => {
                self.metrics.inc_ticks(name);
                debug!(task = name, tick = tick_count, "Tick inactive");
                if let Some(health) = &self.health {
                    health.record_success(name).await;
                }
            }
            TickOutcome::Failed(reason) => {
                self.metrics.inc_ticks_skipped(name);
                warn!(task = name, tick = tick_count, reason = %reason, "Tick skipped");
                if let Some(health) = &self.health {
                    health
                        .record_failure(name, reason, self.config.degraded_after)
                        .await;
                }
            }
        }
    }
}
