//! Flowguard agent
//!
//! Polls the network controller's port counters, detects and predicts
//! congestion, installs a one-shot reroute in proposed mode, and serves the
//! reporting API.

use anyhow::{Context, Result};
use flowguard_lib::{
    classifier::PredictionThresholds,
    controller::{ControllerClient, NetworkController},
    health::{components, HealthRegistry},
    monitor::MonitoringService,
    observability::{FlowguardMetrics, StructuredLogger},
    pipeline::{CongestionDetector, CongestionPredictor, PollLoop},
    reroute::{HttpModeSource, HttpRerouteNotifier, ModeSource, RerouteNotifier, Rerouter},
    OperatingMode,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting flowguard");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        controller = %config.controller.base_url,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CONTROLLER).await;
    health_registry.register(components::REPORTING).await;

    let metrics = FlowguardMetrics::new();
    metrics.set_mode(&OperatingMode::Baseline);

    let logger = StructuredLogger::new(&config.node_name);

    let controller: Arc<dyn NetworkController> = Arc::new(
        ControllerClient::new(config.controller.client_config())
            .context("Invalid controller configuration")?,
    );

    let monitor = Arc::new(
        MonitoringService::new(controller.clone(), config.reporting.reporting_config())
            .with_logger(logger.clone())
            .with_health(health_registry.clone()),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut loops = Vec::new();
    let mut handles = Vec::new();

    if config.detector.enabled {
        health_registry.register(components::DETECTOR).await;
        let detector = CongestionDetector::new(
            controller.clone(),
            config.detector.estimator(),
            config.detector.thresholds(),
        )
        .with_logger(logger.clone())
        .with_health(health_registry.clone());
        let poll = PollLoop::new(Arc::new(detector), config.poll_config(config.detector.interval_secs))
            .with_health(health_registry.clone());
        handles.push(tokio::spawn(poll.run(shutdown_tx.subscribe())));
        loops.push(components::DETECTOR);
    }

    if config.predictor.enabled {
        health_registry.register(components::PREDICTOR).await;
        let predictor = CongestionPredictor::new(
            controller.clone(),
            config.predictor.estimator(),
            PredictionThresholds::single(config.predictor.threshold),
        )
        .with_logger(logger.clone())
        .with_health(health_registry.clone());
        let poll = PollLoop::new(
            Arc::new(predictor),
            config.poll_config(config.predictor.interval_secs),
        )
        .with_health(health_registry.clone());
        handles.push(tokio::spawn(poll.run(shutdown_tx.subscribe())));
        loops.push(components::PREDICTOR);
    }

    if config.rerouter.enabled {
        health_registry.register(components::REROUTER).await;
        let timeout = config.rerouter.notify_timeout();

        let mode_source: Arc<dyn ModeSource> = match &config.rerouter.mode_url {
            Some(url) => Arc::new(HttpModeSource::new(url, timeout)?),
            None => monitor.clone(),
        };
        let notifier: Arc<dyn RerouteNotifier> = match &config.rerouter.notify_url {
            Some(url) => Arc::new(HttpRerouteNotifier::new(url, timeout)?),
            None => monitor.clone(),
        };

        let rerouter = Rerouter::new(
            controller.clone(),
            mode_source,
            notifier,
            config.rerouter.reroute_config(),
        )
        .with_logger(logger.clone())
        .with_health(health_registry.clone());
        let poll = PollLoop::new(
            Arc::new(rerouter),
            config.poll_config(config.rerouter.interval_secs),
        )
        .with_health(health_registry.clone());
        handles.push(tokio::spawn(poll.run(shutdown_tx.subscribe())));
        loops.push(components::REROUTER);
    }

    logger.log_startup(AGENT_VERSION, &loops);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        monitor,
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // Receivers may already be gone if a task exited early
    let _ = shutdown_tx.send(());

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Polling loop ended abnormally");
        }
    }
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "API server stopped with error"),
        Err(e) => warn!(error = %e, "API server task panicked"),
    }

    info!("Shutdown complete");
    Ok(())
}
