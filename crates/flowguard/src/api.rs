//! HTTP API: reporting surface, operating mode, reroute notifications,
//! health checks and Prometheus metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use flowguard_lib::{
    health::{components, ComponentStatus, HealthRegistry, DEFAULT_DEGRADED_AFTER},
    monitor::MonitoringService,
    observability::FlowguardMetrics,
    OperatingMode, RerouteNotice,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: FlowguardMetrics,
    pub monitor: Arc<MonitoringService>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: FlowguardMetrics,
        monitor: Arc<MonitoringService>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            monitor,
        }
    }
}

#[derive(Debug, Serialize)]
struct ModeResponse {
    mode: OperatingMode,
    /// Advances on every mode change
    session: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<OperatingMode>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Sample the controller and return the aggregate report
async fn api_metrics(State(state): State<Arc<AppState>>) -> Response {
    let result = state.monitor.sample().await;
    state
        .health_registry
        .record_result(components::REPORTING, &result, DEFAULT_DEGRADED_AFTER)
        .await;

    match result {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            warn!(error = %e, "Metrics sample failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

async fn get_mode(State(state): State<Arc<AppState>>) -> Json<ModeResponse> {
    let status = state.monitor.mode_status().await;
    Json(ModeResponse {
        mode: status.mode,
        session: status.session,
        previous: None,
    })
}

async fn set_mode(
    State(state): State<Arc<AppState>>,
    Path(mode): Path<String>,
) -> Json<ModeResponse> {
    let mode: OperatingMode = mode.into();
    let previous = state.monitor.set_mode(mode).await;
    let status = state.monitor.mode_status().await;
    Json(ModeResponse {
        mode: status.mode,
        session: status.session,
        previous: Some(previous),
    })
}

/// Arm the measurement window
async fn reroute(
    State(state): State<Arc<AppState>>,
    Json(notice): Json<RerouteNotice>,
) -> impl IntoResponse {
    let status = state.monitor.notify_reroute(notice, Utc::now()).await;
    Json(json!({
        "status": "measuring",
        "started": status.fired_at,
        "window": status,
    }))
}

async fn window(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.window_status(Utc::now()).await)
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/metrics", get(api_metrics))
        .route("/api/mode", get(get_mode))
        .route("/api/mode/:mode", get(set_mode).post(set_mode))
        .route("/api/reroute", post(reroute))
        .route("/api/window", get(window))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until the shutdown broadcast fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use flowguard_lib::controller::{async_trait, FlowRule, NetworkController};
    use flowguard_lib::monitor::ReportingConfig;
    use flowguard_lib::{
        ControllerError, ControllerResult, Device, DevicePortStats, Link, PortCounter,
    };
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use tower::ServiceExt;

    /// Controller whose single port grows by 25 MB per call
    struct StubController {
        bytes: AtomicU64,
        down: AtomicBool,
    }

    #[async_trait]
    impl NetworkController for StubController {
        async fn port_statistics(&self) -> ControllerResult<Vec<DevicePortStats>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ControllerError::Timeout("statistics/ports".to_string()));
            }
            let bytes = self.bytes.fetch_add(25_000_000, Ordering::SeqCst);
            Ok(vec![DevicePortStats {
                device: "of:1".to_string(),
                ports: vec![PortCounter {
                    port: "1".to_string(),
                    bytes_sent: bytes,
                }],
            }])
        }

        async fn devices(&self) -> ControllerResult<Vec<Device>> {
            Ok(vec![])
        }

        async fn links(&self) -> ControllerResult<Vec<Link>> {
            Ok(vec![])
        }

        async fn flow_count(&self) -> ControllerResult<usize> {
            Ok(7)
        }

        async fn install_flow(&self, _rule: &FlowRule) -> ControllerResult<()> {
            Ok(())
        }
    }

    async fn setup_test_app() -> (Router, Arc<AppState>, Arc<StubController>) {
        let health_registry = HealthRegistry::new();
        health_registry.register(components::DETECTOR).await;
        health_registry.register(components::REROUTER).await;
        health_registry.register(components::CONTROLLER).await;
        health_registry.register(components::REPORTING).await;

        let controller = Arc::new(StubController {
            bytes: AtomicU64::new(0),
            down: AtomicBool::new(false),
        });
        let monitor = Arc::new(
            MonitoringService::new(controller.clone(), ReportingConfig::default())
                .with_health(health_registry.clone()),
        );
        let state = Arc::new(AppState::new(
            health_registry,
            FlowguardMetrics::new(),
            monitor,
        ));
        (create_router(state.clone()), state, controller)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_report_shape() {
        let (app, _state, _controller) = setup_test_app().await;

        let response = app.oneshot(get_req("/api/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report = body_json(response).await;
        assert_eq!(report["throughput"], 0.0);
        assert_eq!(report["state"], "SAFE");
        assert_eq!(report["mode"], "baseline");
        assert_eq!(report["flows"], 7);
        assert_eq!(report["measuring_reroute"], false);
        assert!(report["top_ports"].is_array());
    }

    #[tokio::test]
    async fn test_metrics_502_when_controller_down() {
        let (app, _state, controller) = setup_test_app().await;
        controller.down.store(true, Ordering::SeqCst);

        let response = app.oneshot(get_req("/api/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_failed_reporting_degrades_health() {
        let (app, state, controller) = setup_test_app().await;
        controller.down.store(true, Ordering::SeqCst);

        for _ in 0..DEFAULT_DEGRADED_AFTER {
            let response = app.clone().oneshot(get_req("/api/metrics")).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
        let health = body_json(app.clone().oneshot(get_req("/healthz")).await.unwrap()).await;
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["components"]["reporting"]["status"], "degraded");
        assert_eq!(health["components"]["controller"]["status"], "degraded");

        controller.down.store(false, Ordering::SeqCst);
        let response = app.oneshot(get_req("/api/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = state.health_registry.health().await;
        assert_eq!(
            report.components[components::REPORTING].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_mode_switch_round_trip() {
        let (app, state, _controller) = setup_test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/mode/proposed")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["mode"], "proposed");
        assert_eq!(body["previous"], "baseline");
        assert_eq!(body["session"], 1);

        let body = body_json(app.clone().oneshot(get_req("/api/mode")).await.unwrap()).await;
        assert_eq!(body["mode"], "proposed");
        assert_eq!(body["session"], 1);

        // Plain GET also switches, and unknown labels are kept
        let body = body_json(app.oneshot(get_req("/api/mode/algo1")).await.unwrap()).await;
        assert_eq!(body["mode"], "algo1");
        assert_eq!(
            state.monitor.mode().await,
            OperatingMode::Other("algo1".to_string())
        );
    }

    #[tokio::test]
    async fn test_reroute_arms_window() {
        let (app, _state, _controller) = setup_test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/reroute")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"device":"of:1","in_port":1,"out_port":"2"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "measuring");
        assert!(body["started"].is_string());
        assert_eq!(body["window"]["trigger"]["in_port"], "1");

        let window = body_json(app.oneshot(get_req("/api/window")).await.unwrap()).await;
        assert_eq!(window["open"], true);
        assert_eq!(window["samples"], 0);
    }

    #[tokio::test]
    async fn test_reroute_rejects_bad_body() {
        let (app, _state, _controller) = setup_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/reroute")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"device":"of:1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_healthz_degraded_still_ok() {
        let (app, state, _controller) = setup_test_app().await;
        state
            .health_registry
            .set_degraded(components::REROUTER, "controller timeout")
            .await;

        let response = app.oneshot(get_req("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health = body_json(response).await;
        assert_eq!(health["status"], "degraded");
        assert!(health["components"]["detector"].is_object());
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_unhealthy() {
        let (app, state, _controller) = setup_test_app().await;
        state
            .health_registry
            .set_unhealthy(components::CONTROLLER, "Invalid base URL")
            .await;

        let response = app.oneshot(get_req("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_tracks_readiness() {
        let (app, state, _controller) = setup_test_app().await;

        let response = app.clone().oneshot(get_req("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.health_registry.set_ready(true).await;
        let response = app.oneshot(get_req("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["ready"], true);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_returns_prometheus_format() {
        let (app, state, _controller) = setup_test_app().await;
        state.metrics.inc_ticks(components::DETECTOR);
        state.metrics.set_mode(&OperatingMode::Proposed);

        let response = app.oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("flowguard_ticks_total"));
        assert!(text.contains("flowguard_operating_mode_info"));
    }
}
