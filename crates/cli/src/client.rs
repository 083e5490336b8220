//! API client for the flowguard reporting API

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// API client for the agent's reporting endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        // Without a trailing slash `join` would replace the last path segment
        let mut base_url = Url::parse(base_url).context("Invalid API URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request without a body
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types. States and modes stay plain strings so the CLI keeps
// working against agents that report labels it does not know about.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub timestamp: DateTime<Utc>,
    pub throughput: f64,
    pub throughput_baseline: f64,
    pub throughput_proposed: f64,
    pub utilization: f64,
    pub ewma: f64,
    pub ewma_percent: f64,
    pub state: String,
    pub mode: String,
    #[serde(default)]
    pub measuring_reroute: bool,
    #[serde(default)]
    pub proposed_samples: usize,
    #[serde(default)]
    pub reroute_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub flows: usize,
    #[serde(default)]
    pub top_ports: Vec<PortUtilization>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortUtilization {
    pub port: String,
    pub utilization: f64,
    pub rate_bps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeResponse {
    pub mode: String,
    #[serde(default)]
    pub session: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerouteRequest {
    pub device: String,
    pub in_port: String,
    pub out_port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerouteNotice {
    pub device: String,
    pub in_port: String,
    pub out_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStatus {
    pub open: bool,
    pub samples: usize,
    pub fired_at: Option<DateTime<Utc>>,
    pub mean: Option<f64>,
    pub trigger: Option<RerouteNotice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerouteResponse {
    pub status: String,
    pub started: Option<DateTime<Utc>>,
    pub window: WindowStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn sample_report() -> serde_json::Value {
        json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "throughput": 42.5,
            "throughput_baseline": 42.5,
            "throughput_proposed": 40.0,
            "utilization": 0.425,
            "ewma": 0.41,
            "ewma_percent": 41.0,
            "state": "SAFE",
            "mode": "proposed",
            "measuring_reroute": true,
            "proposed_samples": 2,
            "reroute_since": "2026-01-01T00:00:00Z",
            "flows": 7,
            "top_ports": [{"port": "of:1:1", "utilization": 0.4, "rate_bps": 40000000}]
        })
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = ApiClient::new("http://localhost:5000/agent").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:5000/agent/");
        assert_eq!(
            client.base_url().join("api/metrics").unwrap().as_str(),
            "http://localhost:5000/agent/api/metrics"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_get_metrics() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/metrics")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(sample_report().to_string())
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let report: MetricsReport = client.get("api/metrics").await.unwrap();
        mock.assert_async().await;

        assert_eq!(report.state, "SAFE");
        assert_eq!(report.mode, "proposed");
        assert_eq!(report.flows, 7);
        assert_eq!(report.top_ports[0].rate_bps, 40_000_000);
    }

    #[tokio::test]
    async fn test_error_status_surfaces_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/metrics")
            .with_status(502)
            .with_body(r#"{"error":"controller unreachable"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.get::<MetricsReport>("api/metrics").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("502"));
        assert!(message.contains("controller unreachable"));
    }

    #[tokio::test]
    async fn test_post_reroute_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/reroute")
            .match_body(Matcher::Json(json!({
                "device": "of:1",
                "in_port": "1",
                "out_port": "2"
            })))
            .with_status(200)
            .with_body(
                json!({
                    "status": "measuring",
                    "started": "2026-01-01T00:00:00Z",
                    "window": {
                        "open": true,
                        "samples": 0,
                        "fired_at": "2026-01-01T00:00:00Z",
                        "mean": null,
                        "trigger": {"device": "of:1", "in_port": "1", "out_port": "2"}
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = RerouteRequest {
            device: "of:1".to_string(),
            in_port: "1".to_string(),
            out_port: "2".to_string(),
        };
        let response: RerouteResponse = client.post("api/reroute", &request).await.unwrap();
        mock.assert_async().await;

        assert_eq!(response.status, "measuring");
        assert!(response.window.open);
        assert_eq!(response.window.trigger.unwrap().out_port, "2");
    }

    #[tokio::test]
    async fn test_post_empty_mode() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/mode/proposed")
            .with_status(200)
            .with_body(r#"{"mode":"proposed","session":3,"previous":"baseline"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response: ModeResponse = client.post_empty("api/mode/proposed").await.unwrap();
        assert_eq!(response.mode, "proposed");
        assert_eq!(response.previous.as_deref(), Some("baseline"));
        assert_eq!(response.session, 3);
    }
}
