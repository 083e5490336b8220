//! HTTP client for the controller's REST API
//!
//! Every call carries a short request timeout and HTTP basic credentials.
//! A timeout or connection failure is returned as a [`ControllerError`] so
//! the calling loop can skip its tick instead of crashing.

use super::{FlowRule, NetworkController};
use crate::error::{ControllerError, ControllerResult};
use crate::models::{Device, DevicePortStats, Link};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Configuration for the controller client
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// REST base URL (e.g., "http://127.0.0.1:8181/onos/v1")
    pub base_url: String,
    /// Basic auth user
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8181/onos/v1".to_string(),
            username: "onos".to_string(),
            password: "rocks".to_string(),
            request_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatisticsResponse {
    #[serde(default)]
    statistics: Vec<DevicePortStats>,
}

#[derive(Debug, Default, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug, Default, Deserialize)]
struct LinksResponse {
    #[serde(default)]
    links: Vec<Link>,
}

/// REST client for the network controller
pub struct ControllerClient {
    client: Client,
    base_url: Url,
    config: ControllerConfig,
}

impl ControllerClient {
    /// Create a new client; fails only on a malformed base URL
    pub fn new(config: ControllerConfig) -> ControllerResult<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Get the base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the request timeout
    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    fn endpoint(&self, path: &str) -> ControllerResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ControllerResult<T> {
        let url = self.endpoint(path)?;

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControllerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ControllerError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NetworkController for ControllerClient {
    async fn port_statistics(&self) -> ControllerResult<Vec<DevicePortStats>> {
        let response: StatisticsResponse = self.get_json("statistics/ports").await?;
        Ok(response.statistics)
    }

    async fn devices(&self) -> ControllerResult<Vec<Device>> {
        let response: DevicesResponse = self.get_json("devices").await?;
        Ok(response.devices)
    }

    async fn links(&self) -> ControllerResult<Vec<Link>> {
        let response: LinksResponse = self.get_json("links").await?;
        Ok(response.links)
    }

    async fn flow_count(&self) -> ControllerResult<usize> {
        let value: serde_json::Value = self.get_json("flows").await?;
        Ok(count_flows(&value))
    }

    async fn install_flow(&self, rule: &FlowRule) -> ControllerResult<()> {
        let url = self.endpoint(&format!("flows/{}", rule.device_id))?;

        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(rule)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ControllerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            device = %rule.device_id,
            status = status.as_u16(),
            "Flow rule installed"
        );
        Ok(())
    }
}

/// Count flows in either `{flows: [...]}`, a device → flows mapping, or a bare list
fn count_flows(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Array(items) => items.len(),
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::Array(flows)) = map.get("flows") {
                return flows.len();
            }
            map.values()
                .filter_map(|v| v.as_array())
                .map(|flows| flows.len())
                .sum()
        }
        _ => {
            debug!("Unrecognised flow listing shape");
            0
        }
    }
}

/// Builder for ControllerClient configuration
pub struct ControllerClientBuilder {
    config: ControllerConfig,
}

impl ControllerClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = password.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> ControllerResult<ControllerClient> {
        ControllerClient::new(self.config)
    }
}

impl Default for ControllerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
