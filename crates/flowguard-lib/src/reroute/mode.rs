//! Operating-mode sources for the reroute gate

use crate::models::OperatingMode;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Current mode and the number of mode changes seen so far
///
/// `session` advances on every change, so a reader that polls less often
/// than the mode flips can still tell that active control was left.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeStatus {
    #[serde(default)]
    pub mode: OperatingMode,
    #[serde(default)]
    pub session: u64,
}

impl ModeStatus {
    pub fn new(mode: OperatingMode, session: u64) -> Self {
        Self { mode, session }
    }
}

/// Where the rerouter learns whether it may act
#[async_trait]
pub trait ModeSource: Send + Sync {
    async fn current_mode(&self) -> Result<ModeStatus>;
}

/// Reads the mode from a reporting endpoint whose JSON body carries `mode`
///
/// Works against both `/api/mode` and `/api/metrics`. A body without `mode`
/// is read as baseline, one without `session` as session 0.
pub struct HttpModeSource {
    client: Client,
    url: Url,
}

impl HttpModeSource {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid mode URL: {}", url))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ModeSource for HttpModeSource {
    async fn current_mode(&self) -> Result<ModeStatus> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("Failed to reach mode source")?;

        if !response.status().is_success() {
            anyhow::bail!("Mode source returned {}", response.status());
        }

        response.json().await.context("Failed to parse mode")
    }
}
