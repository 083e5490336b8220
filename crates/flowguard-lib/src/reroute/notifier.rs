//! "Reroute occurred" notifications

use crate::models::RerouteNotice;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Receiver of reroute events; arms the measurement window
#[async_trait]
pub trait RerouteNotifier: Send + Sync {
    async fn notify(&self, notice: &RerouteNotice) -> Result<()>;
}

/// Posts the notice as JSON to a reporting endpoint
pub struct HttpRerouteNotifier {
    client: Client,
    url: Url,
}

impl HttpRerouteNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid notify URL: {}", url))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RerouteNotifier for HttpRerouteNotifier {
    async fn notify(&self, notice: &RerouteNotice) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(notice)
            .send()
            .await
            .context("Failed to send reroute notification")?;

        if !response.status().is_success() {
            anyhow::bail!("Reroute notification rejected with {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_posts_notice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/reroute")
            .match_body(Matcher::PartialJson(json!({
                "device": "of:1",
                "in_port": "1",
                "out_port": "2"
            })))
            .with_status(200)
            .with_body(r#"{"status":"measuring"}"#)
            .create_async()
            .await;

        let notifier = HttpRerouteNotifier::new(
            &format!("{}/api/reroute", server.url()),
            Duration::from_secs(1),
        )
        .unwrap();

        let notice = RerouteNotice {
            device: "of:1".into(),
            in_port: "1".into(),
            out_port: "2".into(),
            fired_at: None,
        };
        notifier.notify(&notice).await.unwrap();
        mock.assert_async().await;
    }
}
