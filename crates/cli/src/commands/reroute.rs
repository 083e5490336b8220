//! Reroute notification and measurement window

use crate::client::{ApiClient, RerouteRequest, RerouteResponse, WindowStatus};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct WindowRow {
    #[tabled(rename = "Open")]
    open: String,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Mean (Mbps)")]
    mean: String,
    #[tabled(rename = "Fired At")]
    fired_at: String,
    #[tabled(rename = "Trigger")]
    trigger: String,
}

impl From<&WindowStatus> for WindowRow {
    fn from(status: &WindowStatus) -> Self {
        Self {
            open: if status.open { "yes" } else { "no" }.to_string(),
            samples: status.samples,
            mean: status
                .mean
                .map(|m| format!("{:.2}", m))
                .unwrap_or_else(|| "-".to_string()),
            fired_at: status
                .fired_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            trigger: status
                .trigger
                .as_ref()
                .map(|t| format!("{} {} -> {}", t.device, t.in_port, t.out_port))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Tell the agent a reroute happened so it starts measuring
pub async fn notify(
    client: &ApiClient,
    device: &str,
    in_port: &str,
    out_port: &str,
    format: OutputFormat,
) -> Result<()> {
    let request = RerouteRequest {
        device: device.to_string(),
        in_port: in_port.to_string(),
        out_port: out_port.to_string(),
    };
    let response: RerouteResponse = client.post("api/reroute", &request).await?;

    match format {
        OutputFormat::Json => output::print_json(&response),
        OutputFormat::Table => {
            output::print_success(&format!(
                "Measurement window armed for {} ({} -> {})",
                device, in_port, out_port
            ));
            output::print_table(&[WindowRow::from(&response.window)], format);
        }
    }
    Ok(())
}

pub async fn show_window(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: WindowStatus = client.get("api/window").await?;

    match format {
        OutputFormat::Json => output::print_json(&status),
        OutputFormat::Table => {
            if status.fired_at.is_none() {
                output::print_info("No reroute recorded");
                return Ok(());
            }
            output::print_table(&[WindowRow::from(&status)], format);
        }
    }
    Ok(())
}
