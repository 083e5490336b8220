//! Operating mode commands

use crate::client::{ApiClient, ModeResponse};
use crate::output::{self, color_mode, OutputFormat};
use anyhow::Result;

pub async fn get_mode(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response: ModeResponse = client.get("api/mode").await?;

    match format {
        OutputFormat::Json => output::print_json(&response),
        OutputFormat::Table => output::print_info(&format!("Mode: {}", color_mode(&response.mode))),
    }
    Ok(())
}

/// Switch the agent's operating mode. Only `proposed` lets the rerouter act.
pub async fn set_mode(client: &ApiClient, mode: &str, format: OutputFormat) -> Result<()> {
    let mode = mode.trim().to_lowercase();
    if mode.is_empty() || mode.contains('/') {
        anyhow::bail!("Invalid mode label: {:?}", mode);
    }

    let response: ModeResponse = client.post_empty(&format!("api/mode/{}", mode)).await?;

    match format {
        OutputFormat::Json => output::print_json(&response),
        OutputFormat::Table => {
            let previous = response.previous.as_deref().unwrap_or("unknown");
            if previous == response.mode {
                output::print_info(&format!("Mode already {}", color_mode(&response.mode)));
            } else {
                output::print_success(&format!(
                    "Mode changed: {} -> {}",
                    color_mode(previous),
                    color_mode(&response.mode)
                ));
            }
            if response.mode != "proposed" {
                output::print_warning("Rerouting is disabled outside proposed mode");
            }
        }
    }
    Ok(())
}
