//! Current throughput and port utilization

use crate::client::{ApiClient, MetricsReport};
use crate::output::{self, color_mode, color_state, format_percent, format_rate, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

#[derive(Tabled, Serialize)]
struct SummaryRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled, Serialize)]
struct PortRow {
    #[tabled(rename = "Port")]
    port: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
    #[tabled(rename = "Rate")]
    rate: String,
}

/// Show the latest aggregate sample
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: MetricsReport = client.get("api/metrics").await?;

    if let OutputFormat::Json = format {
        output::print_json(&report);
        return Ok(());
    }

    let mut rows = vec![
        row("State", color_state(&report.state)),
        row("Mode", color_mode(&report.mode)),
        row("Throughput", format!("{:.2} Mbps", report.throughput)),
        row("Utilization", format_percent(report.utilization)),
        row("EWMA", format!("{:.2}%", report.ewma_percent)),
        row("Flows", report.flows.to_string()),
    ];
    if report.measuring_reroute {
        rows.push(row(
            "Post-reroute mean",
            format!(
                "{:.2} Mbps ({} samples)",
                report.throughput_proposed, report.proposed_samples
            ),
        ));
    }
    if let Some(since) = report.reroute_since {
        rows.push(row("Rerouted at", since.to_rfc3339()));
    }
    rows.push(row("Sampled at", report.timestamp.to_rfc3339()));

    output::print_table(&rows, format);
    Ok(())
}

/// Show the busiest ports
pub async fn show_ports(client: &ApiClient, limit: Option<usize>, format: OutputFormat) -> Result<()> {
    let report: MetricsReport = client.get("api/metrics").await?;

    let take = limit.unwrap_or(report.top_ports.len());
    let ports = &report.top_ports[..take.min(report.top_ports.len())];

    if let OutputFormat::Json = format {
        output::print_json(ports);
        return Ok(());
    }

    let rows: Vec<PortRow> = ports
        .iter()
        .map(|p| PortRow {
            port: p.port.clone(),
            utilization: format_percent(p.utilization),
            rate: format_rate(p.rate_bps),
        })
        .collect();

    output::print_table(&rows, format);
    Ok(())
}

fn row(field: &str, value: String) -> SummaryRow {
    SummaryRow {
        field: field.to_string(),
        value,
    }
}
