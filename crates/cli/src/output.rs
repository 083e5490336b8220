//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Parse the format stored in the config file
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a bit rate the way operators read link counters
pub fn format_rate(bps: u64) -> String {
    const KBPS: u64 = 1_000;
    const MBPS: u64 = KBPS * 1_000;
    const GBPS: u64 = MBPS * 1_000;

    if bps >= GBPS {
        format!("{:.2} Gb/s", bps as f64 / GBPS as f64)
    } else if bps >= MBPS {
        format!("{:.2} Mb/s", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{} kb/s", bps / KBPS)
    } else {
        format!("{} b/s", bps)
    }
}

/// Format a utilization fraction as percentage
pub fn format_percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Color traffic state by severity
pub fn color_state(state: &str) -> String {
    match state.to_uppercase().as_str() {
        "SAFE" | "NORMAL" => state.green().to_string(),
        "POTENTIAL_CONGESTION" | "PREDICTED_CONGESTION" => state.yellow().to_string(),
        "CONGESTED" => state.red().bold().to_string(),
        _ => state.to_string(),
    }
}

/// Color operating mode
pub fn color_mode(mode: &str) -> String {
    match mode {
        "proposed" => mode.cyan().bold().to_string(),
        "baseline" => mode.to_string(),
        _ => mode.magenta().to_string(),
    }
}
