//! Flowguard CLI
//!
//! Queries a running flowguard agent: current congestion state, busiest
//! ports, operating mode, and the post-reroute measurement window.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{mode, reroute, status, watch};
use std::path::PathBuf;
use std::time::Duration;

/// Flowguard CLI
#[derive(Parser)]
#[command(name = "fgctl")]
#[command(author, version, about = "CLI for the Flowguard congestion agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via FGCTL_API_URL env var)
    #[arg(long, env = "FGCTL_API_URL")]
    pub api_url: Option<String>,

    /// Path to the CLI config file (defaults to ~/.config/fgctl/config.json)
    #[arg(long, env = "FGCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the latest throughput, state and mode
    Status,

    /// Show the busiest ports
    Ports {
        /// Number of ports to show
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// Inspect or change the operating mode
    #[command(subcommand)]
    Mode(ModeCommands),

    /// Reroute notification and measurement window
    #[command(subcommand)]
    Reroute(RerouteCommands),

    /// Poll the agent until traffic settles
    Watch {
        /// Seconds between polls
        #[arg(long, default_value = "2")]
        interval: u64,

        /// Exit after this many consecutive SAFE polls (0 never exits)
        #[arg(long)]
        safe_polls: Option<u32>,

        /// Stop after this many polls regardless of state
        #[arg(long)]
        max_polls: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum ModeCommands {
    /// Show the current mode
    Get,

    /// Set the mode (baseline, proposed, or a custom label)
    Set {
        /// Mode label
        mode: String,
    },
}

#[derive(Subcommand)]
pub enum RerouteCommands {
    /// Report a reroute and start the measurement window
    Notify {
        /// Device the flow rule was installed on
        #[arg(long)]
        device: String,

        /// Ingress port matched by the rule
        #[arg(long)]
        in_port: String,

        /// Port traffic was redirected to
        #[arg(long)]
        out_port: String,
    },

    /// Show the measurement window
    Window,
}

const DEFAULT_SAFE_POLLS: u32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load(cli.config.as_deref())?;
    let api_url = config.resolve_api_url(cli.api_url.as_deref());
    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(output::OutputFormat::from_config)
        })
        .unwrap_or_default();

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;
    if cli.verbose {
        output::print_info(&format!("Using agent at {}", client.base_url()));
    }

    // Execute command
    match cli.command {
        Commands::Status => status::show_status(&client, format).await?,
        Commands::Ports { limit } => status::show_ports(&client, limit, format).await?,
        Commands::Mode(mode_cmd) => match mode_cmd {
            ModeCommands::Get => mode::get_mode(&client, format).await?,
            ModeCommands::Set { mode } => mode::set_mode(&client, &mode, format).await?,
        },
        Commands::Reroute(reroute_cmd) => match reroute_cmd {
            RerouteCommands::Notify {
                device,
                in_port,
                out_port,
            } => {
                reroute::notify(&client, &device, &in_port, &out_port, format).await?;
            }
            RerouteCommands::Window => reroute::show_window(&client, format).await?,
        },
        Commands::Watch {
            interval,
            safe_polls,
            max_polls,
        } => {
            if interval == 0 {
                anyhow::bail!("--interval must be at least 1 second");
            }
            let safe_polls = safe_polls
                .or(config.safe_polls)
                .unwrap_or(DEFAULT_SAFE_POLLS);
            watch::watch(
                &client,
                Duration::from_secs(interval),
                safe_polls,
                max_polls,
                format,
            )
            .await?;
        }
    }

    Ok(())
}
