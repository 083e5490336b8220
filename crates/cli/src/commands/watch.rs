//! Poll the agent until traffic settles

use crate::client::{ApiClient, MetricsReport};
use crate::output::{self, color_state, OutputFormat};
use anyhow::Result;
use chrono::Utc;
use std::time::Duration;

const SETTLED_STATE: &str = "SAFE";
const PORTS_SHOWN: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// First state seen, or same as the previous poll
    Steady,
    /// The state differs from the previous poll
    Changed { from: String, to: String },
    /// The required number of consecutive settled polls was reached
    Settled,
}

/// Tracks state transitions across polls and decides when to stop
#[derive(Debug)]
pub struct WatchTracker {
    last_state: Option<String>,
    safe_streak: u32,
    safe_polls: u32,
}

impl WatchTracker {
    pub fn new(safe_polls: u32) -> Self {
        Self {
            last_state: None,
            safe_streak: 0,
            safe_polls,
        }
    }

    pub fn observe(&mut self, state: &str) -> WatchEvent {
        let changed = match &self.last_state {
            Some(last) if last != state => Some(WatchEvent::Changed {
                from: last.clone(),
                to: state.to_string(),
            }),
            _ => None,
        };
        self.last_state = Some(state.to_string());

        if state == SETTLED_STATE {
            self.safe_streak += 1;
        } else {
            self.safe_streak = 0;
        }

        if self.safe_polls > 0 && self.safe_streak >= self.safe_polls {
            return WatchEvent::Settled;
        }
        changed.unwrap_or(WatchEvent::Steady)
    }

    pub fn safe_streak(&self) -> u32 {
        self.safe_streak
    }
}

/// Poll `/api/metrics` every `interval`, printing one line per sample.
///
/// Fetch errors are reported and polling continues. Stops after
/// `safe_polls` consecutive SAFE samples (0 disables) or `max_polls`.
pub async fn watch(
    client: &ApiClient,
    interval: Duration,
    safe_polls: u32,
    max_polls: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let mut tracker = WatchTracker::new(safe_polls);
    let mut ticker = tokio::time::interval(interval);
    let mut polls = 0u32;

    loop {
        ticker.tick().await;
        polls += 1;

        match client.get::<MetricsReport>("api/metrics").await {
            Ok(report) => {
                let event = tracker.observe(&report.state);
                print_sample(&report, format);

                match event {
                    WatchEvent::Changed { from, to } => {
                        if let OutputFormat::Table = format {
                            output::print_warning(&format!(
                                "State change: {} -> {}",
                                color_state(&from),
                                color_state(&to)
                            ));
                        }
                    }
                    WatchEvent::Settled => {
                        if let OutputFormat::Table = format {
                            output::print_success(&format!(
                                "Traffic SAFE for {} consecutive polls",
                                tracker.safe_streak()
                            ));
                        }
                        return Ok(());
                    }
                    WatchEvent::Steady => {}
                }
            }
            Err(e) => output::print_error(&format!("Fetch failed: {:#}", e)),
        }

        if max_polls.is_some_and(|max| polls >= max) {
            return Ok(());
        }
    }
}

fn print_sample(report: &MetricsReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            if let Ok(line) = serde_json::to_string(report) {
                println!("{}", line);
            }
        }
        OutputFormat::Table => {
            let ports: Vec<String> = report
                .top_ports
                .iter()
                .take(PORTS_SHOWN)
                .map(|p| format!("{}={}kb/s", p.port, p.rate_bps / 1000))
                .collect();
            println!(
                "[{}] thr={:.2}Mbps state={} ewma={:.1}% top=[{}]",
                Utc::now().format("%H:%M:%S"),
                report.throughput,
                color_state(&report.state),
                report.ewma_percent,
                ports.join(", ")
            );
        }
    }
}
