//! Rate estimation between two counter snapshots

use crate::models::PortSample;
use chrono::{DateTime, Utc};

/// Result of comparing two successive snapshots of one counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateOutcome {
    /// Bits per second over the elapsed interval
    Rate { bps: f64, elapsed_secs: f64 },
    /// The cumulative counter went backwards; the port must be re-baselined
    CounterReset,
    /// Duplicate or out-of-order tick; nothing may change
    NonPositiveElapsed,
}

/// Seconds from `from` to `to`, negative when `to` is earlier
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Compute `(current - previous) * 8 / Δt`
///
/// Elapsed time is checked first so a duplicate tick never re-baselines.
pub fn rate_between(previous: &PortSample, current: &PortSample) -> RateOutcome {
    let elapsed = elapsed_secs(previous.observed_at, current.observed_at);
    if elapsed <= 0.0 {
        return RateOutcome::NonPositiveElapsed;
    }

    let Some(delta_bytes) = current.bytes_sent.checked_sub(previous.bytes_sent) else {
        return RateOutcome::CounterReset;
    };

    RateOutcome::Rate {
        bps: delta_bytes as f64 * 8.0 / elapsed,
        elapsed_secs: elapsed,
    }
}

/// Capacity-normalized utilization; not clipped, bursts may exceed 1.0
pub fn utilization(rate_bps: f64, link_capacity_bps: f64) -> f64 {
    if link_capacity_bps <= 0.0 {
        return 0.0;
    }
    rate_bps / link_capacity_bps
}
