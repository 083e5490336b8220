//! Counter sampling, rate derivation and smoothing
//!
//! This module turns successive cumulative byte counters into per-port
//! rates, capacity-normalized utilization, a discrete growth rate and an
//! EWMA-smoothed utilization. It is shared by every polling loop; each loop
//! owns its own [`PortTracker`] so their deltas never interfere.

mod ewma;
mod rate;
mod store;

pub use ewma::{Ewma, DEFAULT_ALPHA};
pub use rate::{elapsed_secs, rate_between, utilization, RateOutcome};
pub use store::{EstimatorConfig, Observation, PortReading, PortState, PortTracker};
