//! Post-reroute measurement window
//!
//! After a reroute fires, the throughput measured on each metrics tick is
//! collected for a fixed duration so the effect of the action is reported as
//! an observed mean rather than a modeled estimate. Whether the window is
//! still open is computed from the clock on demand; no timer runs.

use crate::models::RerouteNotice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default measurement duration after a reroute
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(6);

/// Reroute episode state: rest (never armed), open, or elapsed
#[derive(Debug, Clone)]
pub struct MeasurementWindow {
    duration: chrono::Duration,
    fired_at: Option<DateTime<Utc>>,
    trigger: Option<RerouteNotice>,
    samples: Vec<f64>,
}

/// Externally visible window state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub open: bool,
    pub samples: usize,
    pub fired_at: Option<DateTime<Utc>>,
    pub mean: Option<f64>,
    pub trigger: Option<RerouteNotice>,
}

impl MeasurementWindow {
    pub fn new(duration: Duration) -> Self {
        let duration = chrono::Duration::from_std(duration)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_WINDOW.as_secs() as i64));
        Self {
            duration,
            fired_at: None,
            trigger: None,
            samples: Vec::new(),
        }
    }

    /// Start a new window at `now`, discarding any previous samples
    pub fn arm(&mut self, trigger: Option<RerouteNotice>, now: DateTime<Utc>) {
        self.samples.clear();
        self.fired_at = Some(now);
        self.trigger = trigger;
    }

    /// Return to the rest state
    pub fn reset(&mut self) {
        self.samples.clear();
        self.fired_at = None;
        self.trigger = None;
    }

    /// `now - fired_at ≤ duration`
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        match self.fired_at {
            Some(fired_at) => now - fired_at <= self.duration,
            None => false,
        }
    }

    /// Append a throughput sample if the window is still open
    pub fn record(&mut self, throughput: f64, now: DateTime<Utc>) -> bool {
        if !self.is_open(now) {
            return false;
        }
        self.samples.push(throughput);
        true
    }

    /// Mean of the collected samples
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Post-action value to report; falls back to the current measurement
    pub fn reported(&self, current: f64) -> f64 {
        self.mean().unwrap_or(current)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn fired_at(&self) -> Option<DateTime<Utc>> {
        self.fired_at
    }

    pub fn status(&self, now: DateTime<Utc>) -> WindowStatus {
        WindowStatus {
            open: self.is_open(now),
            samples: self.samples.len(),
            fired_at: self.fired_at,
            mean: self.mean(),
            trigger: self.trigger.clone(),
        }
    }
}

impl Default for MeasurementWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
