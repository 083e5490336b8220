//! Per-port counter store
//!
//! Keeps the last-seen snapshot, utilization and EWMA for every port a loop
//! has observed. Entries are created lazily and never evicted.

use super::{rate_between, utilization, Ewma, RateOutcome, DEFAULT_ALPHA};
use crate::models::{DevicePortStats, PortKey, PortSample};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

/// Rate estimation parameters for one loop
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Assumed link capacity in bits per second
    pub link_capacity_bps: f64,
    /// Ports below this rate are left out of classification (0 disables)
    pub min_traffic_bps: f64,
    /// EWMA smoothing constant
    pub alpha: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            link_capacity_bps: 1_000_000_000.0,
            min_traffic_bps: 1_000_000.0,
            alpha: DEFAULT_ALPHA,
        }
    }
}

/// Derived state of a single port
#[derive(Debug, Clone, PartialEq)]
pub struct PortState {
    pub last_sample: PortSample,
    pub last_utilization: f64,
    /// `None` until the first measured utilization seeds the series
    pub ewma: Option<f64>,
}

impl PortState {
    fn baseline(sample: PortSample) -> Self {
        Self {
            last_sample: sample,
            last_utilization: 0.0,
            ewma: None,
        }
    }
}

/// Values derived for a port on a measured tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortReading {
    pub rate_bps: f64,
    pub utilization: f64,
    /// Discrete derivative of instantaneous utilization, fraction per second
    pub growth_rate: f64,
    pub ewma: f64,
    pub elapsed_secs: f64,
}

/// What a single counter observation did to the port's state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Port seen for the first time; sample stored, nothing derived
    FirstSample,
    /// Counter decreased; port re-baselined at this sample
    CounterReset,
    /// Δt ≤ 0; prior state retained unchanged
    NonPositiveElapsed,
    /// Below the minimum-traffic floor; sample advanced, not classified
    Idle { rate_bps: f64, utilization: f64 },
    /// Fully derived reading, ready for classification
    Measured(PortReading),
}

impl Observation {
    pub fn reading(&self) -> Option<&PortReading> {
        match self {
            Observation::Measured(reading) => Some(reading),
            _ => None,
        }
    }
}

/// Counter store, rate estimator and EWMA predictor for a set of ports
///
/// Per-port updates are serialized by the map's entry lock, so concurrent
/// observers of the same port never lose an update or read a torn state.
pub struct PortTracker {
    config: EstimatorConfig,
    smoother: Ewma,
    ports: DashMap<PortKey, PortState>,
}

impl PortTracker {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            smoother: Ewma::new(config.alpha),
            config,
            ports: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Feed one cumulative counter value observed at `at`
    pub fn observe(&self, key: &PortKey, bytes_sent: u64, at: DateTime<Utc>) -> Observation {
        let sample = PortSample::new(bytes_sent, at);

        let mut entry = match self.ports.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(PortState::baseline(sample));
                return Observation::FirstSample;
            }
            Entry::Occupied(occupied) => occupied,
        };
        let state = entry.get_mut();

        let (rate_bps, elapsed) = match rate_between(&state.last_sample, &sample) {
            RateOutcome::Rate { bps, elapsed_secs } => (bps, elapsed_secs),
            RateOutcome::NonPositiveElapsed => return Observation::NonPositiveElapsed,
            RateOutcome::CounterReset => {
                debug!(
                    port = %key,
                    previous = state.last_sample.bytes_sent,
                    current = bytes_sent,
                    "Counter went backwards, re-baselining port"
                );
                *state = PortState::baseline(sample);
                return Observation::CounterReset;
            }
        };

        let util = utilization(rate_bps, self.config.link_capacity_bps);
        let growth_rate = (util - state.last_utilization) / elapsed;

        state.last_sample = sample;
        state.last_utilization = util;

        if rate_bps < self.config.min_traffic_bps {
            return Observation::Idle {
                rate_bps,
                utilization: util,
            };
        }

        let ewma = self.smoother.next(state.ewma, util);
        state.ewma = Some(ewma);

        Observation::Measured(PortReading {
            rate_bps,
            utilization: util,
            growth_rate,
            ewma,
            elapsed_secs: elapsed,
        })
    }

    /// Feed a whole statistics response, all ports stamped with `at`
    pub fn observe_all(
        &self,
        stats: &[DevicePortStats],
        at: DateTime<Utc>,
    ) -> Vec<(PortKey, Observation)> {
        stats
            .iter()
            .flat_map(|device| {
                device.ports.iter().map(move |port| {
                    let key = PortKey::new(device.device.clone(), port.port.clone());
                    let observation = self.observe(&key, port.bytes_sent, at);
                    (key, observation)
                })
            })
            .collect()
    }

    /// Snapshot of a port's state
    pub fn state(&self, key: &PortKey) -> Option<PortState> {
        self.ports.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Forget every port; the next observation of each is a first sample
    pub fn clear(&self) {
        self.ports.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
