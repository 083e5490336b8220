//! Core data models for the congestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Identity of a monitored interface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortKey {
    pub device: String,
    pub port: String,
}

impl PortKey {
    pub fn new(device: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.port)
    }
}

/// A single cumulative counter observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortSample {
    pub bytes_sent: u64,
    pub observed_at: DateTime<Utc>,
}

impl PortSample {
    pub fn new(bytes_sent: u64, observed_at: DateTime<Utc>) -> Self {
        Self {
            bytes_sent,
            observed_at,
        }
    }
}

/// Traffic state produced by the classifiers
///
/// The instantaneous classifier speaks `Normal`/`PotentialCongestion`/`Congested`,
/// the predictive one `Safe`/`PredictedCongestion` (and `Congested` in its
/// two-tier form). Both map onto one ordered severity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficState {
    Normal,
    Safe,
    PotentialCongestion,
    PredictedCongestion,
    Congested,
}

impl TrafficState {
    /// 0 = safe, 1 = potential/predicted, 2 = congested
    pub fn severity(&self) -> u8 {
        match self {
            TrafficState::Normal | TrafficState::Safe => 0,
            TrafficState::PotentialCongestion | TrafficState::PredictedCongestion => 1,
            TrafficState::Congested => 2,
        }
    }

    /// True for every state above the safe tier
    pub fn is_congestion(&self) -> bool {
        self.severity() > 0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficState::Normal => "NORMAL",
            TrafficState::Safe => "SAFE",
            TrafficState::PotentialCongestion => "POTENTIAL_CONGESTION",
            TrafficState::PredictedCongestion => "PREDICTED_CONGESTION",
            TrafficState::Congested => "CONGESTED",
        }
    }
}

impl fmt::Display for TrafficState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally selected operating mode
///
/// Only `Proposed` permits corrective action. Labels other than the two known
/// ones are kept verbatim so experiment runners can tag their runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperatingMode {
    #[default]
    Baseline,
    Proposed,
    Other(String),
}

impl OperatingMode {
    /// Whether the reroute controller may act in this mode
    pub fn is_active_control(&self) -> bool {
        matches!(self, OperatingMode::Proposed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperatingMode::Baseline => "baseline",
            OperatingMode::Proposed => "proposed",
            OperatingMode::Other(label) => label,
        }
    }
}

impl FromStr for OperatingMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        Ok(match label.as_str() {
            "" | "baseline" => OperatingMode::Baseline,
            "proposed" => OperatingMode::Proposed,
            _ => OperatingMode::Other(label),
        })
    }
}

impl From<String> for OperatingMode {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(mode) => mode,
            Err(never) => match never {},
        }
    }
}

impl From<OperatingMode> for String {
    fn from(mode: OperatingMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "A reroute occurred" event sent to the measurement subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerouteNotice {
    pub device: String,
    #[serde(deserialize_with = "port_repr::deserialize")]
    pub in_port: String,
    #[serde(deserialize_with = "port_repr::deserialize")]
    pub out_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fired_at: Option<DateTime<Utc>>,
}

/// Per-device port counters from `GET /statistics/ports`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DevicePortStats {
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub ports: Vec<PortCounter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortCounter {
    #[serde(deserialize_with = "port_repr::deserialize")]
    pub port: String,
    #[serde(default)]
    pub bytes_sent: u64,
}

/// Infrastructure device from `GET /devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
}

/// One end of a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPoint {
    pub device: String,
    #[serde(deserialize_with = "port_repr::deserialize")]
    pub port: String,
}

/// Infrastructure link from `GET /links`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub src: ConnectPoint,
    pub dst: ConnectPoint,
}

/// Controllers and scripts send port numbers both as JSON strings and numbers
pub(crate) mod port_repr {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Text(String),
        Number(u64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match PortRepr::deserialize(deserializer)? {
            PortRepr::Text(text) => text,
            PortRepr::Number(n) => n.to_string(),
        })
    }
}
