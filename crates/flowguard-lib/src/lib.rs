//! Congestion prediction and one-shot rerouting for SDN controllers
//!
//! This crate provides the core functionality for:
//! - Port counter sampling and rate derivation
//! - EWMA smoothing and traffic state classification
//! - Predictive flow rerouting through the controller REST API
//! - Post-reroute measurement and the aggregate reporting state
//! - Health checks and observability

pub mod classifier;
pub mod controller;
pub mod error;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod pipeline;
pub mod reroute;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{ControllerError, ControllerResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{FlowguardMetrics, StructuredLogger};
