//! Network controller REST surface
//!
//! The controller is an external collaborator: this module only consumes its
//! port statistics, inventory and flow-rule endpoints. Every response shape
//! tolerates missing keys by treating them as an empty result.

mod client;
mod flow;

pub use client::{ControllerClient, ControllerClientBuilder, ControllerConfig};
pub use flow::{Criterion, FlowRule, Instruction, Selector, Treatment, DEFAULT_FLOW_PRIORITY};

use crate::error::ControllerResult;
use crate::models::{Device, DevicePortStats, Link};

pub use async_trait::async_trait;

/// Operations the pipeline needs from the network controller
#[async_trait]
pub trait NetworkController: Send + Sync {
    /// Cumulative per-port byte counters for every device
    async fn port_statistics(&self) -> ControllerResult<Vec<DevicePortStats>>;

    /// Infrastructure devices known to the controller
    async fn devices(&self) -> ControllerResult<Vec<Device>>;

    /// Infrastructure links known to the controller
    async fn links(&self) -> ControllerResult<Vec<Link>>;

    /// Number of installed flow rules
    async fn flow_count(&self) -> ControllerResult<usize>;

    /// Install a flow rule on its device
    async fn install_flow(&self, rule: &FlowRule) -> ControllerResult<()>;
}
