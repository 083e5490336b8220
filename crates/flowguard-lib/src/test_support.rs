//! Shared test doubles for the controller, mode and notification seams

use crate::controller::{FlowRule, NetworkController};
use crate::error::{ControllerError, ControllerResult};
use crate::models::{
    ConnectPoint, Device, DevicePortStats, Link, OperatingMode, PortCounter, RerouteNotice,
};
use crate::reroute::{ModeSource, ModeStatus, RerouteNotifier};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory controller with scripted counters
pub struct MockController {
    stats: Mutex<Vec<DevicePortStats>>,
    devices: Mutex<Vec<Device>>,
    links: Mutex<Vec<Link>>,
    flows: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub installs: Mutex<Vec<FlowRule>>,
    pub fail_stats: AtomicBool,
    pub reject_installs: AtomicBool,
}

impl MockController {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(Vec::new()),
            devices: Mutex::new(vec![Device {
                id: "of:0000000000000001".to_string(),
            }]),
            links: Mutex::new(Vec::new()),
            flows: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
            installs: Mutex::new(Vec::new()),
            fail_stats: AtomicBool::new(false),
            reject_installs: AtomicBool::new(false),
        }
    }

    /// Replace the reported counters with one device's ports
    pub fn set_counters(&self, device: &str, ports: &[(&str, u64)]) {
        let stats = vec![DevicePortStats {
            device: device.to_string(),
            ports: ports
                .iter()
                .map(|(port, bytes)| PortCounter {
                    port: port.to_string(),
                    bytes_sent: *bytes,
                })
                .collect(),
        }];
        *self.stats.lock().unwrap() = stats;
    }

    pub fn set_devices(&self, ids: &[&str]) {
        *self.devices.lock().unwrap() = ids
            .iter()
            .map(|id| Device { id: id.to_string() })
            .collect();
    }

    pub fn add_link(&self, src: (&str, &str), dst: (&str, &str)) {
        self.links.lock().unwrap().push(Link {
            src: ConnectPoint {
                device: src.0.to_string(),
                port: src.1.to_string(),
            },
            dst: ConnectPoint {
                device: dst.0.to_string(),
                port: dst.1.to_string(),
            },
        });
    }

    pub fn set_flow_count(&self, count: usize) {
        self.flows.store(count, Ordering::SeqCst);
    }

    pub fn install_count(&self) -> usize {
        self.installs.lock().unwrap().len()
    }
}

#[async_trait]
impl NetworkController for MockController {
    async fn port_statistics(&self) -> ControllerResult<Vec<DevicePortStats>> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(ControllerError::Timeout("statistics/ports".to_string()));
        }
        Ok(self.stats.lock().unwrap().clone())
    }

    async fn devices(&self) -> ControllerResult<Vec<Device>> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn links(&self) -> ControllerResult<Vec<Link>> {
        Ok(self.links.lock().unwrap().clone())
    }

    async fn flow_count(&self) -> ControllerResult<usize> {
        Ok(self.flows.load(Ordering::SeqCst))
    }

    async fn install_flow(&self, rule: &FlowRule) -> ControllerResult<()> {
        if self.reject_installs.load(Ordering::SeqCst) {
            return Err(ControllerError::Status {
                status: 400,
                body: "rejected".to_string(),
            });
        }
        self.installs.lock().unwrap().push(rule.clone());
        Ok(())
    }
}

/// Mode source with a switchable answer; `None` simulates an unreachable source
pub struct MockModeSource {
    mode: Mutex<Option<ModeStatus>>,
}

impl MockModeSource {
    pub fn new(mode: OperatingMode) -> Self {
        Self {
            mode: Mutex::new(Some(ModeStatus::new(mode, 0))),
        }
    }

    /// Switch the answer; a different mode starts a new session
    pub fn set(&self, mode: Option<OperatingMode>) {
        let mut current = self.mode.lock().unwrap();
        *current = match (current.take(), mode) {
            (Some(prev), Some(mode)) if prev.mode == mode => Some(prev),
            (Some(prev), Some(mode)) => Some(ModeStatus::new(mode, prev.session + 1)),
            (None, Some(mode)) => Some(ModeStatus::new(mode, 0)),
            (_, None) => None,
        };
    }
}

#[async_trait]
impl ModeSource for MockModeSource {
    async fn current_mode(&self) -> anyhow::Result<ModeStatus> {
        self.mode
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("mode source unreachable"))
    }
}

/// Records every notice it receives
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<RerouteNotice>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl RerouteNotifier for RecordingNotifier {
    async fn notify(&self, notice: &RerouteNotice) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("notification endpoint down");
        }
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}
