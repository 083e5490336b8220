//! Predictive reroute controller and its measurement window
//!
//! The rerouter depends on two seams: a [`ModeSource`] deciding whether it
//! may act, and a [`RerouteNotifier`] told when it did. Both are satisfied
//! in-process by the monitoring service, or over HTTP when the rerouter runs
//! apart from the reporting API.

mod mode;
mod notifier;
mod rerouter;
mod window;

pub use mode::{HttpModeSource, ModeSource, ModeStatus};
pub use notifier::{HttpRerouteNotifier, RerouteNotifier};
pub use rerouter::{select_target, RerouteConfig, RerouteOutcome, RerouteTarget, Rerouter};
pub use window::{MeasurementWindow, WindowStatus, DEFAULT_WINDOW};
