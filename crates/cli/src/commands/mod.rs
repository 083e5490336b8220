pub mod mode;
pub mod reroute;
pub mod status;
pub mod watch;
