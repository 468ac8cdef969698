mod broadcast;
mod client;
pub mod scheduler;
mod server;

pub use client::{ClientError, DaemonClient};
pub use server::run_daemon;
#[allow(unused_imports)]
pub use server::DaemonError;
#[allow(unused_imports)]
pub use wattwise_protocol::{
    ComponentKind, ComponentReading, DaemonRequest, DaemonResponse, DaemonStatus, DataSnapshot,
    EnergyTotals, ErrorKind, PowerSample, Session, MAX_SUBSCRIBERS, MIN_SUPPORTED_VERSION,
    PROTOCOL_VERSION,
};

use std::path::PathBuf;

use crate::config::runtime_dir;

const SOCKET_NAME: &str = "wattwise.sock";

pub fn socket_path() -> PathBuf {
    runtime_dir().join(SOCKET_NAME)
}

pub fn is_daemon_running() -> bool {
    DaemonClient::connect().is_ok()
}
