pub mod config;
pub mod daemon;
pub mod history;
pub mod session;
pub mod watch;

use std::time::Duration;

use color_eyre::eyre::{eyre, Result};

use crate::daemon::{is_daemon_running, ClientError, DaemonClient};

/// Connects to a running daemon, with a hint when it is not running.
fn connect() -> Result<DaemonClient> {
    if !is_daemon_running() {
        return Err(eyre!(
            "Daemon is not running. Start it with:\n  wattwise daemon start"
        ));
    }
    DaemonClient::connect_with_version_check().map_err(client_error)
}

fn client_error(e: ClientError) -> color_eyre::Report {
    eyre!("{}", e)
}

fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| ms.to_string())
}

fn format_duration_ms(ms: i64) -> String {
    let secs = u64::try_from(ms / 1000).unwrap_or(0);
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}
