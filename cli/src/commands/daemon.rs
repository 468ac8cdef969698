use std::time::Duration;

use bytesize::ByteSize;
use color_eyre::eyre::{eyre, Result};

use crate::cli::DaemonCommands;
use crate::config::LogLevel;
use crate::daemon::{is_daemon_running, run_daemon, socket_path, DaemonClient};
use crate::logging::{self, LogMode};

use super::format_timestamp;

pub fn run(
    command: DaemonCommands,
    log_level: LogLevel,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    match command {
        DaemonCommands::Start {
            foreground,
            simulate,
        } => start(foreground, simulate, log_level, log_level_override),
        DaemonCommands::Stop => {
            if !is_daemon_running() {
                println!("Daemon is not running.");
                return Ok(());
            }
            stop()?;
            println!("Daemon stopped.");
            Ok(())
        }
        DaemonCommands::Restart { simulate } => {
            if is_daemon_running() {
                stop()?;
                println!("Daemon stopped.");
            }
            start(false, simulate, log_level, log_level_override)
        }
        DaemonCommands::Status => status(),
    }
}

fn start(
    foreground: bool,
    simulate: bool,
    log_level: LogLevel,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    if is_daemon_running() {
        println!("Daemon is already running.");
        return Ok(());
    }

    if foreground {
        let _guard = logging::init(log_level, LogMode::Both, log_level_override);
        println!("Starting daemon in foreground...");
        println!("Press Ctrl+C to stop.");
        run_daemon(true, simulate, log_level, log_level_override).map_err(|e| eyre!("{}", e))
    } else {
        println!("Starting daemon...");
        println!("Socket: {}", socket_path().display());
        println!("Logs:   {}", logging::daemon_log_pattern().display());
        run_daemon(false, simulate, log_level, log_level_override).map_err(|e| eyre!("{}", e))
    }
}

/// Asks the daemon to shut down and waits for its socket to disappear.
fn stop() -> Result<()> {
    let mut client =
        DaemonClient::connect().map_err(|e| eyre!("Failed to connect to daemon: {}", e))?;
    client.shutdown().map_err(|e| eyre!("{}", e))?;

    for _ in 0..25 {
        if !socket_path().exists() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(200));
    }
    Err(eyre!("Daemon did not shut down within 5 seconds"))
}

fn status() -> Result<()> {
    println!("Daemon Status");
    println!("{}", "-".repeat(40));

    if !is_daemon_running() {
        println!("Running:      no");
        return Ok(());
    }

    let mut client = DaemonClient::connect_with_version_check().map_err(|e| eyre!("{}", e))?;
    let status = client.get_status().map_err(|e| eyre!("{}", e))?;

    println!("Running:      yes");
    println!("Version:      {} (protocol v{})", status.version, status.protocol_version);
    println!(
        "Uptime:       {}",
        humantime::format_duration(Duration::from_secs(status.uptime_secs))
    );
    println!(
        "Interval:     {}",
        humantime::format_duration(Duration::from_secs(status.sample_interval_secs))
    );
    println!("Samples:      {}", status.sample_count);
    println!("Sessions:     {}", status.session_count);
    println!(
        "Open session: {}",
        status.current_session_id.as_deref().unwrap_or("none")
    );
    println!("Subscribers:  {}", status.subscriber_count);
    println!("Database:     {}", ByteSize::b(status.database_size_bytes));
    if let Some(last) = status.last_sample_time {
        println!("Last sample:  {}", format_timestamp(last));
    }
    if let Ok(snapshot) = client.get_current_data() {
        println!("Power draw:   {:.1} W", snapshot.sample.power_watts);
        println!("Energy:       {:.4} kWh", snapshot.sample.accumulated_kwh);
    }

    Ok(())
}
