mod cli;
mod commands;
mod config;
mod daemon;
mod data;
mod logging;

use clap::Parser;
use color_eyre::eyre::Result;

use cli::{Cli, Commands};
use config::{ensure_dirs, LogLevel, UserConfig};
use logging::LogMode;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let config = UserConfig::load();
    let log_level_override = cli.log_level.as_deref().and_then(LogLevel::from_str);

    match cli.command {
        Commands::Daemon { command } => {
            commands::daemon::run(command, config.log_level, log_level_override)
        }
        Commands::Session { command } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::session::run(command)
        }
        Commands::History {
            hours,
            session,
            json,
        } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::history::run(hours, session, json)
        }
        Commands::Total => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::history::run_total()
        }
        Commands::Watch { count, compact } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::watch::run(count, compact)
        }
        Commands::Config { path, reset } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::config::run(path, reset)
        }
    }
}
