mod daemon;
mod session;

pub use daemon::DaemonCommands;
pub use session::SessionCommands;

use clap::{Parser, Subcommand};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the background sampling daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Inspect and control accounting sessions
    Session {
        #[command(subcommand)]
        command: Option<SessionCommands>,
    },

    /// Print recorded power samples
    History {
        /// Samples from the last N hours
        #[arg(long, default_value_t = 1, conflicts_with = "session")]
        hours: u32,

        /// Samples belonging to one session
        #[arg(short, long)]
        session: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show accumulated energy and cost
    Total,

    /// Stream live snapshots as JSON
    #[command(alias = "raw")]
    Watch {
        /// Stop after N snapshots (0 = forever)
        #[arg(short = 'n', long, default_value_t = 0)]
        count: u32,

        /// One JSON document per line
        #[arg(short, long)]
        compact: bool,
    },

    /// Show or reset the configuration
    Config {
        /// Print config and log file locations
        #[arg(long)]
        path: bool,

        /// Overwrite the config file with defaults
        #[arg(long)]
        reset: bool,
    },
}

/// PC power draw and energy cost tracker
#[derive(Debug, Parser)]
#[command(name = "wattwise", version, verbatim_doc_comment)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}
