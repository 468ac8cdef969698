use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum DaemonCommands {
    /// Start the sampling daemon
    Start {
        /// Stay attached to the terminal and log to stderr as well
        #[arg(short, long)]
        foreground: bool,

        /// Sample simulated hardware instead of real sensors
        #[arg(long)]
        simulate: bool,
    },

    /// Stop the running daemon, closing the open session
    Stop,

    /// Stop the daemon if it is running, then start it again
    Restart {
        #[arg(long)]
        simulate: bool,
    },

    /// Show daemon status
    Status,
}
