use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum SessionCommands {
    /// List all sessions, newest first
    #[command(alias = "ls")]
    List,

    /// Show one session
    Show { id: String },

    /// Show the open session
    Current,

    /// Open a new session
    Start,

    /// End a session (defaults to the open one)
    End { id: Option<String> },
}
