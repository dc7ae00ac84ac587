use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sb", about = concat!("statusboard v", env!("CARGO_PKG_VERSION"), " - client project status from ClickUp"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: statusboard.toml in this or a parent directory)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Pull every task in the list into the local database
    Sync,
    /// Re-pull one client's task
    Refresh(SfIdArg),
    /// Print the signed status link for a client
    Link(SfIdArg),
    /// Show a client's dashboard with projected dates
    Show(ShowArgs),
    /// List projects grouped by quarter
    Projects(ProjectsArgs),
    /// Import historical close durations from a pasted table
    ImportHistory(ImportHistoryArgs),
    /// Report close-duration statistics
    History(HistoryArgs),
    /// Show the date edit log for a client
    Edits(SfIdArg),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
}

#[derive(Args)]
pub struct SfIdArg {
    /// Client CRM id
    pub sf_id: String,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Client CRM id
    pub sf_id: String,
    /// Evaluate statuses as of this date (YYYY-MM-DD)
    #[arg(long)]
    pub today: Option<String>,
    /// Pull the latest task data first
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args)]
pub struct ProjectsArgs {
    /// Only projects whose task name matches this regex
    #[arg(long)]
    pub grep: Option<String>,
    /// Pull the latest task data first (falls back to cached data on failure)
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args)]
pub struct ImportHistoryArgs {
    /// File holding the pasted table, or - for stdin
    pub file: PathBuf,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// List every record, not just the summary
    #[arg(long)]
    pub records: bool,
}
