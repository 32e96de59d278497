use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "sitesync")]
#[command(about = "Synchronize master data and visits between sites")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Site data directory holding master.db, visits.db and photos/
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the remote sites this site syncs with
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Show a remote site's live summary
    Info {
        /// Remote site code
        site: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull visits from a remote site
    Visits {
        /// Remote site code
        site: String,
        /// Earliest visit time (RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD)
        #[arg(long, value_name = "TIME", conflicts_with = "full")]
        from: Option<String>,
        /// Latest visit time, inclusive
        #[arg(long, value_name = "TIME", conflicts_with = "full")]
        to: Option<String>,
        /// Output as JSON
        #[arg(long, conflicts_with = "full")]
        json: bool,
        /// Download the remote's whole visits store instead of a range
        #[arg(long)]
        full: bool,
        /// Where to save the full store (default: <data-dir>/remote-visits/<SITE>.db)
        #[arg(short, long, value_name = "PATH", requires = "full")]
        output: Option<PathBuf>,
    },
    /// Pull a remote site's master data into this site
    PullMaster {
        /// Remote site code
        site: String,
        /// How the downloaded master data is applied
        #[arg(long, value_enum, default_value_t = PullMode::Merge)]
        mode: PullMode,
    },
    /// Push this site's master data to a remote site
    PushMaster {
        /// Remote site code
        site: String,
        /// Include the photos directory
        #[arg(long)]
        photos: bool,
    },
    /// Show recorded sync outcomes, newest last
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Add or replace a remote site
    Add {
        /// Remote site code
        site_code: String,
        /// Host name or IP address of the remote sync server
        #[arg(long)]
        host: String,
        /// Port of the remote sync server
        #[arg(long, default_value = "5080")]
        port: u16,
        /// Shared API key for this site pair
        #[arg(long, value_name = "KEY")]
        api_key: String,
        /// Human-readable site name
        #[arg(long)]
        name: Option<String>,
    },
    /// List configured remote sites
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget a remote site
    Remove {
        /// Remote site code
        site_code: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PullMode {
    /// Reconcile row by row, newest timestamp wins, never deleting local rows
    Merge,
    /// Replace the local master store and photos with the remote copy
    Overwrite,
}

impl PullMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Overwrite => "overwrite",
        }
    }
}
