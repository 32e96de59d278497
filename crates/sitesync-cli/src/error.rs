use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] sitesync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown remote site: {0}. Add it with `sitesync remote add`.")]
    UnknownRemote(String),
    #[error("Remote site {0} is unreachable or rejected the request (see log for details)")]
    RemoteUnavailable(String),
    #[error("Remote site {0} did not accept the master package")]
    PushRejected(String),
    #[error("Invalid time `{0}`: expected RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD")]
    InvalidTime(String),
    #[error("Remote site {0} sent a visits store that is not a SQLite database")]
    InvalidVisitsStore(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
