use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sitesync_core::audit::{AuditSink, FileAuditSink};
use sitesync_core::site::{MasterSettingsProvider, SettingsProvider, SitePaths, SITE_CODE_KEY};
use sitesync_core::sync::SyncClient;
use sitesync_core::util::{normalize_text_option, parse_utc_timestamp};
use sitesync_core::RemoteSiteConfig;

use crate::error::CliError;
use crate::remotes::RemoteRegistry;

const DATA_DIR_ENV: &str = "SITESYNC_DATA_DIR";
const AUDIT_FILE_NAME: &str = "audit.log";
const REMOTE_VISITS_DIR_NAME: &str = "remote-visits";
const UNKNOWN_SITE: &str = "UNKNOWN";

/// Everything a command needs to know about the local site
pub struct SiteContext {
    pub data_dir: PathBuf,
    pub paths: SitePaths,
    audit: FileAuditSink,
}

impl SiteContext {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            paths: SitePaths::from_data_dir(&data_dir),
            audit: FileAuditSink::new(data_dir.join(AUDIT_FILE_NAME)),
            data_dir,
        }
    }

    pub fn remotes_path(&self) -> PathBuf {
        RemoteRegistry::path_in(&self.data_dir)
    }

    pub fn load_remotes(&self) -> Result<RemoteRegistry, CliError> {
        RemoteRegistry::load_from_path(&self.remotes_path())
    }

    pub fn remote(&self, site_code: &str) -> Result<RemoteSiteConfig, CliError> {
        Ok(self.load_remotes()?.get(site_code)?.clone())
    }

    pub const fn audit(&self) -> &FileAuditSink {
        &self.audit
    }

    pub fn record(&self, action: &str, details: &str) {
        self.audit.record(action, details);
    }

    /// This site's code as stored in its own master settings
    pub fn local_site_code(&self) -> String {
        normalize_text_option(MasterSettingsProvider::new(&self.paths.master).get(SITE_CODE_KEY))
            .unwrap_or_else(|| UNKNOWN_SITE.to_string())
    }

    /// Default destination for a remote's full visits store
    pub fn remote_visits_path(&self, site_code: &str) -> PathBuf {
        self.data_dir
            .join(REMOTE_VISITS_DIR_NAME)
            .join(format!("{site_code}.db"))
    }
}

/// `--data-dir`, then `SITESYNC_DATA_DIR`, then the platform data directory
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Some(path) = normalize_text_option(std::env::var(DATA_DIR_ENV).ok()) {
        return Ok(PathBuf::from(path));
    }
    dirs::data_dir()
        .map(|dir| dir.join("sitesync"))
        .ok_or_else(|| {
            CliError::Config(format!(
                "Could not resolve a data directory; pass --data-dir or set {DATA_DIR_ENV}"
            ))
        })
}

/// Parse an optional time bound, rejecting values the server would ignore
pub fn parse_time_bound(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, CliError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    parse_utc_timestamp(raw)
        .map(Some)
        .ok_or_else(|| CliError::InvalidTime(raw.to_string()))
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn sync_client() -> Result<SyncClient, CliError> {
    Ok(SyncClient::new()?)
}
