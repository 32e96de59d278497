//! Collaborator interfaces: where a site keeps its files and how it reads
//! its own settings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::db::MasterStore;

/// Settings key holding the site's short code
pub const SITE_CODE_KEY: &str = "SiteCode";
/// Settings key holding the site's display name
pub const SITE_DISPLAY_NAME_KEY: &str = "SiteDisplayName";
/// Settings key overriding the per-minute request ceiling
pub const RATE_LIMIT_PER_MINUTE_KEY: &str = "Sync.RateLimitPerMinute";
/// Settings key overriding the per-hour request ceiling
pub const RATE_LIMIT_PER_HOUR_KEY: &str = "Sync.RateLimitPerHour";

const MASTER_FILE_NAME: &str = "master.db";
const VISITS_FILE_NAME: &str = "visits.db";
const PHOTOS_DIR_NAME: &str = "photos";

/// Locations of a site's local stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    /// Single-file master store
    pub master: PathBuf,
    /// Single-file visits store
    pub visits: PathBuf,
    /// Flat directory of member photos
    pub photos_dir: PathBuf,
}

impl SitePaths {
    /// Conventional layout inside a data directory
    pub fn from_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            master: data_dir.join(MASTER_FILE_NAME),
            visits: data_dir.join(VISITS_FILE_NAME),
            photos_dir: data_dir.join(PHOTOS_DIR_NAME),
        }
    }
}

/// Read-only key/value access to a site's settings
pub trait SettingsProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Read a setting and parse it, treating unparsable values as absent
pub fn parse_setting<T: FromStr>(provider: &dyn SettingsProvider, key: &str) -> Option<T> {
    let raw = provider.get(key)?;
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, "Ignoring unparsable setting value");
    }
    parsed
}

/// Settings read live from the master store file.
///
/// Every lookup opens the file read-only, so values pushed or merged in by
/// another site are seen immediately. A missing file or table reads as unset.
#[derive(Debug, Clone)]
pub struct MasterSettingsProvider {
    path: PathBuf,
}

impl MasterSettingsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsProvider for MasterSettingsProvider {
    fn get(&self, key: &str) -> Option<String> {
        let lookup = MasterStore::open_snapshot(&self.path).and_then(|store| store.setting(key));
        match lookup {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(key, %error, "Setting unavailable");
                None
            }
        }
    }
}

/// Fixed in-memory settings
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: HashMap<String, String>,
}

impl StaticSettings {
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SettingsProvider for StaticSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_paths_follow_data_dir_layout() {
        let paths = SitePaths::from_data_dir("/srv/site");
        assert_eq!(paths.master, PathBuf::from("/srv/site/master.db"));
        assert_eq!(paths.visits, PathBuf::from("/srv/site/visits.db"));
        assert_eq!(paths.photos_dir, PathBuf::from("/srv/site/photos"));
    }

    #[test]
    fn master_settings_provider_reads_live_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.db");
        let provider = MasterSettingsProvider::new(&path);
        assert_eq!(provider.get(SITE_CODE_KEY), None);

        let store = MasterStore::open(&path).unwrap();
        store.set_setting(SITE_CODE_KEY, "NORTH").unwrap();
        assert_eq!(provider.get(SITE_CODE_KEY).as_deref(), Some("NORTH"));

        store.set_setting(RATE_LIMIT_PER_MINUTE_KEY, " 30 ").unwrap();
        assert_eq!(
            parse_setting::<u32>(&provider, RATE_LIMIT_PER_MINUTE_KEY),
            Some(30)
        );
    }

    #[test]
    fn parse_setting_ignores_garbage() {
        let settings = StaticSettings::default().with(RATE_LIMIT_PER_HOUR_KEY, "lots");
        assert_eq!(parse_setting::<u32>(&settings, RATE_LIMIT_PER_HOUR_KEY), None);
    }
}
