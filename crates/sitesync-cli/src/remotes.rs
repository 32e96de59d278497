//! Persistent registry of remote sites.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sitesync_core::util::write_atomic;
use sitesync_core::RemoteSiteConfig;

use crate::error::CliError;

const REMOTES_FILE_NAME: &str = "remotes.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRegistry {
    #[serde(default = "default_registry_version")]
    pub version: u32,
    #[serde(default)]
    pub remotes: BTreeMap<String, RemoteSiteConfig>,
}

const fn default_registry_version() -> u32 {
    1
}

/// Registry keys are upper-cased site codes
pub fn normalize_site_code(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_uppercase())
    }
}

impl RemoteRegistry {
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(REMOTES_FILE_NAME)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read remotes at {}: {error}",
                path.display()
            ))
        })?;
        let mut registry = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse remotes at {}: {error}",
                path.display()
            ))
        })?;
        registry.normalize();
        Ok(registry)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        write_atomic(path, serialized.as_bytes())?;
        Ok(())
    }

    /// Insert or replace a remote, returning the one it replaced
    pub fn upsert(&mut self, mut remote: RemoteSiteConfig) -> Result<Option<RemoteSiteConfig>, CliError> {
        let code = normalize_site_code(&remote.site_code)
            .ok_or_else(|| CliError::Config("Remote site code cannot be empty".to_string()))?;
        remote.site_code.clone_from(&code);
        remote.host = remote.host.trim().to_string();
        remote.api_key = remote.api_key.trim().to_string();
        remote.display_name = remote.display_name.trim().to_string();
        if remote.display_name.is_empty() {
            remote.display_name.clone_from(&code);
        }
        remote.validate()?;
        Ok(self.remotes.insert(code, remote))
    }

    pub fn get(&self, site_code: &str) -> Result<&RemoteSiteConfig, CliError> {
        normalize_site_code(site_code)
            .and_then(|code| self.remotes.get(&code))
            .ok_or_else(|| CliError::UnknownRemote(site_code.trim().to_string()))
    }

    pub fn remove(&mut self, site_code: &str) -> Result<RemoteSiteConfig, CliError> {
        normalize_site_code(site_code)
            .and_then(|code| self.remotes.remove(&code))
            .ok_or_else(|| CliError::UnknownRemote(site_code.trim().to_string()))
    }

    fn normalize(&mut self) {
        let remotes = std::mem::take(&mut self.remotes);
        for (key, mut remote) in remotes {
            let Some(code) = normalize_site_code(&key) else {
                continue;
            };
            remote.site_code.clone_from(&code);
            self.remotes.insert(code, remote);
        }
    }
}
