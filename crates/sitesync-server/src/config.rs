use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use sitesync_core::site::SitePaths;
use thiserror::Error;

const MIN_API_KEY_LEN: usize = 16;
const BYTES_PER_MB: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_key: String,
    pub paths: SitePaths,
    pub site_code: Option<String>,
    pub site_display_name: Option<String>,
    pub rate_limit_per_minute: Option<u32>,
    pub rate_limit_per_hour: Option<u32>,
    pub max_upload_bytes: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("api_key", &"[REDACTED]")
            .field("paths", &self.paths)
            .field("site_code", &self.site_code)
            .field("site_display_name", &self.site_display_name)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("rate_limit_per_hour", &self.rate_limit_per_hour)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_host = value_or_default(&lookup, "SITESYNC_BIND_HOST", "0.0.0.0");
        let port = value_or_default(&lookup, "SITESYNC_PORT", "5080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::Invalid("SITESYNC_PORT must be an integer in [1, 65535]".to_string())
            })?;
        if port == 0 {
            return Err(ConfigError::Invalid(
                "SITESYNC_PORT must be in [1, 65535]".to_string(),
            ));
        }

        let api_key = required_trimmed(&lookup, "SITESYNC_API_KEY")?;
        if api_key.len() < MIN_API_KEY_LEN {
            return Err(ConfigError::Invalid(format!(
                "SITESYNC_API_KEY must be at least {MIN_API_KEY_LEN} characters"
            )));
        }

        let data_dir = PathBuf::from(value_or_default(&lookup, "SITESYNC_DATA_DIR", "./data"));
        let mut paths = SitePaths::from_data_dir(&data_dir);
        if let Some(master) = optional_trimmed(&lookup, "SITESYNC_MASTER_PATH") {
            paths.master = PathBuf::from(master);
        }
        if let Some(visits) = optional_trimmed(&lookup, "SITESYNC_VISITS_PATH") {
            paths.visits = PathBuf::from(visits);
        }
        if let Some(photos) = optional_trimmed(&lookup, "SITESYNC_PHOTOS_DIR") {
            paths.photos_dir = PathBuf::from(photos);
        }

        let site_code = optional_trimmed(&lookup, "SITESYNC_SITE_CODE");
        let site_display_name = optional_trimmed(&lookup, "SITESYNC_SITE_NAME");

        let rate_limit_per_minute =
            optional_bounded(&lookup, "RATE_LIMIT_PER_MINUTE", 1, 10_000)?;
        let rate_limit_per_hour = optional_bounded(&lookup, "RATE_LIMIT_PER_HOUR", 1, 100_000)?;

        let max_upload_mb = value_or_default(&lookup, "SITESYNC_MAX_UPLOAD_MB", "512")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "SITESYNC_MAX_UPLOAD_MB must be an integer in [1, 4096]".to_string(),
                )
            })?;
        if !(1..=4_096).contains(&max_upload_mb) {
            return Err(ConfigError::Invalid(
                "SITESYNC_MAX_UPLOAD_MB must be in [1, 4096]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr: format!("{bind_host}:{port}"),
            api_key,
            paths,
            site_code,
            site_display_name,
            rate_limit_per_minute,
            rate_limit_per_hour,
            max_upload_bytes: max_upload_mb * BYTES_PER_MB,
        })
    }
}

fn optional_bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    min: u32,
    max: u32,
) -> Result<Option<u32>, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(None);
    };
    let value = raw.parse::<u32>().map_err(|_| {
        ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]"))
    })?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(Some(value))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    sitesync_core::util::normalize_text_option(lookup(name))
}
