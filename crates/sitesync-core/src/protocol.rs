//! Wire contract shared by the sync server and the sync client.
//!
//! All typed payloads travel as JSON with camelCase field names; byte arrays
//! are base64 strings. The full visits database travels as a raw
//! `application/octet-stream` body.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Header carrying the shared per-site-pair secret
pub const API_KEY_HEADER: &str = "X-Api-Key";

pub const HEALTH_PATH: &str = "/health";
pub const INFO_PATH: &str = "/sync/info";
pub const VISITS_PATH: &str = "/sync/visits";
pub const FULL_VISITS_PATH: &str = "/sync/visits/full";
pub const MASTER_PATH: &str = "/sync/master";

/// Compare a presented API key against the configured one in constant time.
///
/// An empty configured key never matches.
pub fn api_key_matches(expected: &str, presented: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Identifies and authenticates a peer site
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSiteConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub site_code: String,
    pub display_name: String,
}

impl fmt::Debug for RemoteSiteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteSiteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &"[REDACTED]")
            .field("site_code", &self.site_code)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl RemoteSiteConfig {
    /// Base URL of the remote sync server, without a trailing slash.
    ///
    /// A host given with an explicit `http://`/`https://` scheme keeps it;
    /// plain hosts are reached over plain HTTP. IPv6 literals are bracketed.
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        let (scheme, host) = ["http://", "https://"]
            .into_iter()
            .find_map(|scheme| host.strip_prefix(scheme).map(|rest| (scheme, rest)))
            .unwrap_or(("http://", host));
        if host.contains(':') && !host.starts_with('[') {
            format!("{scheme}[{host}]:{}", self.port)
        } else {
            format!("{scheme}{host}:{}", self.port)
        }
    }

    /// Full URL for an endpoint path such as [`INFO_PATH`]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    /// Reject configurations that cannot possibly reach a peer
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidInput("remote host is required".to_string()));
        }
        if self.port == 0 {
            return Err(Error::InvalidInput("remote port must be non-zero".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::InvalidInput("remote API key is required".to_string()));
        }
        if self.site_code.trim().is_empty() {
            return Err(Error::InvalidInput("remote site code is required".to_string()));
        }
        Ok(())
    }
}

/// Live summary of a site, regenerated on every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfoResponse {
    pub site_code: String,
    pub site_display_name: String,
    pub member_count: i64,
    pub visits_count: i64,
    pub last_visit_timestamp_utc: Option<DateTime<Utc>>,
}

/// Point-in-time transfer unit for a site's master store
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterPackage {
    pub site_code: String,
    /// Entire master store file contents
    #[serde(with = "base64_bytes")]
    pub master_database: Vec<u8>,
    /// Zip of every photo file, present only when photos were requested
    #[serde(default, with = "optional_base64_bytes")]
    pub photos_archive: Option<Vec<u8>>,
}

impl fmt::Debug for MasterPackage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MasterPackage")
            .field("site_code", &self.site_code)
            .field("master_database_len", &self.master_database.len())
            .field(
                "photos_archive_len",
                &self.photos_archive.as_ref().map(Vec::len),
            )
            .finish()
    }
}

/// Acknowledgement returned by `POST /sync/master`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAccepted {
    pub status: String,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod optional_base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn remote() -> RemoteSiteConfig {
        RemoteSiteConfig {
            host: "10.0.0.5".to_string(),
            port: 5080,
            api_key: "super-secret-key-123".to_string(),
            site_code: "NORTH".to_string(),
            display_name: "North Site".to_string(),
        }
    }

    #[test]
    fn api_key_comparison() {
        assert!(api_key_matches("abc123", "abc123"));
        assert!(!api_key_matches("abc123", "abc124"));
        assert!(!api_key_matches("abc123", "abc"));
        assert!(!api_key_matches("", ""));
    }

    #[test]
    fn remote_base_url_defaults_to_http() {
        let config = remote();
        assert_eq!(config.base_url(), "http://10.0.0.5:5080");
        assert_eq!(config.endpoint(INFO_PATH), "http://10.0.0.5:5080/sync/info");

        let mut explicit = remote();
        explicit.host = "https://north.example.org/".to_string();
        assert_eq!(explicit.base_url(), "https://north.example.org:5080");
    }

    #[test]
    fn remote_base_url_brackets_ipv6_hosts() {
        let mut config = remote();
        config.host = "fe80::1".to_string();
        assert_eq!(config.base_url(), "http://[fe80::1]:5080");

        config.host = "https://[::1]".to_string();
        assert_eq!(config.base_url(), "https://[::1]:5080");
    }

    #[test]
    fn remote_debug_redacts_api_key() {
        let debug_output = format!("{:?}", remote());
        assert!(!debug_output.contains("super-secret-key-123"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn remote_validation_requires_key_and_host() {
        assert!(remote().validate().is_ok());
        let mut missing_key = remote();
        missing_key.api_key = " ".to_string();
        assert!(missing_key.validate().is_err());
        let mut missing_host = remote();
        missing_host.host = String::new();
        assert!(missing_host.validate().is_err());
    }

    #[test]
    fn master_package_encodes_bytes_as_base64() {
        let package = MasterPackage {
            site_code: "NORTH".to_string(),
            master_database: b"SQLite".to_vec(),
            photos_archive: None,
        };
        let json = serde_json::to_value(&package).unwrap();
        assert_eq!(json["siteCode"], "NORTH");
        assert_eq!(json["masterDatabase"], "U1FMaXRl");
        assert!(json["photosArchive"].is_null());
    }

    #[test]
    fn master_package_accepts_missing_photos_field() {
        let package: MasterPackage =
            serde_json::from_str(r#"{"siteCode":"S","masterDatabase":"AAEC"}"#).unwrap();
        assert_eq!(package.master_database, vec![0, 1, 2]);
        assert_eq!(package.photos_archive, None);
    }

    #[test]
    fn master_package_rejects_invalid_base64() {
        let result =
            serde_json::from_str::<MasterPackage>(r#"{"siteCode":"S","masterDatabase":"@@@"}"#);
        assert!(result.is_err());
    }
}
