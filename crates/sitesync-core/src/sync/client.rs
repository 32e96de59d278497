//! Outbound sync client.
//!
//! Every call is a single attempt against the configured remote: no retry,
//! backoff or circuit breaking. Failures of any kind (unreachable host, bad
//! key, rate limit, unexpected payload) are logged and surface as absence so
//! interactive callers only have to check for `None`/empty/`false`.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::Visit;
use crate::protocol::{
    MasterPackage, RemoteSiteConfig, SyncInfoResponse, API_KEY_HEADER, FULL_VISITS_PATH,
    INFO_PATH, MASTER_PATH, VISITS_PATH,
};
use crate::util::compact_text;

const JSON: &str = "application/json";
const OCTET_STREAM: &str = "application/octet-stream";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
enum CallError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote answered HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

type CallResult<T> = Result<T, CallError>;

/// Client for another site's sync server
#[derive(Clone)]
pub struct SyncClient {
    client: reqwest::Client,
}

impl SyncClient {
    /// Client with a 10 s connect timeout and a 5 min overall request timeout
    pub fn new() -> crate::Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// `GET /sync/info`; `None` on any failure
    pub async fn get_info(&self, remote: &RemoteSiteConfig) -> Option<SyncInfoResponse> {
        let request = self.authorized_get(remote, INFO_PATH, JSON);
        log_failure(remote, INFO_PATH, fetch_json(request).await)
    }

    /// `GET /sync/visits`; an empty list on any failure
    pub async fn get_visits(
        &self,
        remote: &RemoteSiteConfig,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<Visit> {
        let mut query = Vec::new();
        if let Some(from) = from {
            query.push(("from", from.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        if let Some(to) = to {
            query.push(("to", to.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        let request = self.authorized_get(remote, VISITS_PATH, JSON).query(&query);
        log_failure(remote, VISITS_PATH, fetch_json(request).await).unwrap_or_default()
    }

    /// `GET /sync/visits/full`; the raw visits store file or `None`
    pub async fn get_full_visits_database(&self, remote: &RemoteSiteConfig) -> Option<Vec<u8>> {
        let request = self.authorized_get(remote, FULL_VISITS_PATH, OCTET_STREAM);
        log_failure(remote, FULL_VISITS_PATH, fetch_bytes(request).await)
    }

    /// `GET /sync/master`; `None` on any failure
    pub async fn get_master_package(&self, remote: &RemoteSiteConfig) -> Option<MasterPackage> {
        let request = self.authorized_get(remote, MASTER_PATH, JSON);
        log_failure(remote, MASTER_PATH, fetch_json(request).await)
    }

    /// `POST /sync/master`; success is decided by the HTTP status alone
    pub async fn upload_master_package(
        &self,
        remote: &RemoteSiteConfig,
        package: &MasterPackage,
    ) -> bool {
        let request = self
            .client
            .post(remote.endpoint(MASTER_PATH))
            .header(API_KEY_HEADER, &remote.api_key)
            .header(ACCEPT, JSON)
            .json(package);
        log_failure(remote, MASTER_PATH, send(request).await).is_some()
    }

    fn authorized_get(&self, remote: &RemoteSiteConfig, path: &str, accept: &str) -> RequestBuilder {
        self.client
            .get(remote.endpoint(path))
            .header(API_KEY_HEADER, &remote.api_key)
            .header(ACCEPT, accept)
    }
}

async fn send(request: RequestBuilder) -> CallResult<reqwest::Response> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CallError::Status {
            status,
            body: compact_text(&body),
        });
    }
    Ok(response)
}

async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> CallResult<T> {
    Ok(send(request).await?.json::<T>().await?)
}

async fn fetch_bytes(request: RequestBuilder) -> CallResult<Vec<u8>> {
    Ok(send(request).await?.bytes().await?.to_vec())
}

fn log_failure<T>(remote: &RemoteSiteConfig, path: &str, result: CallResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(
                remote = %remote.site_code,
                endpoint = path,
                %error,
                "Sync call failed"
            );
            None
        }
    }
}
