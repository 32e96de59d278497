use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sitesync_core::audit::{AuditSink, TracingAuditSink};
use sitesync_core::db::{probe_store, MasterStore, VisitsStore};
use sitesync_core::protocol::{
    api_key_matches, UploadAccepted, API_KEY_HEADER, FULL_VISITS_PATH, HEALTH_PATH, INFO_PATH,
    MASTER_PATH, VISITS_PATH,
};
use sitesync_core::site::{
    MasterSettingsProvider, SettingsProvider, SITE_CODE_KEY, SITE_DISPLAY_NAME_KEY,
};
use sitesync_core::sync::{apply_master_overwrite, build_master_package};
use sitesync_core::util::parse_utc_timestamp;
use sitesync_core::{MasterPackage, SyncInfoResponse, Visit};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{RateLimitMetricsSnapshot, RateLimiter, RateLimits};

const UNKNOWN_SITE: &str = "UNKNOWN";
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    settings: Arc<dyn SettingsProvider>,
    rate_limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let settings = MasterSettingsProvider::new(config.paths.master.clone());
        let limits = RateLimits::resolve(&config, &settings);
        Self::new(
            config,
            Arc::new(settings),
            Arc::new(RateLimiter::new(limits)),
            Arc::new(TracingAuditSink),
        )
    }

    pub fn new(
        config: Arc<AppConfig>,
        settings: Arc<dyn SettingsProvider>,
        rate_limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            settings,
            rate_limiter,
            audit,
        }
    }

    pub const fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Site code from the environment, then the site's settings
    pub fn site_code(&self) -> String {
        self.config
            .site_code
            .clone()
            .or_else(|| self.setting(SITE_CODE_KEY))
            .unwrap_or_else(|| UNKNOWN_SITE.to_string())
    }

    /// Display name from the environment, then the settings, then the code
    pub fn site_display_name(&self) -> String {
        self.config
            .site_display_name
            .clone()
            .or_else(|| self.setting(SITE_DISPLAY_NAME_KEY))
            .unwrap_or_else(|| self.site_code())
    }

    fn setting(&self, key: &str) -> Option<String> {
        sitesync_core::util::normalize_text_option(self.settings.get(key))
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route(INFO_PATH, get(sync_info))
        .route(VISITS_PATH, get(sync_visits))
        .route(FULL_VISITS_PATH, get(full_visits_database))
        .route(MASTER_PATH, get(download_master).post(upload_master))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route(HEALTH_PATH, get(health))
        .merge(sync_routes)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(
            || UNKNOWN_CLIENT.to_string(),
            |ConnectInfo(addr)| addr.ip().to_string(),
        );
    state.rate_limiter.check(&client).await?;
    Ok(next.run(request).await)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Missing API key"))?;
    if !api_key_matches(&state.config.api_key, presented) {
        tracing::warn!(path = %request.uri().path(), "Rejected sync request with invalid API key");
        return Err(AppError::unauthorized("Invalid API key"));
    }
    Ok(next.run(request).await)
}

async fn blocking<T, F>(task: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| AppError::internal(format!("Blocking task failed: {error}")))?
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreCheck {
    healthy: bool,
    detail: String,
}

impl StoreCheck {
    fn probe(path: &Path) -> Self {
        match probe_store(path) {
            Ok(()) => Self {
                healthy: true,
                detail: "reachable".to_string(),
            },
            Err(error) => Self {
                healthy: false,
                detail: error.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthChecks {
    master: StoreCheck,
    visits: StoreCheck,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    checks: HealthChecks,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn health(State(state): State<AppState>) -> Result<Response, AppError> {
    let paths = state.config.paths.clone();
    let checks = blocking(move || {
        Ok(HealthChecks {
            master: StoreCheck::probe(&paths.master),
            visits: StoreCheck::probe(&paths.visits),
        })
    })
    .await?;

    let healthy = checks.master.healthy && checks.visits.healthy;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: Utc::now(),
        checks,
        rate_limit: state.rate_limiter.metrics_snapshot().await,
    };
    Ok((status, Json(body)).into_response())
}

async fn sync_info(State(state): State<AppState>) -> Result<Json<SyncInfoResponse>, AppError> {
    let info = blocking(move || {
        let paths = &state.config.paths;
        let member_count = match MasterStore::open_snapshot(&paths.master) {
            Ok(store) => store.member_count()?,
            Err(sitesync_core::Error::NotFound(_)) => 0,
            Err(error) => return Err(error.into()),
        };
        let (visits_count, latest) = match VisitsStore::open_snapshot(&paths.visits) {
            Ok(store) => (store.count()?, store.latest_visit_at()?),
            Err(sitesync_core::Error::NotFound(_)) => (0, None),
            Err(error) => return Err(error.into()),
        };
        Ok(SyncInfoResponse {
            site_code: state.site_code(),
            site_display_name: state.site_display_name(),
            member_count,
            visits_count,
            last_visit_timestamp_utc: latest,
        })
    })
    .await?;

    Ok(Json(info))
}

#[derive(Debug, Deserialize)]
struct VisitsQuery {
    from: Option<String>,
    to: Option<String>,
}

async fn sync_visits(
    State(state): State<AppState>,
    Query(query): Query<VisitsQuery>,
) -> Result<Json<Vec<Visit>>, AppError> {
    let from = query.from.as_deref().and_then(parse_utc_timestamp);
    let to = query.to.as_deref().and_then(parse_utc_timestamp);
    let path = state.config.paths.visits.clone();

    let visits = blocking(move || match VisitsStore::open_snapshot(&path) {
        Ok(store) => Ok(store.list_range(from, to)?),
        Err(sitesync_core::Error::NotFound(_)) => Ok(Vec::new()),
        Err(error) => Err(error.into()),
    })
    .await?;

    tracing::info!(count = visits.len(), ?from, ?to, "Served visits range");
    Ok(Json(visits))
}

async fn full_visits_database(State(state): State<AppState>) -> Result<Response, AppError> {
    let path = state.config.paths.visits.clone();
    let bytes = blocking(move || {
        if !path.is_file() {
            return Err(AppError::not_found("Visits database does not exist"));
        }
        std::fs::read(&path).map_err(|error| AppError::internal(error.to_string()))
    })
    .await?;

    tracing::info!(bytes = bytes.len(), "Served full visits database");
    Ok(([(CONTENT_TYPE, "application/octet-stream")], Body::from(bytes)).into_response())
}

async fn download_master(State(state): State<AppState>) -> Result<Json<MasterPackage>, AppError> {
    let package = blocking(move || {
        let site_code = state.site_code();
        match build_master_package(&state.config.paths, &site_code, true) {
            Ok(package) => Ok(package),
            Err(sitesync_core::Error::NotFound(_)) => {
                Err(AppError::not_found("Master database does not exist"))
            }
            Err(error) => Err(error.into()),
        }
    })
    .await?;

    tracing::info!(
        master_bytes = package.master_database.len(),
        photo_bytes = package.photos_archive.as_ref().map_or(0, Vec::len),
        "Served master package"
    );
    Ok(Json(package))
}

async fn upload_master(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadAccepted>), AppError> {
    let package: MasterPackage = serde_json::from_slice(&body)
        .map_err(|error| AppError::bad_request(format!("Malformed master package: {error}")))?;
    let source = package.site_code.clone();
    let paths = state.config.paths.clone();

    let applied = blocking(move || {
        apply_master_overwrite(&paths, &package).map_err(|error| {
            tracing::error!(%error, "Failed to apply received master package");
            AppError::from(error)
        })
    })
    .await?;

    let summary = applied.summary();
    tracing::info!(source = %source, %summary, "Applied received master package");
    state
        .audit
        .record("master.received", &format!("from {source}: {summary}"));

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            status: "accepted".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::to_bytes;
    use axum::http::{Method, Request as HttpRequest};
    use pretty_assertions::assert_eq;
    use sitesync_core::site::{SitePaths, StaticSettings};
    use sitesync_core::{Member, Office};
    use tower::ServiceExt;

    use super::*;

    const KEY: &str = "route-test-api-key-0001";

    #[derive(Default)]
    struct RecordingAudit {
        entries: Mutex<Vec<(String, String)>>,
    }

    impl AuditSink for RecordingAudit {
        fn record(&self, action: &str, details: &str) {
            self.entries
                .lock()
                .unwrap()
                .push((action.to_string(), details.to_string()));
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: SitePaths,
        state: AppState,
        audit: Arc<RecordingAudit>,
    }

    fn fixture_with(per_minute: u32, settings: StaticSettings) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        let config = AppConfig::from_lookup(|key| match key {
            "SITESYNC_API_KEY" => Some(KEY.to_string()),
            "SITESYNC_DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        })
        .unwrap();
        let paths = config.paths.clone();
        let audit = Arc::new(RecordingAudit::default());
        let limiter = RateLimiter::new(RateLimits {
            per_minute,
            per_hour: 1_000,
        });
        let state = AppState::new(
            Arc::new(config),
            Arc::new(settings),
            Arc::new(limiter),
            audit.clone(),
        );
        Fixture {
            _dir: dir,
            paths,
            state,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            100,
            StaticSettings::default()
                .with(SITE_CODE_KEY, "NORTH")
                .with(SITE_DISPLAY_NAME_KEY, "North Site"),
        )
    }

    fn get(uri: &str, key: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(Method::GET).uri(uri);
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(state: &AppState, request: HttpRequest<Body>) -> (StatusCode, Bytes) {
        let response = app_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    fn seed_master(paths: &SitePaths) {
        let store = MasterStore::open(&paths.master).unwrap();
        let mut office = Office::new(1, "HQ", "Head office");
        store.save(&mut office).unwrap();
        let mut member = Member::new(1, "M-001", "Ada", "Lovelace");
        member.office_id = Some(office.id);
        store.save(&mut member).unwrap();
    }

    #[tokio::test]
    async fn sync_routes_require_api_key() {
        let fixture = fixture();
        let (status, _) = send(&fixture.state, get(INFO_PATH, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&fixture.state, get(INFO_PATH, Some("wrong-key"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn info_reports_zero_counts_without_stores() {
        let fixture = fixture();
        let (status, body) = send(&fixture.state, get(INFO_PATH, Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);

        let info: SyncInfoResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            info,
            SyncInfoResponse {
                site_code: "NORTH".to_string(),
                site_display_name: "North Site".to_string(),
                member_count: 0,
                visits_count: 0,
                last_visit_timestamp_utc: None,
            }
        );
    }

    #[tokio::test]
    async fn info_counts_live_rows() {
        let fixture = fixture();
        seed_master(&fixture.paths);
        let visits = VisitsStore::open(&fixture.paths.visits).unwrap();
        let at = parse_utc_timestamp("2024-03-01T09:30:00Z").unwrap();
        visits.append(&mut Visit::new(1, at)).unwrap();

        let (_, body) = send(&fixture.state, get(INFO_PATH, Some(KEY))).await;
        let info: SyncInfoResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.member_count, 1);
        assert_eq!(info.visits_count, 1);
        assert_eq!(info.last_visit_timestamp_utc, Some(at));
    }

    #[tokio::test]
    async fn visits_range_filters_and_ignores_bad_bounds() {
        let fixture = fixture();
        let visits = VisitsStore::open(&fixture.paths.visits).unwrap();
        for raw in ["2024-01-01T08:00:00Z", "2024-02-01T08:00:00Z", "2024-03-01T08:00:00Z"] {
            let mut visit = Visit::new(1, parse_utc_timestamp(raw).unwrap());
            visits.append(&mut visit).unwrap();
        }

        let uri = format!("{VISITS_PATH}?from=2024-01-15&to=2024-02-15");
        let (status, body) = send(&fixture.state, get(&uri, Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        let filtered: Vec<Visit> = serde_json::from_slice(&body).unwrap();
        assert_eq!(filtered.len(), 1);

        let uri = format!("{VISITS_PATH}?from=not-a-date");
        let (_, body) = send(&fixture.state, get(&uri, Some(KEY))).await;
        let all: Vec<Visit> = serde_json::from_slice(&body).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn full_visits_database_is_404_until_created() {
        let fixture = fixture();
        let (status, _) = send(&fixture.state, get(FULL_VISITS_PATH, Some(KEY))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        VisitsStore::open(&fixture.paths.visits).unwrap();
        let (status, body) = send(&fixture.state, get(FULL_VISITS_PATH, Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_ref(), std::fs::read(&fixture.paths.visits).unwrap());
    }

    #[tokio::test]
    async fn master_download_and_upload() {
        let source = fixture();
        let (status, _) = send(&source.state, get(MASTER_PATH, Some(KEY))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        seed_master(&source.paths);
        std::fs::create_dir_all(&source.paths.photos_dir).unwrap();
        std::fs::write(source.paths.photos_dir.join("m-001.jpg"), b"jpeg").unwrap();

        let (status, body) = send(&source.state, get(MASTER_PATH, Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
        let package: MasterPackage = serde_json::from_slice(&body).unwrap();
        assert_eq!(package.site_code, "NORTH");
        assert!(package.photos_archive.is_some());

        let target = fixture();
        let upload = HttpRequest::builder()
            .method(Method::POST)
            .uri(MASTER_PATH)
            .header(API_KEY_HEADER, KEY)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&package).unwrap()))
            .unwrap();
        let (status, body) = send(&target.state, upload).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let accepted: UploadAccepted = serde_json::from_slice(&body).unwrap();
        assert_eq!(accepted.status, "accepted");

        let received = MasterStore::open_snapshot(&target.paths.master).unwrap();
        assert_eq!(received.member_count().unwrap(), 1);
        assert_eq!(
            std::fs::read(target.paths.photos_dir.join("m-001.jpg")).unwrap(),
            b"jpeg"
        );
        let entries = target.audit.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "master.received");
    }

    #[tokio::test]
    async fn malformed_upload_is_bad_request() {
        let fixture = fixture();
        let upload = HttpRequest::builder()
            .method(Method::POST)
            .uri(MASTER_PATH)
            .header(API_KEY_HEADER, KEY)
            .body(Body::from("{\"siteCode\": 5}"))
            .unwrap();
        let (status, _) = send(&fixture.state, upload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!fixture.paths.master.exists());
        assert!(fixture.audit.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_database_upload_leaves_master_untouched() {
        let fixture = fixture();
        seed_master(&fixture.paths);
        let before = std::fs::read(&fixture.paths.master).unwrap();

        let upload = HttpRequest::builder()
            .method(Method::POST)
            .uri(MASTER_PATH)
            .header(API_KEY_HEADER, KEY)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"siteCode":"X","masterDatabase":"aGVsbG8gd29ybGQ="}"#,
            ))
            .unwrap();
        let (status, _) = send(&fixture.state, upload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read(&fixture.paths.master).unwrap(), before);
        assert!(fixture.audit.entries.lock().unwrap().is_empty());

        let (status, _) = send(&fixture.state, get(INFO_PATH, Some(KEY))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn requests_beyond_ceiling_get_429() {
        let fixture = fixture_with(2, StaticSettings::default());
        for _ in 0..2 {
            let (status, _) = send(&fixture.state, get(INFO_PATH, Some(KEY))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let response = app_router(fixture.state.clone())
            .oneshot(get(HEALTH_PATH, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn health_reports_missing_stores() {
        let fixture = fixture();
        let (status, body) = send(&fixture.state, get(HEALTH_PATH, None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["checks"]["master"]["healthy"], false);

        MasterStore::open(&fixture.paths.master).unwrap();
        VisitsStore::open(&fixture.paths.visits).unwrap();
        let (status, body) = send(&fixture.state, get(HEALTH_PATH, None)).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[test]
    fn identity_prefers_environment() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().into_owned();
        let config = AppConfig::from_lookup(|key| match key {
            "SITESYNC_API_KEY" => Some(KEY.to_string()),
            "SITESYNC_DATA_DIR" => Some(data_dir.clone()),
            "SITESYNC_SITE_CODE" => Some("SOUTH".to_string()),
            _ => None,
        })
        .unwrap();
        let state = AppState::new(
            Arc::new(config),
            Arc::new(StaticSettings::default().with(SITE_CODE_KEY, "NORTH")),
            Arc::new(RateLimiter::new(RateLimits::default())),
            Arc::new(TracingAuditSink),
        );
        assert_eq!(state.site_code(), "SOUTH");
        assert_eq!(state.site_display_name(), "SOUTH");

        let unnamed = fixture_with(10, StaticSettings::default());
        assert_eq!(unnamed.state.site_code(), UNKNOWN_SITE);
    }
}
