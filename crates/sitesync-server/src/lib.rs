//! sitesync-server - HTTP endpoint host for site-to-site sync
//!
//! Serves a site's live summary, visit rows, the raw visits store and the
//! master package to peer sites, and accepts pushed master packages.

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;

pub use config::{AppConfig, ConfigError};
pub use error::AppError;
pub use routes::{app_router, AppState};

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// Peer addresses are attached to every request for rate limiting, and the
/// idle-client sweeper runs for as long as the server does.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let sweeper = state
        .rate_limiter()
        .clone()
        .spawn_sweeper(rate_limit::SWEEP_INTERVAL);
    let router = app_router(state);
    let result = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;
    sweeper.abort();
    result
}
