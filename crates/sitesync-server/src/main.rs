use std::sync::Arc;

use sitesync_server::{serve, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitesync_server=info".parse()?)
                .add_directive("sitesync_core=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting sitesync-server with config: {:?}", config);

    let state = AppState::from_config(config);
    let limits = state.rate_limiter().limits();
    tracing::info!(
        site = %state.site_code(),
        per_minute = limits.per_minute,
        per_hour = limits.per_hour,
        "Resolved site identity and rate limits"
    );

    let bind_addr = state.config.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("sitesync-server listening on {}", bind_addr);
    serve(listener, state, shutdown_signal()).await?;
    tracing::info!("sitesync-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
