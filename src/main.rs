//! HTTP server entry point.
//!
//! Wires the ffmpeg process runner, the disk cache and the thumbnail service
//! behind the axum router.

use gifthumb::adapters::http::{router, AppState};
use gifthumb::adapters::TokioCommandRunner;
use gifthumb::config::{Config, ServerConfig};
use gifthumb::ThumbnailService;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    let server = ServerConfig::from_env();

    // 1. Adapters
    let runner = TokioCommandRunner::new();
    let service = ThumbnailService::new(&config, runner);
    let cache_dir = service.cache().dir().display().to_string();
    if let Err(e) = service.cache().ensure_dir().await {
        error!(dir = %cache_dir, error = %e, "failed to create cache directory");
        std::process::exit(1);
    }
    info!(dir = %cache_dir, "cache directory ready");

    // 2. HTTP layer
    let app = router(AppState {
        config: Arc::new(config),
        service: Arc::new(service),
    });

    // 3. Start server
    let listener = match tokio::net::TcpListener::bind(server.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %server.bind_address(), error = %e, "failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    info!(address = %server.bind_address(), "listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}
