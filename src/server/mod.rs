//! REST API server for CO2 trend forecasts

mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use crate::cache::{CacheConfig, DataCache};
use crate::downloader::{Co2Downloader, DownloaderConfig};
use crate::engine::ForecastEngine;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (default: "127.0.0.1")
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Upstream CO2 API settings
    pub downloader: DownloaderConfig,
    /// Dataset expiry and failure policy
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            downloader: DownloaderConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with default upstream and cache settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServerConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Socket address the server binds to
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builds the router and its state without binding a socket
pub fn build_app(config: &ServerConfig) -> Result<(axum::Router, Arc<AppState>), Box<dyn std::error::Error>> {
    let downloader = Co2Downloader::with_config(config.downloader.clone())?;
    let cache = DataCache::new(Arc::new(downloader), config.cache.clone());
    let state = Arc::new(AppState::new(cache, Arc::new(ForecastEngine::new())));
    Ok((create_router(state.clone()), state))
}

/// Runs the API server
///
/// # Arguments
/// * `config` - Server configuration
///
/// # Returns
/// Returns an error if the server fails to start or encounters a fatal error
///
/// # Example
/// ```rust,no_run
/// use co2_forecast::server::{run_server, ServerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::default();
///     run_server(config).await?;
///     Ok(())
/// }
/// ```
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; RUST_LOG controls the level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let (app, state) = build_app(&config)?;

    // Warm the cache so the first request does not pay for the download
    let cache = state.cache.clone();
    tokio::spawn(async move {
        match cache.get_dataset().await {
            Ok(dataset) => tracing::info!(
                observations = dataset.len(),
                latest = %dataset.latest_date(),
                "Initial dataset loaded"
            ),
            Err(e) => tracing::warn!("Initial dataset load failed: {}", e),
        }
    });

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
