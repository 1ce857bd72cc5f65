//! Router construction and server startup.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handler::{health, ping, predict};
use crate::backend::Connection;
use crate::config::{AppConfig, BackendConfig, CorsConfig};

/// Uploads larger than this are rejected before any scratch file is written.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared state for the proxy
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    pub connection: Arc<Connection>,
}

/// Build an HTTP client for backend connections
pub fn build_http_client(config: &BackendConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().pool_max_idle_per_host(10);

    // timeout_seconds == 0 means no client-side timeout
    if config.timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_seconds));
    }

    builder.build()
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Skipping unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router
pub fn build_router(state: ProxyState) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .route("/", get(health))
        .route("/ping", get(ping))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the proxy server
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_http_client(&config.backend)?;
    let connection = Arc::new(Connection::new(config.backend.clone(), client));

    std::fs::create_dir_all(&config.uploads.dir)?;

    // Startup connect failure is not fatal; requests reconnect lazily
    if let Err(e) = connection.connect().await {
        tracing::warn!(
            error = %e,
            "Failed to connect to remote inference service at startup; will retry per request"
        );
    }

    let state = ProxyState {
        config: Arc::new(config.clone()),
        connection,
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("vqa-proxy listening on {}", addr);
    tracing::info!("Forwarding predictions to {}", config.backend.predict_url());

    Ok(axum::serve(listener, app).await?)
}
