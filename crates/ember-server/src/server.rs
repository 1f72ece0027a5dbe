use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    handlers::{consume_secret, create_secret, health, preview_secret},
    lifecycle::{Lifecycle, Policy},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub ttl: Duration,
    pub max_payload_bytes: usize,
    pub grace: Duration,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let policy = Policy::default();
        Self {
            host: std::env::var("EMBER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("EMBER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("EMBER_DATA_DIR").ok().map(PathBuf::from),
            ttl: std::env::var("EMBER_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(policy.ttl),
            max_payload_bytes: std::env::var("EMBER_MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(policy.max_payload_bytes),
            grace: std::env::var("EMBER_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(policy.grace),
            sweep_interval: Duration::from_secs(300),
            cors_origins: std::env::var("EMBER_CORS_ORIGINS").ok(),
        }
    }
}

/// Resolve the data directory, creating it if needed.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let db_path = data_dir.join("ember.db");
    let store = crate::store::Store::open(&db_path).context("open store")?;

    let policy = Policy {
        ttl: cfg.ttl,
        max_payload_bytes: cfg.max_payload_bytes,
        grace: cfg.grace,
        ..Policy::default()
    };
    let lifecycle = Lifecycle::new(store, policy);

    // Backstop for records nobody ever fetches again.
    lifecycle.clone().spawn_sweep(cfg.sweep_interval);

    let state = AppState { lifecycle };
    let cors = build_cors(cfg.cors_origins.as_deref());

    let app = Router::new()
        .route("/health", get(health))
        .route("/secrets", post(create_secret))
        .route("/secrets/{token}", get(preview_secret))
        .route("/secrets/{token}/view", post(consume_secret))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "ember server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
