//! Web server: axum websocket endpoint plus a small JSON API.
//!
//! Shared state holds the Query Engine (storage + zones, shared by every
//! session), the per-session flow-control settings and the DB path for the
//! stats endpoint, which opens its own connection per request.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use ais_core::config::Config;
use ais_core::types::AisError;
use ais_core::zones::ZoneSet;

use crate::engine::{EngineConfig, QueryEngine};
use crate::session::SessionConfig;
use crate::store::SqliteStore;

pub mod routes;
pub mod socket;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{0}")]
    Setup(#[from] AisError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub session_config: SessionConfig,
    pub db_path: String,
    /// Open websocket sessions.
    pub sessions: AtomicUsize,
}

impl AppState {
    pub fn new(engine: Arc<QueryEngine>, session_config: SessionConfig, db_path: String) -> Self {
        AppState {
            engine,
            session_config,
            db_path,
            sessions: AtomicUsize::new(0),
        }
    }

    /// SQLite-backed state with zones loaded from `zones.dir`, if set.
    pub fn from_config(config: &Config) -> Result<Self, AisError> {
        let zones = match &config.zones.dir {
            Some(dir) => ZoneSet::load_dir(std::path::Path::new(dir))?,
            None => ZoneSet::default(),
        };
        info!(zones = zones.len(), db = %config.database.path, "loaded server state");
        let store = SqliteStore::new(config.database.path.clone());
        let engine = QueryEngine::new(Arc::new(store), Arc::new(zones), EngineConfig::from(config));
        Ok(AppState::new(
            Arc::new(engine),
            SessionConfig::from(&config.server),
            config.database.path.clone(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Websocket sessions; both paths for older clients
        .route("/", get(socket::ws_handler))
        .route("/ws", get(socket::ws_handler))
        .route("/api/health", get(routes::api_health))
        .route("/api/stats", get(routes::api_stats))
        .route("/api/zones", get(routes::api_zones))
        .with_state(state)
        .layer(cors)
}

/// Start the web server.
pub async fn serve(config: &Config) -> Result<(), ServeError> {
    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "AIS server listening on ws://{addr}/ws");
    axum::serve(listener, app).await?;
    Ok(())
}
