//! JSON API route handlers.
//!
//! Stats opens its own DB connection per request; health and zones are
//! served from the shared engine.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use ais_core::encoder::{to_geojson, ServerMessage};

use crate::db::Database;
use crate::web::AppState;

/// GET /api/health: sessions, zones and the stored time range.
pub async fn api_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (range, storage) = match state.engine.valid_range().await {
        Ok(range) => (range, "ok"),
        Err(_) => (None, "unavailable"),
    };
    Json(json!({
        "status": "ok",
        "storage": storage,
        "sessions": state.sessions.load(Ordering::Relaxed),
        "zones": state.engine.zones().len(),
        "range": range.map(|(start, end)| json!({ "start": start, "end": end })),
    }))
}

/// GET /api/stats: row counts and time range.
pub async fn api_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let path = state.db_path.clone();
    let result = tokio::task::spawn_blocking(move || Database::open(&path)?.stats()).await;
    let message = match result {
        Ok(Ok(stats)) => {
            return (StatusCode::OK, Json(serde_json::to_value(&stats).unwrap_or(json!({}))));
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };
    error!(error = %message, "stats query failed");
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": message })))
}

/// GET /api/zones: loaded zones as a GeoJSON FeatureCollection.
pub async fn api_zones(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let features: Vec<Value> = state
        .engine
        .zones()
        .iter()
        .filter_map(|zone| to_geojson(&ServerMessage::Zone(zone.clone())))
        .collect();
    Json(json!({ "type": "FeatureCollection", "features": features }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use ais_core::types::RawReport;
    use ais_core::zones::{ZonePolygon, ZoneSet};

    use crate::engine::{EngineConfig, QueryEngine};
    use crate::session::SessionConfig;
    use crate::store::SqliteStore;

    fn report(mmsi: u32, timestamp: i64) -> RawReport {
        RawReport {
            mmsi,
            timestamp,
            lat: 44.6,
            lon: -63.5,
            sog: Some(5.0),
            cog: None,
            heading: None,
            rot: None,
            nav_status: None,
            msg_type: 1,
        }
    }

    fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db").to_str().unwrap().to_string();

        let mut db = Database::open(&db_path).unwrap();
        db.insert_position(&report(316001234, 1_625_097_600)).unwrap();
        db.insert_position(&report(316001234, 1_625_101_200)).unwrap();
        drop(db);

        let zones = ZoneSet::new(vec![ZonePolygon::new(
            "halifax",
            vec![[-64.0, 44.0], [-63.0, 44.0], [-63.0, 45.0], [-64.0, 45.0]],
        )
        .unwrap()]);
        let engine = QueryEngine::new(
            Arc::new(SqliteStore::new(db_path.clone())),
            Arc::new(zones),
            EngineConfig::default(),
        );
        let state = AppState::new(Arc::new(engine), SessionConfig::default(), db_path);
        (Arc::new(state), dir)
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let app = crate::web::build_router(state);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_api_health() {
        let (state, _dir) = test_state();
        let (status, json) = get_json(state, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["storage"], "ok");
        assert_eq!(json["sessions"], 0);
        assert_eq!(json["zones"], 1);
        assert_eq!(json["range"]["start"], 1_625_097_600);
        assert_eq!(json["range"]["end"], 1_625_101_200);
    }

    #[tokio::test]
    async fn test_api_stats() {
        let (state, _dir) = test_state();
        let (status, json) = get_json(state, "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["positions"], 2);
        assert_eq!(json["vessels"], 1);
    }

    #[tokio::test]
    async fn test_api_stats_bad_path() {
        let (state, _dir) = test_state();
        // Parent is a regular file, so the open fails.
        let state = Arc::new(AppState::new(
            state.engine.clone(),
            SessionConfig::default(),
            format!("{}/inner.db", state.db_path),
        ));
        let (status, json) = get_json(state, "/api/stats").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_api_zones() {
        let (state, _dir) = test_state();
        let (status, json) = get_json(state, "/api/zones").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["type"], "FeatureCollection");
        let features = json["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["name"], "halifax");
        assert_eq!(features[0]["geometry"]["type"], "LineString");
    }
}
