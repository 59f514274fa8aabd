//! REST API handlers.
//!
//! Registry queries run their network leg before taking any lock; every
//! lock section here is synchronous and drops its guard before an await.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};

use rid_core::flight;
use rid_core::types::now_unix;
use rid_core::DetectionRecord;

use rid_sensor::reader::list_ports;

use crate::faa;
use crate::ingest;
use crate::notify::WebhookDispatcher;
use crate::persist;
use crate::web::{start_sensors, AppState};

// ---------------------------------------------------------------------------
// Detections
// ---------------------------------------------------------------------------

/// GET /api/detections — live state keyed by mac.
pub async fn api_detections(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.store.read().unwrap().live_snapshot();
    Json(json!(snapshot))
}

/// POST /api/detections — ingest one record over HTTP.
pub async fn api_detections_post(
    State(state): State<Arc<AppState>>,
    Json(record): Json<DetectionRecord>,
) -> Response {
    match ingest::apply_detection(&state, record) {
        Some(event) => Json(json!({"status": "ok", "event": event})).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "record has no mac"})),
        )
            .into_response(),
    }
}

/// GET /api/detections_history — history fixes as GeoJSON.
pub async fn api_detections_history(State(state): State<Arc<AppState>>) -> Json<Value> {
    let features: Vec<Value> = {
        let store = state.store.read().unwrap();
        store
            .history()
            .iter()
            .filter(|d| d.has_fix())
            .map(|d| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [d.drone_long, d.drone_lat],
                    },
                    "properties": d,
                })
            })
            .collect()
    };
    Json(json!({"type": "FeatureCollection", "features": features}))
}

/// POST /api/reactivate/:mac — bump a tracked device's freshness.
pub async fn api_reactivate(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
) -> Response {
    let found = state.store.write().unwrap().reactivate(&mac, now_unix());
    if found {
        Json(json!({"status": "ok", "mac": mac})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown mac {mac}")})),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Aliases
// ---------------------------------------------------------------------------

pub async fn api_aliases(State(state): State<Arc<AppState>>) -> Json<Value> {
    let aliases = state.aliases.read().unwrap().clone();
    Json(json!(aliases))
}

#[derive(Deserialize)]
pub struct SetAliasBody {
    pub mac: String,
    pub alias: String,
}

/// POST /api/set_alias — name a mac; persisted immediately.
pub async fn api_set_alias(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetAliasBody>,
) -> Response {
    if body.mac.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "mac is required"})),
        )
            .into_response();
    }

    let aliases = {
        let mut aliases = state.aliases.write().unwrap();
        if body.alias.is_empty() {
            aliases.remove(&body.mac);
        } else {
            aliases.insert(body.mac.clone(), body.alias.clone());
        }
        aliases.clone()
    };
    if let Err(e) = persist::save_aliases(&state.aliases_path, &aliases) {
        warn!("alias save failed: {e}");
    }
    // Flight labels embed aliases.
    state.exporter.mark_dirty();
    Json(json!({"status": "ok"})).into_response()
}

/// POST /api/clear_alias/:mac
pub async fn api_clear_alias(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
) -> Json<Value> {
    let aliases = {
        let mut aliases = state.aliases.write().unwrap();
        aliases.remove(&mac);
        aliases.clone()
    };
    if let Err(e) = persist::save_aliases(&state.aliases_path, &aliases) {
        warn!("alias save failed: {e}");
    }
    state.exporter.mark_dirty();
    Json(json!({"status": "ok"}))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct QueryFaaBody {
    pub mac: Option<String>,
    pub remote_id: Option<String>,
}

/// POST /api/query_faa — resolve a remote ID against the FAA registry.
///
/// Falls back to the cache when the registry is unreachable or returns
/// nothing usable.
pub async fn api_query_faa(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryFaaBody>,
) -> Response {
    let (mac, remote_id) = match (
        body.mac.filter(|s| !s.is_empty()),
        body.remote_id.filter(|s| !s.is_empty()),
    ) {
        (Some(m), Some(r)) => (m, r),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "mac and remote_id are required"})),
            )
                .into_response()
        }
    };

    // Network leg first, with no locks held.
    if let Err(e) = state.faa.refresh_cookie().await {
        warn!("registry cookie refresh failed: {e}");
    }
    let queried = state.faa.query_serial(&remote_id).await;

    match &queried {
        Ok(payload) if faa::has_items(payload) => {
            if let Err(e) = persist::append_faa_log(&state.faa_log_path, &mac, &remote_id, payload)
            {
                warn!("registry log append failed: {e}");
            }
            state
                .store
                .write()
                .unwrap()
                .set_faa_data(&mac, &remote_id, payload.clone());
            if let Err(e) =
                persist::append_faa_cache(&state.faa_cache_path, &mac, &remote_id, payload)
            {
                warn!("registry cache append failed: {e}");
            }
            state.exporter.mark_dirty();
            return Json(json!({"status": "ok", "data": payload})).into_response();
        }
        Ok(_) => {}
        Err(e) => warn!("registry query for {remote_id} failed: {e}"),
    }

    // Cache fallback: exact key first, then anything for this mac.
    let cached = {
        let store = state.store.read().unwrap();
        store
            .cache
            .get_exact(&mac, &remote_id)
            .or_else(|| store.cache.get_by_mac(&mac))
            .cloned()
    };
    match cached {
        Some(payload) => {
            // Persist the served result exactly as a live hit would, so a
            // by-mac fallback becomes an exact (mac, remote_id) row on disk.
            if let Err(e) = persist::append_faa_log(&state.faa_log_path, &mac, &remote_id, &payload)
            {
                warn!("registry log append failed: {e}");
            }
            state
                .store
                .write()
                .unwrap()
                .set_faa_data(&mac, &remote_id, payload.clone());
            if let Err(e) =
                persist::append_faa_cache(&state.faa_cache_path, &mac, &remote_id, &payload)
            {
                warn!("registry cache append failed: {e}");
            }
            state.exporter.mark_dirty();
            Json(json!({"status": "ok", "cached": true, "data": payload})).into_response()
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": format!("no registry data for {remote_id}")})),
        )
            .into_response(),
    }
}

/// GET /api/faa/:identifier — lookup by mac or remote ID, live then cache.
pub async fn api_faa_lookup(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Response {
    let found = {
        let store = state.store.read().unwrap();
        store
            .get_live(&identifier)
            .and_then(|d| d.faa_data.clone())
            .or_else(|| {
                store
                    .live_values()
                    .find(|d| d.basic_id.as_deref() == Some(identifier.as_str()))
                    .and_then(|d| d.faa_data.clone())
            })
            .or_else(|| store.cache.get_by_remote_id(&identifier).cloned())
            .or_else(|| store.cache.get_by_mac(&identifier).cloned())
    };
    match found {
        Some(data) => Json(json!({"identifier": identifier, "data": data})).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("no registry data for {identifier}")})),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Paths and status
// ---------------------------------------------------------------------------

/// GET /api/paths — per-mac drone and pilot polylines.
pub async fn api_paths(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store = state.store.read().unwrap();
    let history = store.history();

    let mut drone_paths: HashMap<String, Vec<[f64; 2]>> = HashMap::new();
    let mut pilot_paths: HashMap<String, Vec<[f64; 2]>> = HashMap::new();
    for mac in rid_core::kml::macs_in_history(history) {
        let dp = flight::drone_path(history, &mac);
        if !dp.is_empty() {
            drone_paths.insert(mac.clone(), dp);
        }
        let pp = flight::pilot_path(history, &mac);
        if !pp.is_empty() {
            pilot_paths.insert(mac, pp);
        }
    }
    Json(json!({"dronePaths": drone_paths, "pilotPaths": pilot_paths}))
}

/// GET /api/serial_status — connected flag per selected port.
pub async fn api_serial_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let statuses = state.serial_status.read().unwrap().clone();
    Json(json!({"statuses": statuses}))
}

/// GET /api/ports — enumerate host serial devices.
pub async fn api_ports(State(_state): State<Arc<AppState>>) -> Json<Value> {
    let ports: Vec<Value> = list_ports()
        .into_iter()
        .map(|p| json!({"device": p.device, "description": p.description}))
        .collect();
    Json(json!({"ports": ports}))
}

#[derive(Deserialize)]
pub struct SelectPortsBody {
    pub ports: Vec<String>,
}

/// POST /api/select_ports — restart readers on a new port selection.
pub async fn api_select_ports(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectPortsBody>,
) -> Json<Value> {
    start_sensors(&state, body.ports);
    let ports = state.sensors.lock().unwrap().ports.clone();
    Json(json!({"status": "ok", "ports": ports}))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub async fn api_settings(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stale_threshold = state.store.read().unwrap().stale_threshold;
    let webhook_set = state.webhook.read().unwrap().is_some();
    Json(json!({"stale_threshold": stale_threshold, "webhook_configured": webhook_set}))
}

#[derive(Deserialize)]
pub struct SettingsBody {
    pub stale_threshold: f64,
}

/// POST /api/settings — adjust the stale threshold at runtime.
pub async fn api_settings_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SettingsBody>,
) -> Response {
    if !body.stale_threshold.is_finite() || body.stale_threshold <= 0.0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "stale_threshold must be positive"})),
        )
            .into_response();
    }
    state.store.write().unwrap().stale_threshold = body.stale_threshold;
    // Flight segmentation depends on the threshold.
    state.exporter.mark_dirty();
    Json(json!({"status": "ok", "stale_threshold": body.stale_threshold})).into_response()
}

#[derive(Deserialize)]
pub struct WebhookBody {
    pub url: Option<String>,
}

/// POST /api/set_webhook_url — set or clear the notification target.
pub async fn api_set_webhook_url(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WebhookBody>,
) -> Json<Value> {
    let url = body.url.filter(|u| !u.is_empty());
    *state.webhook.write().unwrap() = url.as_deref().map(WebhookDispatcher::new);
    Json(json!({"status": "ok", "webhook_configured": url.is_some()}))
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

pub async fn download_csv(State(state): State<Arc<AppState>>) -> Response {
    file_response(state.exporter.session_csv_path(), "text/csv").await
}

pub async fn download_kml(State(state): State<Arc<AppState>>) -> Response {
    // Serve current data even between background flushes.
    ingest::flush_kml(&state);
    file_response(
        state.exporter.session_kml_path(),
        "application/vnd.google-earth.kml+xml",
    )
    .await
}

pub async fn download_cumulative_csv(State(state): State<Arc<AppState>>) -> Response {
    file_response(state.exporter.cumulative_csv_path(), "text/csv").await
}

pub async fn download_cumulative_kml(State(state): State<Arc<AppState>>) -> Response {
    ingest::flush_kml(&state);
    file_response(
        state.exporter.cumulative_kml_path(),
        "application/vnd.google-earth.kml+xml",
    )
    .await
}

pub async fn download_aliases(State(state): State<Arc<AppState>>) -> Response {
    let aliases = state.aliases.read().unwrap().clone();
    let body = serde_json::to_string_pretty(&aliases).unwrap_or_else(|_| "{}".into());
    (
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"aliases.json\"".to_string(),
            ),
        ],
        body,
    )
        .into_response()
}

async fn file_response(path: &FsPath, content_type: &str) -> Response {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".into());
    match tokio::fs::read(path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{name}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("{name}: {e}")})),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    use crate::faa::FaaClient;

    fn test_state() -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        // Reserved port: registry calls fail fast with connection refused.
        let faa = FaaClient::with_endpoints("http://127.0.0.1:1/", "http://127.0.0.1:1/api")
            .unwrap();
        let (state, _rx) = AppState::with_registry(dir.path(), 60.0, faa).unwrap();
        (state, dir)
    }

    fn detection_json(mac: &str, ts: f64) -> Value {
        json!({
            "mac": mac,
            "rssi": -60.0,
            "drone_lat": 35.5,
            "drone_long": -82.5,
            "drone_altitude": 100.0,
            "pilot_lat": 35.4,
            "pilot_long": -82.4,
            "last_update": ts,
        })
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let app = crate::web::build_router(Arc::clone(state));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get_raw(state: &Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let app = crate::web::build_router(Arc::clone(state));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    async fn post(state: &Arc<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
        let app = crate::web::build_router(Arc::clone(state));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Serve canned HTTP responses in order on an ephemeral local port.
    async fn canned_registry(responses: Vec<(u16, Value)>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut sock, _) = match listener.accept().await {
                    Ok(x) => x,
                    Err(_) => break,
                };
                let mut buf = [0u8; 8192];
                let _ = sock.read(&mut buf).await;
                let body = body.to_string();
                let reason = if status == 200 { "OK" } else { "Not Found" };
                let resp = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_post_then_get_detections() {
        let (state, _dir) = test_state();

        let (status, body) = post(&state, "/api/detections", detection_json("AA:BB", 1000.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event"], "new");

        let (status, body) = post(&state, "/api/detections", detection_json("AA:BB", 1030.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event"], "known");

        let (status, live) = get(&state, "/api/detections").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(live["AA:BB"]["last_update"], 1030.0);
    }

    #[tokio::test]
    async fn test_post_without_mac_rejected() {
        let (state, _dir) = test_state();
        let (status, body) = post(&state, "/api/detections", json!({"rssi": -70.0})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_remote_id_sticky_across_posts() {
        let (state, _dir) = test_state();

        let mut first = detection_json("AA:BB", 1000.0);
        first["basic_id"] = json!("RID-X");
        post(&state, "/api/detections", first).await;
        // Second record omits the remote ID.
        post(&state, "/api/detections", detection_json("AA:BB", 1030.0)).await;

        let (_, live) = get(&state, "/api/detections").await;
        assert_eq!(live["AA:BB"]["basic_id"], "RID-X");
    }

    #[tokio::test]
    async fn test_history_geojson() {
        let (state, _dir) = test_state();
        post(&state, "/api/detections", detection_json("AA:BB", 1000.0)).await;
        // No-fix record present in live state but absent from GeoJSON.
        post(
            &state,
            "/api/detections",
            json!({"mac": "CC:DD", "rssi": -80.0, "last_update": 1001.0}),
        )
        .await;

        let (status, geo) = get(&state, "/api/detections_history").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(geo["type"], "FeatureCollection");
        let features = geo["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["geometry"]["coordinates"][0], -82.5);

        let (_, live) = get(&state, "/api/detections").await;
        assert_eq!(live["CC:DD"]["rssi"], -80.0);
    }

    #[tokio::test]
    async fn test_reactivate() {
        let (state, _dir) = test_state();
        post(&state, "/api/detections", detection_json("AA:BB", 1000.0)).await;

        let (status, _) = post(&state, "/api/reactivate/AA:BB", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = post(&state, "/api/reactivate/FF:FF", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_alias_lifecycle() {
        let (state, dir) = test_state();

        let (status, _) = post(
            &state,
            "/api/set_alias",
            json!({"mac": "AA:BB", "alias": "hawk"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(dir.path().join("aliases.json").exists());

        let (_, aliases) = get(&state, "/api/aliases").await;
        assert_eq!(aliases["AA:BB"], "hawk");

        post(&state, "/api/clear_alias/AA:BB", json!({})).await;
        let (_, aliases) = get(&state, "/api/aliases").await;
        assert!(aliases.as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_alias_requires_mac() {
        let (state, _dir) = test_state();
        let (status, _) = post(
            &state,
            "/api/set_alias",
            json!({"mac": "", "alias": "hawk"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_faa_requires_both_fields() {
        let (state, _dir) = test_state();
        let (status, _) = post(&state, "/api/query_faa", json!({"mac": "AA:BB"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = post(&state, "/api/query_faa", json!({"remote_id": "R1"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_faa_unreachable_falls_back_to_cache() {
        let dir = tempfile::tempdir().unwrap();
        // Cache row seeded before startup, as if written in an earlier run.
        persist::append_faa_cache(
            &dir.path().join("faa_cache.csv"),
            "AA:BB",
            "R1",
            &json!({"makeName": "Alpha"}),
        )
        .unwrap();
        let faa = FaaClient::with_endpoints("http://127.0.0.1:1/", "http://127.0.0.1:1/api")
            .unwrap();
        let (state, _rx) = AppState::with_registry(dir.path(), 60.0, faa).unwrap();

        // Exact key miss, mac fallback hit.
        let (status, body) = post(
            &state,
            "/api/query_faa",
            json!({"mac": "AA:BB", "remote_id": "R2"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cached"], true);
        assert_eq!(body["data"]["makeName"], "Alpha");

        // The served fallback is written back to disk under the exact
        // (mac, remote_id) key and logged, same as a live resolution.
        let cache = persist::load_faa_cache(&state.faa_cache_path);
        assert!(cache.get_exact("AA:BB", "R2").is_some());
        assert!(state.faa_log_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_faa_unreachable_and_uncached_is_error() {
        let (state, _dir) = test_state();
        let (status, _) = post(
            &state,
            "/api/query_faa",
            json!({"mac": "AA:BB", "remote_id": "R1"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_query_faa_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        // Connection order: cookie refresh, query (404), refresh, query (200).
        let base = canned_registry(vec![
            (200, json!({})),
            (404, json!({"error": "not found"})),
            (200, json!({})),
            (
                200,
                json!({"data": {"items": [{"makeName": "Alpha", "modelName": "X1"}]}}),
            ),
        ])
        .await;
        let faa = FaaClient::with_endpoints(&base, &format!("{base}/api")).unwrap();
        let (state, _rx) = AppState::with_registry(dir.path(), 60.0, faa).unwrap();

        let (status, _) = get(&state, "/api/faa/AA:BB").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = post(
            &state,
            "/api/query_faa",
            json!({"mac": "AA:BB", "remote_id": "R1"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = post(
            &state,
            "/api/query_faa",
            json!({"mac": "AA:BB", "remote_id": "R1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["data"]["items"][0]["makeName"], "Alpha");

        // Resolution attached to live state and durably cached; lookup
        // works by remote ID and by mac.
        let (status, body) = get(&state, "/api/faa/R1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["data"]["items"][0]["modelName"], "X1");
        let (status, body) = get(&state, "/api/faa/AA:BB").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["data"]["items"][0]["makeName"], "Alpha");
        let cache = persist::load_faa_cache(&state.faa_cache_path);
        assert!(cache.get_exact("AA:BB", "R1").is_some());
    }

    #[tokio::test]
    async fn test_faa_lookup_not_found() {
        let (state, _dir) = test_state();
        let (status, _) = get(&state, "/api/faa/UNKNOWN").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_paths_endpoint() {
        let (state, _dir) = test_state();

        let mut first = detection_json("AA:BB", 1000.0);
        first["drone_lat"] = json!(10.0);
        first["drone_long"] = json!(20.0);
        let mut second = detection_json("AA:BB", 1030.0);
        second["drone_lat"] = json!(10.001);
        second["drone_long"] = json!(20.001);
        post(&state, "/api/detections", first).await;
        post(&state, "/api/detections", second.clone()).await;
        // Re-ingesting an identical point must not extend the polyline.
        post(&state, "/api/detections", second).await;

        let (status, body) = get(&state, "/api/paths").await;
        assert_eq!(status, StatusCode::OK);
        let drone = body["dronePaths"]["AA:BB"].as_array().unwrap();
        assert_eq!(drone.len(), 2);
        assert_eq!(drone[0], json!([10.0, 20.0]));
        assert_eq!(drone[1], json!([10.001, 20.001]));
        // Pilot coordinates were identical throughout, so they collapse.
        assert_eq!(body["pilotPaths"]["AA:BB"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let (state, _dir) = test_state();

        let (_, settings) = get(&state, "/api/settings").await;
        assert_eq!(settings["stale_threshold"], 60.0);

        let (status, _) = post(&state, "/api/settings", json!({"stale_threshold": 120.0})).await;
        assert_eq!(status, StatusCode::OK);
        let (_, settings) = get(&state, "/api/settings").await;
        assert_eq!(settings["stale_threshold"], 120.0);

        let (status, _) = post(&state, "/api/settings", json!({"stale_threshold": -5.0})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_url_set_and_clear() {
        let (state, _dir) = test_state();

        post(
            &state,
            "/api/set_webhook_url",
            json!({"url": "http://127.0.0.1:1/hook"}),
        )
        .await;
        let (_, settings) = get(&state, "/api/settings").await;
        assert_eq!(settings["webhook_configured"], true);

        post(&state, "/api/set_webhook_url", json!({"url": ""})).await;
        let (_, settings) = get(&state, "/api/settings").await;
        assert_eq!(settings["webhook_configured"], false);
    }

    #[tokio::test]
    async fn test_serial_status_empty() {
        let (state, _dir) = test_state();
        let (status, body) = get(&state, "/api/serial_status").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["statuses"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_flights_in_kml() {
        let (state, _dir) = test_state();

        // Three fixes: 30s gap stays one flight, 170s gap starts another.
        for ts in [1000.0, 1030.0, 1200.0] {
            let (status, _) =
                post(&state, "/api/detections", detection_json("AA:BB", ts)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, csv) = get_raw(&state, "/download/csv").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(csv.lines().count(), 4);

        let (status, kml) = get_raw(&state, "/download/kml").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(kml.matches("<Folder>").count(), 2);
        assert!(kml.contains("Flight 1 AA:BB"));
        assert!(kml.contains("Flight 2 AA:BB"));

        let (status, kml) = get_raw(&state, "/download/cumulative.kml").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(kml.matches("<Folder>").count(), 2);
    }

    #[tokio::test]
    async fn test_download_aliases() {
        let (state, _dir) = test_state();
        post(
            &state,
            "/api/set_alias",
            json!({"mac": "AA:BB", "alias": "hawk"}),
        )
        .await;

        let (status, body) = get_raw(&state, "/download/aliases").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["AA:BB"], "hawk");
    }
}
