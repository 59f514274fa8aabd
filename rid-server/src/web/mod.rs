//! Web server — axum REST API for the detection dashboard.
//!
//! Shared state holds the merge store, alias map, export files, the
//! registry client, and the serial reader control block. All locks are
//! synchronous and never held across an await.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use axum::Router;
use log::info;
use tokio::sync::{broadcast, mpsc, watch};
use tower_http::cors::{Any, CorsLayer};

use rid_core::config::MAX_SENSOR_PORTS;
use rid_core::types::Result;
use rid_core::{DetectionRecord, DetectionStore};
use rid_sensor::reader::{run_reader, StatusMap};

use crate::exports::Exporter;
use crate::faa::FaaClient;
use crate::ingest::{self, DetectionEvent};
use crate::notify::WebhookDispatcher;
use crate::persist;

pub mod routes;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const INGEST_CHANNEL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub store: RwLock<DetectionStore>,
    pub aliases: RwLock<HashMap<String, String>>,
    pub serial_status: StatusMap,
    pub exporter: Exporter,
    pub faa: FaaClient,
    pub webhook: RwLock<Option<WebhookDispatcher>>,
    pub events: broadcast::Sender<DetectionEvent>,
    pub aliases_path: PathBuf,
    pub faa_cache_path: PathBuf,
    pub faa_log_path: PathBuf,
    pub ingest_tx: mpsc::Sender<DetectionRecord>,
    pub sensors: Mutex<SensorControl>,
}

/// Which ports are selected and the shutdown handle for their readers.
#[derive(Default)]
pub struct SensorControl {
    pub ports: Vec<String>,
    pub shutdown: Option<watch::Sender<bool>>,
}

impl AppState {
    /// Build state rooted at `data_dir`, reloading persisted aliases and
    /// the registry cache. Returns the receiving end of the ingest
    /// channel for the pipeline task.
    pub fn new(
        data_dir: &Path,
        stale_threshold: f64,
    ) -> Result<(Arc<AppState>, mpsc::Receiver<DetectionRecord>)> {
        Self::with_registry(data_dir, stale_threshold, FaaClient::new()?)
    }

    /// As [`AppState::new`], but with an explicit registry client.
    pub fn with_registry(
        data_dir: &Path,
        stale_threshold: f64,
        faa: FaaClient,
    ) -> Result<(Arc<AppState>, mpsc::Receiver<DetectionRecord>)> {
        std::fs::create_dir_all(data_dir)?;

        let aliases_path = data_dir.join("aliases.json");
        let faa_cache_path = data_dir.join("faa_cache.csv");
        let faa_log_path = data_dir.join("faa_log.csv");

        let aliases = persist::load_aliases(&aliases_path);
        let cache = persist::load_faa_cache(&faa_cache_path);
        info!(
            "loaded {} aliases, {} cached registry entries",
            aliases.len(),
            cache.len()
        );

        let exporter = Exporter::new(data_dir)?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (ingest_tx, ingest_rx) = mpsc::channel(INGEST_CHANNEL_CAPACITY);

        let state = Arc::new(AppState {
            store: RwLock::new(DetectionStore::with_cache(stale_threshold, cache)),
            aliases: RwLock::new(aliases),
            serial_status: StatusMap::default(),
            exporter,
            faa,
            webhook: RwLock::new(None),
            events,
            aliases_path,
            faa_cache_path,
            faa_log_path,
            ingest_tx,
            sensors: Mutex::new(SensorControl::default()),
        });
        Ok((state, ingest_rx))
    }
}

/// (Re)start serial readers for the given port selection.
///
/// Any previously running readers are signalled to stop first. The
/// selection is capped at the sensor port limit.
pub fn start_sensors(state: &Arc<AppState>, ports: Vec<String>) {
    let mut ports = ports;
    ports.truncate(MAX_SENSOR_PORTS);

    let mut control = state.sensors.lock().unwrap();
    if let Some(old) = control.shutdown.take() {
        let _ = old.send(true);
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    for port in &ports {
        tokio::spawn(run_reader(
            port.clone(),
            state.ingest_tx.clone(),
            Arc::clone(&state.serial_status),
            stop_rx.clone(),
        ));
    }
    info!("serial readers active on {ports:?}");

    control.ports = ports;
    control.shutdown = Some(stop_tx);
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
        .route(
            "/api/detections",
            axum::routing::get(routes::api_detections).post(routes::api_detections_post),
        )
        .route(
            "/api/detections_history",
            axum::routing::get(routes::api_detections_history),
        )
        .route(
            "/api/reactivate/:mac",
            axum::routing::post(routes::api_reactivate),
        )
        .route("/api/aliases", axum::routing::get(routes::api_aliases))
        .route("/api/set_alias", axum::routing::post(routes::api_set_alias))
        .route(
            "/api/clear_alias/:mac",
            axum::routing::post(routes::api_clear_alias),
        )
        .route("/api/query_faa", axum::routing::post(routes::api_query_faa))
        .route(
            "/api/faa/:identifier",
            axum::routing::get(routes::api_faa_lookup),
        )
        .route("/api/paths", axum::routing::get(routes::api_paths))
        .route(
            "/api/serial_status",
            axum::routing::get(routes::api_serial_status),
        )
        .route("/api/ports", axum::routing::get(routes::api_ports))
        .route(
            "/api/select_ports",
            axum::routing::post(routes::api_select_ports),
        )
        .route(
            "/api/settings",
            axum::routing::get(routes::api_settings).post(routes::api_settings_post),
        )
        .route(
            "/api/set_webhook_url",
            axum::routing::post(routes::api_set_webhook_url),
        )
        .route("/download/csv", axum::routing::get(routes::download_csv))
        .route("/download/kml", axum::routing::get(routes::download_kml))
        .route(
            "/download/cumulative_detections.csv",
            axum::routing::get(routes::download_cumulative_csv),
        )
        .route(
            "/download/cumulative.kml",
            axum::routing::get(routes::download_cumulative_kml),
        )
        .route(
            "/download/aliases",
            axum::routing::get(routes::download_aliases),
        )
        .with_state(state)
        .layer(cors)
}

/// Runtime options for the serve command.
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub devices: Vec<String>,
    pub webhook: Option<String>,
    pub stale_threshold: f64,
}

/// Start the web server and the ingest pipeline.
pub async fn serve(config: ServeConfig) -> Result<()> {
    let (state, ingest_rx) = AppState::new(&config.data_dir, config.stale_threshold)?;

    if let Some(url) = &config.webhook {
        *state.webhook.write().unwrap() = Some(WebhookDispatcher::new(url));
    }

    tokio::spawn(ingest::run_pipeline(Arc::clone(&state), ingest_rx));
    ingest::spawn_webhook_task(Arc::clone(&state));
    ingest::spawn_export_task(Arc::clone(&state));

    if !config.devices.is_empty() {
        start_sensors(&state, config.devices);
    }

    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!("rid-mapper listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(rid_core::RidError::Io)?;
    Ok(())
}
