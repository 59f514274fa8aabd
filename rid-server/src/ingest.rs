//! Detection pipeline: merge, persist, broadcast.
//!
//! All mutation funnels through `apply_detection`, whether a record came
//! from a serial reader or an HTTP POST. Store and alias locks are
//! synchronous and MUST be dropped before any await.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;

use rid_core::types::now_unix;
use rid_core::DetectionRecord;

use crate::persist;
use crate::web::AppState;

/// One merged detection, as fanned out to webhook subscribers.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub record: DetectionRecord,
    pub event: &'static str,
}

const KML_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Merge one record into shared state and run its side effects.
///
/// Returns the classification tag, or `None` when the record was
/// dropped (no mac).
pub fn apply_detection(state: &AppState, record: DetectionRecord) -> Option<&'static str> {
    let outcome = {
        let mut store = state.store.write().unwrap();
        store.update(record, now_unix())?
    };

    let alias = {
        let aliases = state.aliases.read().unwrap();
        aliases.get(&outcome.record.mac).cloned().unwrap_or_default()
    };

    state.exporter.append_row(&outcome.record, &alias);

    if let Some(cw) = &outcome.cache_write {
        if let Err(e) =
            persist::append_faa_cache(&state.faa_cache_path, &cw.mac, &cw.remote_id, &cw.payload)
        {
            warn!("registry cache append failed: {e}");
        }
    }

    let tag = outcome.classification.as_str();
    // Only fails when nobody is subscribed, which is fine.
    let _ = state.events.send(DetectionEvent {
        record: outcome.record,
        event: tag,
    });
    Some(tag)
}

/// Consume records from the serial readers until every sender is gone.
pub async fn run_pipeline(state: Arc<AppState>, mut rx: mpsc::Receiver<DetectionRecord>) {
    while let Some(record) = rx.recv().await {
        apply_detection(&state, record);
    }
    debug!("ingest pipeline stopped");
}

/// Forward merged detections to the configured webhook, if any.
pub fn spawn_webhook_task(state: Arc<AppState>) {
    let mut events = state.events.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => {
                    let dispatcher = state.webhook.read().unwrap().clone();
                    if let Some(wh) = dispatcher {
                        wh.notify_tagged(&ev.record, ev.event);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("webhook fan-out lagged, {n} events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Periodically flush dirty KML files in the background.
pub fn spawn_export_task(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(KML_FLUSH_INTERVAL);
        loop {
            tick.tick().await;
            if state.exporter.take_dirty() {
                flush_kml(&state);
            }
        }
    });
}

/// Regenerate both KML files from current state.
pub fn flush_kml(state: &AppState) {
    let (history, stale_threshold) = {
        let store = state.store.read().unwrap();
        (store.history().to_vec(), store.stale_threshold)
    };
    let aliases = state.aliases.read().unwrap().clone();

    if let Err(e) = state
        .exporter
        .regenerate_session(&history, &aliases, stale_threshold)
    {
        warn!("session KML regenerate failed: {e}");
    }
    if let Err(e) = state
        .exporter
        .regenerate_cumulative(&aliases, stale_threshold)
    {
        warn!("cumulative KML regenerate failed: {e}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
