//! Live-state merge authority.
//!
//! Pure state — no I/O. `update()` merges one record into the live map
//! and history, and returns an `UpdateOutcome` describing the side
//! effects the caller should run (CSV rows, cache persistence, webhook).
//!
//! Merge rules: a record lacking a remote ID never erases a known one
//! for the same mac, and a record lacking registry metadata never erases
//! known metadata. History is append-only.

use serde_json::Value;
use std::collections::HashMap;

use crate::cache::MetadataCache;
use crate::record::DetectionRecord;

/// How an accepted record relates to what was already tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// First time seeing this mac.
    New,
    /// Seen recently; routine update.
    Known,
    /// Seen before, but the previous entry had gone stale.
    Reacquired,
    /// Position fields are the zero/zero sentinel.
    NoFix,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::Known => "known",
            Classification::Reacquired => "reacquired",
            Classification::NoFix => "no-fix",
        }
    }
}

/// Cache write-back the caller should persist to the durable cache file.
#[derive(Debug, Clone)]
pub struct CacheWrite {
    pub mac: String,
    pub remote_id: String,
    pub payload: Value,
}

/// Result of a successful merge, for the caller to act on.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub classification: Classification,
    /// The merged record as stored in live state.
    pub record: DetectionRecord,
    pub cache_write: Option<CacheWrite>,
}

/// Live state + append-only history + registry cache.
pub struct DetectionStore {
    live: HashMap<String, DetectionRecord>,
    history: Vec<DetectionRecord>,
    pub cache: MetadataCache,
    /// Seconds of silence after which a device is considered stale.
    /// Runtime-adjustable; also the flight-segmentation gap threshold.
    pub stale_threshold: f64,
}

pub const DEFAULT_STALE_THRESHOLD: f64 = 60.0;

impl DetectionStore {
    pub fn new(stale_threshold: f64) -> Self {
        Self::with_cache(stale_threshold, MetadataCache::new())
    }

    pub fn with_cache(stale_threshold: f64, cache: MetadataCache) -> Self {
        DetectionStore {
            live: HashMap::new(),
            history: Vec::new(),
            cache,
            stale_threshold,
        }
    }

    /// Merge one record. The sole mutation entry point for live state.
    ///
    /// Returns `None` for records without a mac (silent drop). No-fix
    /// records are stored as-is for their diagnostic value but are
    /// excluded from flight construction by the export side.
    pub fn update(&mut self, mut record: DetectionRecord, now: f64) -> Option<UpdateOutcome> {
        if record.mac.is_empty() {
            return None;
        }
        if record.last_update == 0.0 {
            record.last_update = now;
        }

        let prev = self.live.get(&record.mac).cloned();

        if !record.has_fix() {
            // Keep the record untouched; it still carries RSSI/remote ID.
            let cache_write = match (record.basic_id(), &record.faa_data) {
                (Some(rid), Some(data)) => {
                    self.cache.insert(&record.mac, rid, data.clone());
                    Some(CacheWrite {
                        mac: record.mac.clone(),
                        remote_id: rid.to_string(),
                        payload: data.clone(),
                    })
                }
                _ => None,
            };
            self.live.insert(record.mac.clone(), record.clone());
            self.history.push(record.clone());
            return Some(UpdateOutcome {
                classification: Classification::NoFix,
                record,
                cache_write,
            });
        }

        let classification = match &prev {
            None => Classification::New,
            Some(p) if record.last_update - p.last_update > self.stale_threshold => {
                Classification::Reacquired
            }
            Some(_) => Classification::Known,
        };

        // Carry the remote ID forward across fragments that omit it.
        if record.basic_id().is_none() {
            if let Some(prev_id) = prev.as_ref().and_then(|p| p.basic_id()) {
                record.basic_id = Some(prev_id.to_string());
            }
        }

        // Registry metadata cascade: exact cache key, then any cache
        // entry for this mac, then whatever the previous entry carried.
        if record.faa_data.is_none() {
            record.faa_data = record
                .basic_id()
                .and_then(|rid| self.cache.get_exact(&record.mac, rid))
                .cloned()
                .or_else(|| self.cache.get_by_mac(&record.mac).cloned())
                .or_else(|| prev.as_ref().and_then(|p| p.faa_data.clone()));
        }

        let cache_write = record.faa_data.clone().map(|data| {
            let rid = record.basic_id().unwrap_or("").to_string();
            self.cache.insert(&record.mac, &rid, data.clone());
            CacheWrite {
                mac: record.mac.clone(),
                remote_id: rid,
                payload: data,
            }
        });

        self.live.insert(record.mac.clone(), record.clone());
        self.history.push(record.clone());

        Some(UpdateOutcome {
            classification,
            record,
            cache_write,
        })
    }

    /// Deep copy of live state for polling clients.
    pub fn live_snapshot(&self) -> HashMap<String, DetectionRecord> {
        self.live.clone()
    }

    pub fn get_live(&self, mac: &str) -> Option<&DetectionRecord> {
        self.live.get(mac)
    }

    pub fn live_values(&self) -> impl Iterator<Item = &DetectionRecord> {
        self.live.values()
    }

    /// Append-only history, in arrival order.
    pub fn history(&self) -> &[DetectionRecord] {
        &self.history
    }

    /// Bump `last_update` on a tracked mac. Returns false if unknown.
    pub fn reactivate(&mut self, mac: &str, now: f64) -> bool {
        match self.live.get_mut(mac) {
            Some(rec) => {
                rec.last_update = now;
                true
            }
            None => false,
        }
    }

    /// Attach resolved registry metadata to a mac (creating a stub live
    /// entry if the mac was never detected) and cache it.
    pub fn set_faa_data(&mut self, mac: &str, remote_id: &str, payload: Value) {
        let entry = self.live.entry(mac.to_string()).or_insert_with(|| {
            let mut rec = DetectionRecord::new(mac);
            rec.basic_id = Some(remote_id.to_string());
            rec
        });
        entry.faa_data = Some(payload.clone());
        self.cache.insert(mac, remote_id, payload);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
