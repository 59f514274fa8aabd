//! On-disk state: aliases, registry cache, and query log.
//!
//! All files live under the data directory. The alias map is a JSON
//! object rewritten whole on every change; the registry cache and query
//! log are append-only CSVs.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use log::warn;
use serde_json::Value;

use rid_core::csvio;
use rid_core::types::{format_timestamp, now_unix, parse_iso_timestamp, Result, RidError};
use rid_core::{DetectionRecord, MetadataCache};

const FAA_CACHE_HEADER: &str = "mac,basic_id,faa_json";
const FAA_LOG_HEADER: &str = "timestamp,mac,remote_id,result";

/// Load the mac-to-alias map, or empty when the file is absent.
pub fn load_aliases(path: &Path) -> HashMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
        Err(_) => HashMap::new(),
    }
}

/// Rewrite the alias file in full.
pub fn save_aliases(path: &Path, aliases: &HashMap<String, String>) -> Result<()> {
    let text = serde_json::to_string_pretty(aliases)
        .map_err(|e| RidError::Parse(e.to_string()))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Load the registry cache from its append-only CSV.
///
/// Later rows win on duplicate keys, so re-queried payloads supersede
/// stale ones without compaction. Malformed rows are skipped.
pub fn load_faa_cache(path: &Path) -> MetadataCache {
    let mut cache = MetadataCache::new();
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return cache,
    };

    for line in text.lines().skip(1) {
        let fields = csvio::split_line(line);
        if fields.len() != 3 {
            continue;
        }
        match serde_json::from_str::<Value>(&fields[2]) {
            Ok(payload) => cache.insert(&fields[0], &fields[1], payload),
            Err(_) => warn!("skipping malformed registry cache row"),
        }
    }
    cache
}

/// Append one registry cache row, creating the file with a header first.
pub fn append_faa_cache(path: &Path, mac: &str, remote_id: &str, payload: &Value) -> Result<()> {
    let mut file = open_append_with_header(path, FAA_CACHE_HEADER)?;
    let row = [
        csvio::escape_field(mac),
        csvio::escape_field(remote_id),
        csvio::escape_field(&payload.to_string()),
    ]
    .join(",");
    writeln!(file, "{row}")?;
    Ok(())
}

/// Append one row to the registry query log.
pub fn append_faa_log(path: &Path, mac: &str, remote_id: &str, result: &Value) -> Result<()> {
    let mut file = open_append_with_header(path, FAA_LOG_HEADER)?;
    let row = [
        csvio::escape_field(&format_timestamp(now_unix())),
        csvio::escape_field(mac),
        csvio::escape_field(remote_id),
        csvio::escape_field(&result.to_string()),
    ]
    .join(",");
    writeln!(file, "{row}")?;
    Ok(())
}

/// Rebuild detection history from the cumulative CSV.
///
/// The row's timestamp column becomes `last_update` so flight
/// segmentation sees the original observation times.
pub fn load_cumulative_history(path: &Path) -> Vec<DetectionRecord> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => return Vec::new(),
    };
    text.lines()
        .skip(1)
        .filter_map(csvio::parse_detection_row)
        .map(|(ts, mut rec)| {
            if let Some(unix) = parse_iso_timestamp(&ts) {
                rec.last_update = unix;
            }
            rec
        })
        .collect()
}

fn open_append_with_header(path: &Path, header: &str) -> Result<std::fs::File> {
    let need_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if need_header {
        writeln!(file, "{header}")?;
    }
    Ok(file)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
