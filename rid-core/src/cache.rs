//! Registry metadata cache, keyed by `(mac, remote_id)`.
//!
//! A mac-only lookup serves as the fallback path when no exact composite
//! key matches. Persistence (the append-only `faa_cache.csv`) is owned by
//! the server; this is the in-memory structure and its lookup rules.

use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<(String, String), Value>,
}

impl MetadataCache {
    pub fn new() -> Self {
        MetadataCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the payload for `(mac, remote_id)`.
    pub fn insert(&mut self, mac: &str, remote_id: &str, payload: Value) {
        self.entries
            .insert((mac.to_string(), remote_id.to_string()), payload);
    }

    /// Exact composite-key lookup.
    pub fn get_exact(&self, mac: &str, remote_id: &str) -> Option<&Value> {
        self.entries
            .get(&(mac.to_string(), remote_id.to_string()))
    }

    /// Fallback: any entry whose key's mac matches.
    pub fn get_by_mac(&self, mac: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|((m, _), _)| m == mac)
            .map(|(_, v)| v)
    }

    /// Fallback: any entry whose key's remote ID matches.
    pub fn get_by_remote_id(&self, remote_id: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|((_, r), _)| r == remote_id)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(String, String), &Value)> {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exact_lookup() {
        let mut cache = MetadataCache::new();
        cache.insert("AA", "R1", json!({"makeName": "Alpha"}));
        assert_eq!(
            cache.get_exact("AA", "R1").unwrap()["makeName"],
            "Alpha"
        );
        assert!(cache.get_exact("AA", "R2").is_none());
    }

    #[test]
    fn test_mac_fallback_without_exact_match() {
        let mut cache = MetadataCache::new();
        cache.insert("AA", "R2", json!({"makeName": "Beta"}));

        // No (AA, R1) entry, but the mac-only path finds the R2 payload.
        assert!(cache.get_exact("AA", "R1").is_none());
        assert_eq!(cache.get_by_mac("AA").unwrap()["makeName"], "Beta");
        assert!(cache.get_by_mac("BB").is_none());
    }

    #[test]
    fn test_remote_id_lookup() {
        let mut cache = MetadataCache::new();
        cache.insert("AA", "R1", json!({"modelName": "X"}));
        assert_eq!(cache.get_by_remote_id("R1").unwrap()["modelName"], "X");
        assert!(cache.get_by_remote_id("R9").is_none());
    }

    #[test]
    fn test_insert_replaces() {
        let mut cache = MetadataCache::new();
        cache.insert("AA", "R1", json!({"v": 1}));
        cache.insert("AA", "R1", json!({"v": 2}));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_exact("AA", "R1").unwrap()["v"], 2);
    }
}
