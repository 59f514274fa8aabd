//! Serial line normalization and fragment stitching.
//!
//! Sensor firmware interleaves debug output with JSON, sometimes on the
//! same line, and splits one logical detection across lines: the
//! position fragment carries the mac, a later Remote ID fragment may
//! not. The stitcher remembers the last mac seen on its port and
//! attaches it to mac-less fragments.

use serde_json::Value;

use rid_core::DetectionRecord;

/// Strip debug noise from a serial line, keeping the JSON tail.
///
/// Returns `None` when the line holds no JSON object at all.
pub fn normalize_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.find('{').map(|i| &trimmed[i..])
}

/// Per-port stitching state.
#[derive(Debug, Default)]
pub struct FragmentStitcher {
    last_mac: Option<String>,
}

impl FragmentStitcher {
    pub fn new() -> Self {
        FragmentStitcher::default()
    }

    /// Turn one raw serial line into a detection, if it carries one.
    ///
    /// Heartbeat objects are dropped. A `remote_id` key is folded into
    /// `basic_id`. Fragments without a mac inherit the port's last seen
    /// mac; with no mac at all the fragment is unusable and dropped.
    pub fn process(&mut self, line: &str) -> Option<DetectionRecord> {
        let json = normalize_line(line)?;
        let value: Value = serde_json::from_str(json).ok()?;
        let mut obj = match value {
            Value::Object(o) => o,
            _ => return None,
        };

        if obj.contains_key("heartbeat") {
            return None;
        }

        if let Some(rid) = obj.remove("remote_id") {
            obj.entry("basic_id").or_insert(rid);
        }

        match obj.get("mac").and_then(Value::as_str) {
            Some(mac) if !mac.is_empty() => {
                self.last_mac = Some(mac.to_string());
            }
            _ => {
                let mac = self.last_mac.clone()?;
                obj.insert("mac".into(), Value::String(mac));
            }
        }

        serde_json::from_value(Value::Object(obj)).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_debug_prefix() {
        assert_eq!(
            normalize_line("[INFO] rx: {\"mac\":\"AA\"}"),
            Some("{\"mac\":\"AA\"}")
        );
        assert_eq!(normalize_line("  {\"mac\":\"AA\"}  "), Some("{\"mac\":\"AA\"}"));
    }

    #[test]
    fn test_normalize_rejects_noise() {
        assert!(normalize_line("").is_none());
        assert!(normalize_line("   ").is_none());
        assert!(normalize_line("boot ok, no json here").is_none());
    }

    #[test]
    fn test_heartbeat_dropped() {
        let mut st = FragmentStitcher::new();
        assert!(st.process(r#"{"heartbeat": 1}"#).is_none());
    }

    #[test]
    fn test_remote_id_renamed() {
        let mut st = FragmentStitcher::new();
        let rec = st
            .process(r#"{"mac":"AA:BB","remote_id":"RID7"}"#)
            .unwrap();
        assert_eq!(rec.basic_id.as_deref(), Some("RID7"));
    }

    #[test]
    fn test_macless_fragment_inherits_last_mac() {
        let mut st = FragmentStitcher::new();
        let first = st
            .process(r#"{"mac":"AA:BB","drone_lat":35.5,"drone_long":-82.5}"#)
            .unwrap();
        assert_eq!(first.mac, "AA:BB");

        let second = st.process(r#"{"remote_id":"RID7","rssi":-70}"#).unwrap();
        assert_eq!(second.mac, "AA:BB");
        assert_eq!(second.basic_id.as_deref(), Some("RID7"));
    }

    #[test]
    fn test_macless_fragment_with_no_history_dropped() {
        let mut st = FragmentStitcher::new();
        assert!(st.process(r#"{"rssi":-70}"#).is_none());
    }

    #[test]
    fn test_invalid_json_dropped() {
        let mut st = FragmentStitcher::new();
        assert!(st.process(r#"{"mac":"AA:BB", truncated"#).is_none());
    }

    #[test]
    fn test_extra_fields_survive() {
        let mut st = FragmentStitcher::new();
        let rec = st
            .process(r#"{"mac":"AA:BB","channel":6,"op_id":"X"}"#)
            .unwrap();
        assert_eq!(rec.extra["channel"], 6);
        assert_eq!(rec.extra["op_id"], "X");
    }
}
