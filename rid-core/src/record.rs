//! The detection record: one observation of a Remote ID broadcast.
//!
//! Sensors emit these as JSON, one object per line. `(0, 0)` drone or
//! pilot coordinates are the "no position fix" sentinel, never a real
//! location. Unrecognized diagnostic fields are kept in the `extra` bag
//! and travel through merge, live state, and export untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One observation of a device, keyed by hardware (MAC) address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionRecord {
    #[serde(default)]
    pub mac: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<f64>,
    #[serde(default)]
    pub drone_lat: f64,
    #[serde(default)]
    pub drone_long: f64,
    #[serde(default)]
    pub drone_altitude: f64,
    #[serde(default)]
    pub pilot_lat: f64,
    #[serde(default)]
    pub pilot_long: f64,
    /// Broadcast Remote ID (aka basic ID). May arrive on a later
    /// fragment than the position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_id: Option<String>,
    /// Registry metadata resolved externally; sticky once attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faa_data: Option<Value>,
    /// Unix seconds of the last merge for this mac.
    #[serde(default)]
    pub last_update: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Passthrough for diagnostic fields the schema doesn't know.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DetectionRecord {
    pub fn new(mac: &str) -> Self {
        DetectionRecord {
            mac: mac.to_string(),
            ..Default::default()
        }
    }

    /// True when the drone position is not the no-fix sentinel.
    pub fn has_fix(&self) -> bool {
        self.drone_lat != 0.0 || self.drone_long != 0.0
    }

    /// True when the pilot position is not the no-fix sentinel.
    pub fn has_pilot_fix(&self) -> bool {
        self.pilot_lat != 0.0 || self.pilot_long != 0.0
    }

    /// Remote ID, treating an empty string as absent.
    pub fn basic_id(&self) -> Option<&str> {
        self.basic_id.as_deref().filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
