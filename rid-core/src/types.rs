//! Shared error enum and timestamp helpers for rid-core.

use thiserror::Error;

/// All errors produced by the rid-mapper crates.
#[derive(Debug, Error)]
pub enum RidError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("malformed data: {0}")]
    Parse(String),
    #[error("registry error: {0}")]
    Registry(String),
}

pub type Result<T> = std::result::Result<T, RidError>;

/// Current wall clock as unix seconds.
pub fn now_unix() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Format a unix timestamp as `YYYY-MM-DD HH:MM:SS` UTC (flight labels).
pub fn format_timestamp(ts: f64) -> String {
    chrono::DateTime::from_timestamp(ts as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "invalid".into())
}

/// ISO-8601 form used for CSV rows.
pub fn iso_timestamp(ts: f64) -> String {
    chrono::DateTime::from_timestamp_micros((ts * 1e6) as i64)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| "invalid".into())
}

/// Parse an ISO-8601 timestamp (as written by [`iso_timestamp`]) back to
/// unix seconds. Returns `None` on anything unparsable.
pub fn parse_iso_timestamp(s: &str) -> Option<f64> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp_micros() as f64 / 1e6)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
