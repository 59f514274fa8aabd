//! Minimal CSV codec for the detection exports.
//!
//! Fields containing commas, quotes, or newlines are double-quoted with
//! embedded quotes doubled. `split_line` is the inverse, tolerant of the
//! files this crate itself writes.

use serde_json::Value;

use crate::record::DetectionRecord;

/// Column order of both the session and cumulative detection CSVs.
pub const DETECTION_COLUMNS: [&str; 11] = [
    "timestamp",
    "alias",
    "mac",
    "rssi",
    "drone_lat",
    "drone_long",
    "drone_altitude",
    "pilot_lat",
    "pilot_long",
    "basic_id",
    "faa_data",
];

pub fn header() -> String {
    DETECTION_COLUMNS.join(",")
}

/// Quote a field when needed, doubling embedded quotes.
pub fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line into fields, honoring quoting.
pub fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

/// Render one export row for a detection.
pub fn detection_row(record: &DetectionRecord, alias: &str, timestamp: &str) -> String {
    let faa = record
        .faa_data
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    let fields = [
        timestamp.to_string(),
        alias.to_string(),
        record.mac.clone(),
        fmt_opt(record.rssi),
        record.drone_lat.to_string(),
        record.drone_long.to_string(),
        record.drone_altitude.to_string(),
        record.pilot_lat.to_string(),
        record.pilot_long.to_string(),
        record.basic_id.clone().unwrap_or_default(),
        faa,
    ];
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse one detection row back into a record plus its timestamp field.
///
/// Used to rebuild history from the cumulative CSV at startup and when
/// regenerating the cumulative KML. Malformed rows yield `None`.
pub fn parse_detection_row(line: &str) -> Option<(String, DetectionRecord)> {
    let fields = split_line(line);
    if fields.len() != DETECTION_COLUMNS.len() {
        return None;
    }
    let mac = fields[2].trim();
    if mac.is_empty() {
        return None;
    }

    let num = |s: &str| s.trim().parse::<f64>().unwrap_or(0.0);
    let mut record = DetectionRecord::new(mac);
    record.rssi = fields[3].trim().parse::<f64>().ok();
    record.drone_lat = num(&fields[4]);
    record.drone_long = num(&fields[5]);
    record.drone_altitude = num(&fields[6]);
    record.pilot_lat = num(&fields[7]);
    record.pilot_long = num(&fields[8]);
    if !fields[9].trim().is_empty() {
        record.basic_id = Some(fields[9].trim().to_string());
    }
    if !fields[10].trim().is_empty() {
        record.faa_data = serde_json::from_str::<Value>(fields[10].trim()).ok();
    }
    Some((fields[0].clone(), record))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
