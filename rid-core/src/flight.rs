//! Flight segmentation and polyline helpers.
//!
//! A "flight" is a maximal run of time-contiguous valid-position points
//! for one device. A gap strictly greater than the stale threshold
//! breaks the flight; a gap exactly equal to it does not.

use crate::record::DetectionRecord;

/// One valid-position point, KML coordinate order (lon first).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightPoint {
    pub lon: f64,
    pub lat: f64,
    pub ts: f64,
}

/// Drone points for one mac, in history order, no-fix records excluded.
pub fn drone_points(history: &[DetectionRecord], mac: &str) -> Vec<FlightPoint> {
    history
        .iter()
        .filter(|d| d.mac == mac && d.has_fix())
        .map(|d| FlightPoint {
            lon: d.drone_long,
            lat: d.drone_lat,
            ts: d.last_update,
        })
        .collect()
}

/// Pilot points for one mac inside a closed `[start_ts, end_ts]` window.
pub fn pilot_points_between(
    history: &[DetectionRecord],
    mac: &str,
    start_ts: f64,
    end_ts: f64,
) -> Vec<(f64, f64)> {
    history
        .iter()
        .filter(|d| {
            d.mac == mac
                && d.has_pilot_fix()
                && d.last_update >= start_ts
                && d.last_update <= end_ts
        })
        .map(|d| (d.pilot_long, d.pilot_lat))
        .collect()
}

/// Split a time-ordered point sequence into flights.
///
/// The boundary is exclusive: `gap > stale_threshold` breaks, `gap ==
/// stale_threshold` does not.
pub fn segment_flights(points: &[FlightPoint], stale_threshold: f64) -> Vec<Vec<FlightPoint>> {
    let mut flights = Vec::new();
    let mut current: Vec<FlightPoint> = Vec::new();
    let mut last_ts: Option<f64> = None;

    for p in points {
        if let Some(prev) = last_ts {
            if p.ts - prev > stale_threshold && !current.is_empty() {
                flights.push(std::mem::take(&mut current));
            }
        }
        current.push(*p);
        last_ts = Some(p.ts);
    }
    if !current.is_empty() {
        flights.push(current);
    }
    flights
}

/// Collapse consecutive equal points of a polyline.
pub fn dedupe_path(path: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut out: Vec<[f64; 2]> = Vec::with_capacity(path.len());
    for p in path {
        if out.last() != Some(p) {
            out.push(*p);
        }
    }
    out
}

/// Per-mac drone polyline (`[lat, long]` pairs) from history, deduplicated.
pub fn drone_path(history: &[DetectionRecord], mac: &str) -> Vec<[f64; 2]> {
    let raw: Vec<[f64; 2]> = history
        .iter()
        .filter(|d| d.mac == mac && d.has_fix())
        .map(|d| [d.drone_lat, d.drone_long])
        .collect();
    dedupe_path(&raw)
}

/// Per-mac pilot polyline (`[lat, long]` pairs) from history, deduplicated.
pub fn pilot_path(history: &[DetectionRecord], mac: &str) -> Vec<[f64; 2]> {
    let raw: Vec<[f64; 2]> = history
        .iter()
        .filter(|d| d.mac == mac && d.has_pilot_fix())
        .map(|d| [d.pilot_lat, d.pilot_long])
        .collect();
    dedupe_path(&raw)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(ts: f64) -> FlightPoint {
        FlightPoint {
            lon: -82.5,
            lat: 35.5,
            ts,
        }
    }

    #[test]
    fn test_small_gap_same_flight() {
        let flights = segment_flights(&[pt(0.0), pt(30.0)], 60.0);
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].len(), 2);
    }

    #[test]
    fn test_large_gap_breaks_flight() {
        let flights = segment_flights(&[pt(0.0), pt(30.0), pt(200.0)], 60.0);
        assert_eq!(flights.len(), 2);
        assert_eq!(flights[0].len(), 2);
        assert_eq!(flights[1].len(), 1);
    }

    #[test]
    fn test_boundary_gap_is_exclusive() {
        // Gap of exactly the threshold stays in the same flight.
        let flights = segment_flights(&[pt(30.0), pt(90.0)], 60.0);
        assert_eq!(flights.len(), 1);

        let flights = segment_flights(&[pt(30.0), pt(90.001)], 60.0);
        assert_eq!(flights.len(), 2);
    }

    #[test]
    fn test_identical_timestamp_no_spurious_break() {
        let flights = segment_flights(&[pt(10.0), pt(10.0)], 60.0);
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(segment_flights(&[], 60.0).is_empty());
    }

    #[test]
    fn test_dedupe_collapses_consecutive_only() {
        let path = [[1.0, 2.0], [1.0, 2.0], [3.0, 4.0], [1.0, 2.0]];
        let out = dedupe_path(&path);
        assert_eq!(out, vec![[1.0, 2.0], [3.0, 4.0], [1.0, 2.0]]);
    }

    #[test]
    fn test_drone_points_skip_no_fix() {
        let mut a = DetectionRecord::new("AA");
        a.drone_lat = 1.0;
        a.drone_long = 2.0;
        a.last_update = 10.0;
        let mut no_fix = DetectionRecord::new("AA");
        no_fix.last_update = 20.0;
        let mut other = DetectionRecord::new("BB");
        other.drone_lat = 9.0;
        other.drone_long = 9.0;
        other.last_update = 30.0;

        let history = vec![a, no_fix, other];
        let pts = drone_points(&history, "AA");
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].ts, 10.0);
    }

    #[test]
    fn test_pilot_window_is_closed() {
        let mut recs = Vec::new();
        for ts in [10.0, 20.0, 30.0] {
            let mut r = DetectionRecord::new("AA");
            r.pilot_lat = 5.0;
            r.pilot_long = 6.0;
            r.last_update = ts;
            recs.push(r);
        }
        let pts = pilot_points_between(&recs, "AA", 10.0, 20.0);
        assert_eq!(pts.len(), 2);
    }
}
