//! KML document generation.
//!
//! Each mac gets an evenly spaced hue over the set of macs present in
//! the rendered history; session and cumulative exports run this
//! assignment independently, so the same mac may get different colors in
//! the two files. Flights are rendered one folder each: drone path,
//! end-of-flight marker, and a pilot sub-path clipped to the flight's
//! time window.

use std::collections::HashMap;

use crate::flight::{drone_points, pilot_points_between, segment_flights};
use crate::record::DetectionRecord;
use crate::types::format_timestamp;

const DRONE_END_ICON: &str = "http://maps.google.com/mapfiles/kml/shapes/heliport.png";
const PILOT_END_ICON: &str = "http://maps.google.com/mapfiles/kml/shapes/man.png";

/// HSV (all components 0..1) to RGB bytes.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let h = ((h % 1.0) + 1.0) % 1.0 * 6.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match i as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    (
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    )
}

/// KML color string: ABGR hex, full alpha.
pub fn abgr_color(r: u8, g: u8, b: u8) -> String {
    format!("ff{b:02x}{g:02x}{r:02x}")
}

/// Sorted unique macs present in a history slice.
pub fn macs_in_history(history: &[DetectionRecord]) -> Vec<String> {
    let mut macs: Vec<String> = history.iter().map(|d| d.mac.clone()).collect();
    macs.sort();
    macs.dedup();
    macs
}

/// One distinct color per mac: hue `i / n`, full saturation and value.
pub fn assign_colors(macs: &[String]) -> HashMap<String, String> {
    let n = macs.len().max(1);
    macs.iter()
        .enumerate()
        .map(|(i, m)| {
            let (r, g, b) = hsv_to_rgb(i as f64 / n as f64, 1.0, 1.0);
            (m.clone(), abgr_color(r, g, b))
        })
        .collect()
}

/// An empty document shell, written at startup so the file exists.
pub fn empty_document(title: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <kml xmlns=\"http://www.opengis.net/kml/2.2\" xmlns:gx=\"http://www.google.com/kml/ext/2.2\">\n\
         <Document>\n<name>{title}</name>\n</Document>\n</kml>"
    )
}

/// Render a full KML document from detection history.
///
/// Used for both the session export (in-memory history) and the
/// cumulative export (history reloaded from the cumulative CSV).
pub fn build_document(
    title: &str,
    history: &[DetectionRecord],
    aliases: &HashMap<String, String>,
    stale_threshold: f64,
) -> String {
    let macs = macs_in_history(history);
    let colors = assign_colors(&macs);

    let mut lines = vec![
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>".to_string(),
        "<kml xmlns=\"http://www.opengis.net/kml/2.2\" xmlns:gx=\"http://www.google.com/kml/ext/2.2\">".to_string(),
        "<Document>".to_string(),
        format!("<name>{title}</name>"),
    ];

    for mac in &macs {
        let alias = aliases.get(mac).map(String::as_str).unwrap_or("");
        let alias_str = if alias.is_empty() {
            String::new()
        } else {
            format!("{alias} ")
        };
        let color = &colors[mac];

        let points = drone_points(history, mac);
        for (i, flight) in segment_flights(&points, stale_threshold).iter().enumerate() {
            let idx = i + 1;
            let start = flight[0];
            let end = flight[flight.len() - 1];
            let start_str = format_timestamp(start.ts);

            lines.push("<Folder>".to_string());
            lines.push(format!(
                "<name>Flight {idx} {alias_str}{mac} ({start_str})</name>"
            ));

            let coords: Vec<String> = flight
                .iter()
                .map(|p| format!("{},{},0", p.lon, p.lat))
                .collect();
            lines.push(format!(
                "<Placemark><Style><LineStyle><color>{color}</color><width>2</width></LineStyle></Style>\
                 <LineString><tessellate>1</tessellate><coordinates>{}</coordinates></LineString></Placemark>",
                coords.join(" ")
            ));
            lines.push(format!(
                "<Placemark><name>Drone End {idx} {alias_str}{mac}</name>\
                 <Style><IconStyle><color>{color}</color><scale>1.2</scale><Icon><href>{DRONE_END_ICON}</href></Icon></IconStyle></Style>\
                 <Point><coordinates>{},{},0</coordinates></Point></Placemark>",
                end.lon, end.lat
            ));

            let pilot = pilot_points_between(history, mac, start.ts, end.ts);
            if !pilot.is_empty() {
                let pc: Vec<String> = pilot
                    .iter()
                    .map(|(lon, lat)| format!("{lon},{lat},0"))
                    .collect();
                lines.push(format!(
                    "<Placemark><name>Pilot Path {idx} {alias_str}{mac}</name>\
                     <Style><LineStyle><color>{color}</color><width>2</width><gx:dash/></LineStyle></Style>\
                     <LineString><tessellate>1</tessellate><coordinates>{}</coordinates></LineString></Placemark>",
                    pc.join(" ")
                ));
                let (plon, plat) = pilot[pilot.len() - 1];
                lines.push(format!(
                    "<Placemark><name>Pilot End {idx} {alias_str}{mac}</name>\
                     <Style><IconStyle><color>{color}</color><scale>1.2</scale><Icon><href>{PILOT_END_ICON}</href></Icon></IconStyle></Style>\
                     <Point><coordinates>{plon},{plat},0</coordinates></Point></Placemark>"
                ));
            }
            lines.push("</Folder>".to_string());
        }
    }

    lines.push("</Document></kml>".to_string());
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
