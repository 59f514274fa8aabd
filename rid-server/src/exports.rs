//! Session and cumulative CSV/KML export files.
//!
//! Each run opens a fresh timestamped session CSV/KML pair and keeps
//! appending to the cumulative pair. CSV rows are appended as detections
//! merge; KML is regenerated from history, driven by a dirty flag rather
//! than per record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use rid_core::csvio;
use rid_core::kml;
use rid_core::types::{iso_timestamp, Result};
use rid_core::DetectionRecord;

use crate::persist;

pub const SESSION_KML_TITLE: &str = "Detections";
pub const CUMULATIVE_KML_TITLE: &str = "Cumulative Detections";

/// Owns the four export file paths and the KML dirty flag.
pub struct Exporter {
    session_csv: PathBuf,
    session_kml: PathBuf,
    cumulative_csv: PathBuf,
    cumulative_kml: PathBuf,
    dirty: AtomicBool,
}

impl Exporter {
    /// Create export files under `data_dir`.
    ///
    /// The session pair is stamped with the start time; both KML files
    /// are written as empty shells so download links work immediately.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let session_csv = data_dir.join(format!("detections_{stamp}.csv"));
        let session_kml = data_dir.join(format!("detections_{stamp}.kml"));
        let cumulative_csv = data_dir.join("cumulative_detections.csv");
        let cumulative_kml = data_dir.join("cumulative.kml");

        std::fs::write(&session_csv, format!("{}\n", csvio::header()))?;
        std::fs::write(&session_kml, kml::empty_document(SESSION_KML_TITLE))?;
        if !cumulative_csv.exists() {
            std::fs::write(&cumulative_csv, format!("{}\n", csvio::header()))?;
        }
        if !cumulative_kml.exists() {
            std::fs::write(&cumulative_kml, kml::empty_document(CUMULATIVE_KML_TITLE))?;
        }

        info!("session exports: {}", session_csv.display());

        Ok(Exporter {
            session_csv,
            session_kml,
            cumulative_csv,
            cumulative_kml,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn session_csv_path(&self) -> &Path {
        &self.session_csv
    }

    pub fn session_kml_path(&self) -> &Path {
        &self.session_kml
    }

    pub fn cumulative_csv_path(&self) -> &Path {
        &self.cumulative_csv
    }

    pub fn cumulative_kml_path(&self) -> &Path {
        &self.cumulative_kml
    }

    /// Append one merged detection to both CSVs and mark the KML stale.
    ///
    /// The row timestamp is the record's observation time, so cumulative
    /// KML rebuilt from the CSV keeps the original flight gaps. The two
    /// appends are independent; a failure in one does not block the other.
    pub fn append_row(&self, record: &DetectionRecord, alias: &str) {
        let row = csvio::detection_row(record, alias, &iso_timestamp(record.last_update));
        if let Err(e) = append_line(&self.session_csv, &row) {
            warn!("session CSV append failed: {e}");
        }
        if let Err(e) = append_line(&self.cumulative_csv, &row) {
            warn!("cumulative CSV append failed: {e}");
        }
        self.mark_dirty();
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Consume the dirty flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::Relaxed)
    }

    /// Rewrite the session KML from in-memory history.
    pub fn regenerate_session(
        &self,
        history: &[DetectionRecord],
        aliases: &HashMap<String, String>,
        stale_threshold: f64,
    ) -> Result<()> {
        let doc = kml::build_document(SESSION_KML_TITLE, history, aliases, stale_threshold);
        std::fs::write(&self.session_kml, doc)?;
        Ok(())
    }

    /// Rewrite the cumulative KML from the cumulative CSV.
    pub fn regenerate_cumulative(
        &self,
        aliases: &HashMap<String, String>,
        stale_threshold: f64,
    ) -> Result<()> {
        let history = persist::load_cumulative_history(&self.cumulative_csv);
        let doc = kml::build_document(CUMULATIVE_KML_TITLE, &history, aliases, stale_threshold);
        std::fs::write(&self.cumulative_kml, doc)?;
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
