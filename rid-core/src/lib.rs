//! rid-core: Pure detection-merging + export library for drone Remote ID.
//!
//! No async, no network I/O — just algorithms and file formats. This crate
//! is the shared core used by both `rid-sensor` (serial capture) and
//! `rid-server` (web server + CLI).

pub mod cache;
pub mod config;
pub mod csvio;
pub mod flight;
pub mod kml;
pub mod record;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use cache::MetadataCache;
pub use record::DetectionRecord;
pub use store::{Classification, DetectionStore, UpdateOutcome, DEFAULT_STALE_THRESHOLD};
pub use types::*;
