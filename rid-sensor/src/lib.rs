//! rid-sensor: Serial capture of Remote ID detections.
//!
//! Sensor boards emit JSON objects one per line over USB serial. This
//! crate owns line normalization, fragment stitching, and the reconnecting
//! reader tasks; merging and persistence live in `rid-server`.

pub mod frame;
pub mod reader;

pub use frame::{normalize_line, FragmentStitcher};
pub use reader::{list_ports, run_reader, PortInfo, StatusMap};
