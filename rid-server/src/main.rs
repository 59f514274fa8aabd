//! rid-mapper: CLI + web server for drone Remote ID mapping.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};

use rid_core::config;
use rid_core::kml;
use rid_core::types::format_timestamp;
use rid_core::DetectionRecord;

mod exports;
mod faa;
mod ingest;
mod notify;
mod persist;
mod web;

#[derive(Parser)]
#[command(name = "rid-mapper", version, about = "Remote ID detection mapper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web dashboard and serial ingestion
    Serve {
        /// Serial device paths (up to three; overrides config file)
        #[arg(short, long)]
        device: Vec<String>,

        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Dashboard port
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for CSV/KML exports and persisted state
        #[arg(long, env = "RID_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Webhook URL for detection events
        #[arg(long)]
        webhook: Option<String>,

        /// Seconds of silence before a device counts as stale
        #[arg(long)]
        stale_threshold: Option<f64>,
    },

    /// Rebuild the cumulative KML from the cumulative CSV
    Export {
        /// Data directory holding cumulative_detections.csv
        #[arg(long, env = "RID_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,
    },

    /// Summarize detections recorded in the cumulative CSV
    Stats {
        /// Data directory holding cumulative_detections.csv
        #[arg(long, env = "RID_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            device,
            host,
            port,
            data_dir,
            webhook,
            stale_threshold,
        } => cmd_serve(device, host, port, data_dir, webhook, stale_threshold).await,
        Commands::Export { data_dir } => cmd_export(data_dir),
        Commands::Stats { data_dir } => cmd_stats(data_dir),
    }
}

async fn cmd_serve(
    device: Vec<String>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    webhook: Option<String>,
    stale_threshold: Option<f64>,
) {
    let file_config = config::load_config();

    let devices = if device.is_empty() {
        file_config.serial.ports()
    } else {
        device
    };

    let serve_config = web::ServeConfig {
        host: host.unwrap_or(file_config.dashboard.host),
        port: port.unwrap_or(file_config.dashboard.port),
        data_dir: data_dir.unwrap_or_else(|| PathBuf::from(&file_config.data_dir)),
        devices,
        webhook: webhook.or(file_config.webhook),
        stale_threshold: stale_threshold.unwrap_or(file_config.stale_threshold),
    };

    if let Err(e) = web::serve(serve_config).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_export(data_dir: PathBuf) {
    let csv_path = data_dir.join("cumulative_detections.csv");
    let history = persist::load_cumulative_history(&csv_path);
    if history.is_empty() {
        eprintln!("No detections in {}", csv_path.display());
        std::process::exit(1);
    }

    let aliases = persist::load_aliases(&data_dir.join("aliases.json"));
    let doc = kml::build_document(
        exports::CUMULATIVE_KML_TITLE,
        &history,
        &aliases,
        config::load_config().stale_threshold,
    );
    let out = data_dir.join("cumulative.kml");
    if let Err(e) = std::fs::write(&out, doc) {
        eprintln!("Error writing {}: {e}", out.display());
        std::process::exit(1);
    }

    println!(
        "Wrote {} ({} detections, {} devices)",
        out.display(),
        history.len(),
        kml::macs_in_history(&history).len()
    );
}

fn cmd_stats(data_dir: PathBuf) {
    let csv_path = data_dir.join("cumulative_detections.csv");
    let history = persist::load_cumulative_history(&csv_path);
    let aliases = persist::load_aliases(&data_dir.join("aliases.json"));

    println!();
    println!("Cumulative CSV: {}", csv_path.display());
    println!("  Detections: {}", history.len());

    if history.is_empty() {
        return;
    }

    // Per-device rollup in history order.
    let mut per_mac: HashMap<String, DeviceSummary> = HashMap::new();
    for rec in &history {
        let entry = per_mac
            .entry(rec.mac.clone())
            .or_insert_with(|| DeviceSummary::new(rec));
        entry.update(rec);
    }
    println!("  Devices:    {}", per_mac.len());
    println!();

    let mut table = Table::new();
    table.set_header(vec![
        "MAC", "Alias", "Remote ID", "Make", "Model", "Detections", "First seen", "Last seen",
    ]);

    let mut sorted: Vec<_> = per_mac.into_iter().collect();
    sorted.sort_by(|a, b| b.1.detections.cmp(&a.1.detections));

    for (mac, summary) in sorted {
        table.add_row(vec![
            Cell::new(&mac),
            Cell::new(aliases.get(&mac).map(String::as_str).unwrap_or("-")),
            Cell::new(summary.basic_id.as_deref().unwrap_or("-")),
            Cell::new(summary.make.as_deref().unwrap_or("-")),
            Cell::new(summary.model.as_deref().unwrap_or("-")),
            Cell::new(summary.detections),
            Cell::new(format_timestamp(summary.first_seen)),
            Cell::new(format_timestamp(summary.last_seen)),
        ]);
    }

    println!("{table}");
}

struct DeviceSummary {
    detections: u64,
    first_seen: f64,
    last_seen: f64,
    basic_id: Option<String>,
    make: Option<String>,
    model: Option<String>,
}

impl DeviceSummary {
    fn new(rec: &DetectionRecord) -> Self {
        DeviceSummary {
            detections: 0,
            first_seen: rec.last_update,
            last_seen: rec.last_update,
            basic_id: None,
            make: None,
            model: None,
        }
    }

    fn update(&mut self, rec: &DetectionRecord) {
        self.detections += 1;
        self.first_seen = self.first_seen.min(rec.last_update);
        self.last_seen = self.last_seen.max(rec.last_update);
        if let Some(id) = rec.basic_id() {
            self.basic_id = Some(id.to_string());
        }
        if let Some(faa) = &rec.faa_data {
            // Registry payloads nest documents under data.items.
            let field = |key: &str| {
                faa["data"]["items"][0][key]
                    .as_str()
                    .or_else(|| faa["items"][0][key].as_str())
                    .or_else(|| faa[key].as_str())
                    .map(str::to_string)
            };
            if let Some(make) = field("makeName") {
                self.make = Some(make);
            }
            if let Some(model) = field("modelName") {
                self.model = Some(model);
            }
        }
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
    fn test_device_summary_reads_nested_registry_payload() {
        let mut rec = DetectionRecord::new("AA:BB");
        rec.last_update = 10.0;
        rec.basic_id = Some("R1".into());
        rec.faa_data = Some(json!({
            "data": {"items": [{"makeName": "DJI", "modelName": "Mini 4"}]}
        }));

        let mut summary = DeviceSummary::new(&rec);
        summary.update(&rec);
        assert_eq!(summary.make.as_deref(), Some("DJI"));
        assert_eq!(summary.model.as_deref(), Some("Mini 4"));
        assert_eq!(summary.detections, 1);
    }

    #[test]
    fn test_device_summary_tolerates_flat_payload() {
        let mut rec = DetectionRecord::new("AA:BB");
        rec.last_update = 10.0;
        rec.faa_data = Some(json!({"makeName": "Alpha"}));

        let mut summary = DeviceSummary::new(&rec);
        summary.update(&rec);
        assert_eq!(summary.make.as_deref(), Some("Alpha"));
        assert!(summary.model.is_none());
    }
}
