//! Reconnecting serial reader tasks.
//!
//! One task per selected port. A dropped or unopenable port is retried
//! every second forever; the connected flag in the shared status map
//! tracks each attempt. Locks are never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;

use rid_core::config::BAUD_RATE;
use rid_core::DetectionRecord;

use crate::frame::FragmentStitcher;

/// Connected flag per port device path.
pub type StatusMap = Arc<RwLock<HashMap<String, bool>>>;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// One enumerated serial device.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub device: String,
    pub description: String,
}

/// Enumerate serial devices present on the host.
pub fn list_ports() -> Vec<PortInfo> {
    match tokio_serial::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| {
                let description = match p.port_type {
                    tokio_serial::SerialPortType::UsbPort(usb) => {
                        usb.product.unwrap_or_else(|| "USB serial".into())
                    }
                    tokio_serial::SerialPortType::PciPort => "PCI serial".into(),
                    tokio_serial::SerialPortType::BluetoothPort => "Bluetooth serial".into(),
                    tokio_serial::SerialPortType::Unknown => "serial".into(),
                };
                PortInfo {
                    device: p.port_name,
                    description,
                }
            })
            .collect(),
        Err(e) => {
            warn!("serial enumeration failed: {e}");
            Vec::new()
        }
    }
}

fn set_connected(status: &StatusMap, port: &str, connected: bool) {
    status
        .write()
        .unwrap()
        .insert(port.to_string(), connected);
}

/// Why a connected read session ended.
#[derive(Debug, PartialEq, Eq)]
enum ReadEnd {
    /// EOF or read error; the port should be reopened.
    Disconnected,
    /// The shutdown flag flipped.
    Shutdown,
    /// The ingest channel receiver is gone; nothing left to feed.
    ConsumerGone,
}

/// Pump lines from an open stream into the ingest channel until the
/// session ends for one of the [`ReadEnd`] reasons.
async fn drain_lines<R: AsyncRead + Unpin>(
    input: R,
    stitcher: &mut FragmentStitcher,
    tx: &mpsc::Sender<DetectionRecord>,
    shutdown: &mut watch::Receiver<bool>,
    port: &str,
) -> ReadEnd {
    let mut lines = BufReader::new(input).lines();
    loop {
        tokio::select! {
            _ = shutdown.changed() => return ReadEnd::Shutdown,
            line = lines.next_line() => match line {
                Ok(Some(text)) => {
                    if let Some(record) = stitcher.process(&text) {
                        if tx.send(record).await.is_err() {
                            return ReadEnd::ConsumerGone;
                        }
                    }
                }
                Ok(None) => {
                    warn!("serial EOF on {port}, reconnecting");
                    return ReadEnd::Disconnected;
                }
                Err(e) => {
                    warn!("serial read error on {port}: {e}");
                    return ReadEnd::Disconnected;
                }
            },
        }
    }
}

/// Read one port until shutdown, reconnecting on any failure.
///
/// Each parsed detection is sent to `tx`; the consumer owns merging and
/// persistence. Returns when the shutdown flag flips or the consumer
/// side of the channel is gone.
pub async fn run_reader(
    port: String,
    tx: mpsc::Sender<DetectionRecord>,
    status: StatusMap,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut stitcher = FragmentStitcher::new();
    info!("serial reader starting on {port}");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let mut stream = match tokio_serial::new(&port, BAUD_RATE).open_native_async() {
            Ok(s) => s,
            Err(e) => {
                debug!("open {port} failed: {e}");
                set_connected(&status, &port, false);
                tokio::select! {
                    _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    _ = shutdown.changed() => break,
                }
            }
        };

        // Nudge the firmware back to a clean frame boundary.
        if let Err(e) = stream.write_all(b"WATCHDOG_RESET\n").await {
            warn!("watchdog write to {port} failed: {e}");
        }

        set_connected(&status, &port, true);
        info!("serial connected on {port}");

        let end = drain_lines(stream, &mut stitcher, &tx, &mut shutdown, &port).await;
        // The flag drops as soon as the session ends, whatever the reason.
        set_connected(&status, &port, false);
        match end {
            ReadEnd::Shutdown => {
                info!("serial reader on {port} shutting down");
                return;
            }
            ReadEnd::ConsumerGone => {
                info!("ingest channel closed, stopping reader on {port}");
                return;
            }
            ReadEnd::Disconnected => {}
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown.changed() => break,
        }
    }

    set_connected(&status, &port, false);
    info!("serial reader on {port} stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
