//! Configuration file management for rid-mapper.
//!
//! Reads/writes `~/.rid-mapper/config.yaml` with serial port selections,
//! dashboard settings, data directory, stale threshold, and webhook URL.

use std::path::PathBuf;

use crate::types::RidError;

/// Serial line rate for the sensor boards.
pub const BAUD_RATE: u32 = 115_200;

/// Up to three sensor ports can be active at once.
pub const MAX_SENSOR_PORTS: usize = 3;

/// Full configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub dashboard: DashboardConfig,
    pub data_dir: String,
    pub stale_threshold: f64,
    pub webhook: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port1: Option<String>,
    pub port2: Option<String>,
    pub port3: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            serial: SerialConfig {
                port1: None,
                port2: None,
                port3: None,
            },
            dashboard: DashboardConfig {
                host: "0.0.0.0".into(),
                port: 5000,
            },
            data_dir: "data".into(),
            stale_threshold: 60.0,
            webhook: None,
        }
    }
}

impl SerialConfig {
    /// Configured ports in slot order, skipping empty slots.
    pub fn ports(&self) -> Vec<String> {
        [&self.port1, &self.port2, &self.port3]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

/// Get the config directory path (`~/.rid-mapper/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".rid-mapper")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.rid-mapper/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    let path = config_file();
    if !path.exists() {
        return Config::default();
    }

    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(_) => return Config::default(),
    };

    parse_config(&text).unwrap_or_default()
}

/// Save config to `~/.rid-mapper/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, RidError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| RidError::Config(e.to_string()))?;

    let path = config_file();
    let text = serialize_config(config);
    std::fs::write(&path, text).map_err(|e| RidError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text.
fn parse_config(text: &str) -> Option<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        if let Some((key, val)) = stripped.split_once(':') {
            let key = key.trim();
            let val = val.trim();

            if !is_indented {
                if val.is_empty() {
                    current_section = Some(key.to_string());
                } else {
                    current_section = None;
                    // Top-level key with value
                    match key {
                        "data_dir" => {
                            if let Some(v) = parse_string_value(val) {
                                config.data_dir = v;
                            }
                        }
                        "stale_threshold" => {
                            if let Some(v) = parse_float_value(val) {
                                config.stale_threshold = v;
                            }
                        }
                        "webhook" => config.webhook = parse_string_value(val),
                        _ => {}
                    }
                }
            } else if let Some(ref section) = current_section {
                match section.as_str() {
                    "serial" => match key {
                        "port1" => config.serial.port1 = parse_string_value(val),
                        "port2" => config.serial.port2 = parse_string_value(val),
                        "port3" => config.serial.port3 = parse_string_value(val),
                        _ => {}
                    },
                    "dashboard" => match key {
                        "host" => {
                            if let Some(v) = parse_string_value(val) {
                                config.dashboard.host = v;
                            }
                        }
                        "port" => {
                            if let Ok(v) = val.parse::<u16>() {
                                config.dashboard.port = v;
                            }
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }
    }

    Some(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if (val.starts_with('"') && val.ends_with('"'))
        || (val.starts_with('\'') && val.ends_with('\''))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

/// Serialize config to YAML-like text.
fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# rid-mapper configuration".to_string(), String::new()];

    lines.push("serial:".into());
    for (name, port) in [
        ("port1", &config.serial.port1),
        ("port2", &config.serial.port2),
        ("port3", &config.serial.port3),
    ] {
        match port {
            Some(p) => lines.push(format!("  {name}: \"{p}\"")),
            None => lines.push(format!("  {name}: null")),
        }
    }
    lines.push(String::new());

    lines.push("dashboard:".into());
    lines.push(format!("  host: \"{}\"", config.dashboard.host));
    lines.push(format!("  port: {}", config.dashboard.port));
    lines.push(String::new());

    lines.push(format!("data_dir: \"{}\"", config.data_dir));
    lines.push(format!("stale_threshold: {}", config.stale_threshold));

    match &config.webhook {
        Some(url) => lines.push(format!("webhook: \"{url}\"")),
        None => lines.push("webhook: null".into()),
    }

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dashboard.port, 5000);
        assert_eq!(config.stale_threshold, 60.0);
        assert!(config.serial.ports().is_empty());
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
serial:
  port1: "/dev/ttyUSB0"
  port2: "/dev/ttyUSB1"
  port3: null

dashboard:
  host: "127.0.0.1"
  port: 9090

data_dir: "/var/lib/rid"
stale_threshold: 120
webhook: "https://example.com/hook"
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(
            config.serial.ports(),
            vec!["/dev/ttyUSB0".to_string(), "/dev/ttyUSB1".to_string()]
        );
        assert_eq!(config.dashboard.host, "127.0.0.1");
        assert_eq!(config.dashboard.port, 9090);
        assert_eq!(config.data_dir, "/var/lib/rid");
        assert_eq!(config.stale_threshold, 120.0);
        assert_eq!(config.webhook, Some("https://example.com/hook".into()));
    }

    #[test]
    fn test_parse_config_null_values() {
        let text = r#"
serial:
  port1: null
  port2: ~

webhook: null
"#;
        let config = parse_config(text).unwrap();
        assert!(config.serial.port1.is_none());
        assert!(config.serial.port2.is_none());
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_roundtrip() {
        let config = Config {
            serial: SerialConfig {
                port1: Some("/dev/ttyACM0".into()),
                port2: None,
                port3: None,
            },
            dashboard: DashboardConfig {
                host: "0.0.0.0".into(),
                port: 5001,
            },
            data_dir: "out".into(),
            stale_threshold: 90.0,
            webhook: Some("https://example.com".into()),
        };
        let text = serialize_config(&config);
        let parsed = parse_config(&text).unwrap();
        assert_eq!(parsed.serial.port1, Some("/dev/ttyACM0".into()));
        assert!(parsed.serial.port2.is_none());
        assert_eq!(parsed.dashboard.port, 5001);
        assert_eq!(parsed.stale_threshold, 90.0);
        assert_eq!(parsed.webhook, Some("https://example.com".into()));
    }
}
