//! Configuration file management for dump1090-exporter.
//!
//! Reads/writes `~/.dump1090-exporter/config.yaml` with the receiver
//! location, snapshot source, listen address, poll cadences and metric
//! options.

use std::path::PathBuf;

use crate::geo::CompassRose;
use crate::stats::{default_windows, WindowSpec};
use crate::types::{ExporterError, ReferencePoint};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub source: SourceConfig,
    pub server: ServerConfig,
    pub schedule: ScheduleConfig,
    pub metrics: MetricsConfig,
}

/// Pinned receiver location. When both are set, `receiver.json` is not
/// consulted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl ReceiverConfig {
    pub fn reference_point(&self) -> Option<ReferencePoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(ReferencePoint::new(lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// Directory or http(s) base URL holding the dump1090 JSON files.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleConfig {
    pub aircraft_secs: u64,
    pub stats_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub windows: Vec<WindowSpec>,
    pub compass: CompassRose,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            receiver: ReceiverConfig {
                lat: None,
                lon: None,
            },
            source: SourceConfig {
                path: "/run/dump1090-fa/".into(),
            },
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 3000,
            },
            schedule: ScheduleConfig {
                aircraft_secs: 5,
                stats_secs: 30,
            },
            metrics: MetricsConfig {
                windows: default_windows(),
                compass: CompassRose::Eight,
            },
        }
    }
}

/// Get the config directory path (`~/.dump1090-exporter/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".dump1090-exporter")
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

/// Load config from `path`, or `~/.dump1090-exporter/config.yaml` when no
/// path is given.
///
/// A missing default file yields the default config; a missing explicit
/// file is an error.
pub fn load_config(path: Option<&PathBuf>) -> Result<Config, ExporterError> {
    let path = match path {
        Some(p) => p.clone(),
        None => {
            let p = config_file();
            if !p.exists() {
                return Ok(Config::default());
            }
            p
        }
    };

    let text = std::fs::read_to_string(&path)
        .map_err(|e| ExporterError::Config(format!("{}: {e}", path.display())))?;
    parse_config(&text)
}

/// Save config to `~/.dump1090-exporter/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, ExporterError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| ExporterError::Config(e.to_string()))?;

    let path = config_file();
    let text = serialize_config(config);
    std::fs::write(&path, text).map_err(|e| ExporterError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text.
pub fn parse_config(text: &str) -> Result<Config, ExporterError> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            return Err(ExporterError::Config(format!(
                "line {}: expected `key: value`",
                lineno + 1
            )));
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };

        let bad = |what: &str| {
            ExporterError::Config(format!("line {}: invalid {what}: {val}", lineno + 1))
        };

        match (section, key) {
            ("receiver", "lat") => config.receiver.lat = parse_float_value(val),
            ("receiver", "lon") => config.receiver.lon = parse_float_value(val),
            ("source", "path") => {
                if let Some(v) = parse_string_value(val) {
                    config.source.path = v;
                }
            }
            ("server", "host") => {
                if let Some(v) = parse_string_value(val) {
                    config.server.host = v;
                }
            }
            ("server", "port") => config.server.port = val.parse().map_err(|_| bad("port"))?,
            ("schedule", "aircraft_secs") => {
                config.schedule.aircraft_secs = parse_interval(val).ok_or_else(|| bad("interval"))?
            }
            ("schedule", "stats_secs") => {
                config.schedule.stats_secs = parse_interval(val).ok_or_else(|| bad("interval"))?
            }
            ("metrics", "windows") => {
                if let Some(v) = parse_string_value(val) {
                    config.metrics.windows = WindowSpec::parse_list(&v)?;
                }
            }
            ("metrics", "compass") => {
                config.metrics.compass = parse_string_value(val)
                    .as_deref()
                    .and_then(CompassRose::from_slots)
                    .ok_or_else(|| bad("compass"))?
            }
            _ => {}
        }
    }

    Ok(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
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

fn parse_interval(val: &str) -> Option<u64> {
    val.parse::<u64>().ok().filter(|&s| s > 0)
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let mut lines = vec!["# dump1090-exporter configuration".to_string(), String::new()];

    lines.push("receiver:".into());
    match config.receiver.lat {
        Some(v) => lines.push(format!("  lat: {v}")),
        None => lines.push("  lat: null".into()),
    }
    match config.receiver.lon {
        Some(v) => lines.push(format!("  lon: {v}")),
        None => lines.push("  lon: null".into()),
    }
    lines.push(String::new());

    lines.push("source:".into());
    lines.push(format!("  path: \"{}\"", config.source.path));
    lines.push(String::new());

    lines.push("server:".into());
    lines.push(format!("  host: \"{}\"", config.server.host));
    lines.push(format!("  port: {}", config.server.port));
    lines.push(String::new());

    lines.push("schedule:".into());
    lines.push(format!("  aircraft_secs: {}", config.schedule.aircraft_secs));
    lines.push(format!("  stats_secs: {}", config.schedule.stats_secs));
    lines.push(String::new());

    let windows: Vec<String> = config.metrics.windows.iter().map(WindowSpec::label).collect();
    lines.push("metrics:".into());
    lines.push(format!("  windows: \"{}\"", windows.join(",")));
    lines.push(format!("  compass: {}", config.metrics.compass.slots()));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
