//! Serde models of the JSON documents dump1090 writes.
//!
//! `aircraft.json` and `stats.json` are delivered wholesale every cycle.
//! Parsing is the only place a snapshot can be rejected: anything that gets
//! past these functions is folded into metrics, with missing optional fields
//! read as zero or absent.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::types::{ExporterError, ReferencePoint, Result, SnapshotKind};

/// Freshness threshold in seconds for "recent" aircraft.
pub const FRESHNESS_SECS: f64 = 15.0;

/// `mlat` entry marking a multilateration-derived position.
const MLAT_POSITION_FIELD: &str = "lat";

fn malformed(kind: SnapshotKind, reason: impl ToString) -> ExporterError {
    ExporterError::MalformedSnapshot {
        kind,
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// aircraft.json
// ---------------------------------------------------------------------------

/// One `aircraft.json` document.
#[derive(Debug, Clone, Deserialize)]
pub struct AircraftSnapshot {
    #[serde(default)]
    pub now: Option<f64>,
    #[serde(default)]
    pub messages: f64,
    pub aircraft: Vec<Contact>,
}

impl AircraftSnapshot {
    /// Parse an `aircraft.json` body. A body without an `aircraft` list is
    /// rejected as a whole.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| malformed(SnapshotKind::Aircraft, e))
    }
}

/// One observed aircraft within a snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub hex: String,
    pub flight: Option<String>,
    #[serde(deserialize_with = "altitude_or_ground")]
    pub alt_baro: f64,
    pub alt_geom: f64,
    pub baro_rate: f64,
    pub gs: f64,
    pub nav_heading: f64,
    pub rssi: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub seen: f64,
    pub seen_pos: Option<f64>,
    pub mlat: Vec<String>,
}

impl Contact {
    /// Flight label with surrounding whitespace removed (dump1090 pads
    /// callsigns to eight characters).
    pub fn flight_label(&self) -> &str {
        self.flight.as_deref().map(str::trim).unwrap_or("")
    }

    /// Heard from within the freshness threshold.
    pub fn is_recent(&self) -> bool {
        self.seen < FRESHNESS_SECS
    }

    /// Position reported within the freshness threshold.
    pub fn has_recent_position(&self) -> bool {
        matches!(self.seen_pos, Some(s) if s < FRESHNESS_SECS)
    }

    /// Position fields came from multilateration rather than ADS-B.
    pub fn is_mlat_position(&self) -> bool {
        self.mlat.iter().any(|f| f == MLAT_POSITION_FIELD)
    }

    /// Reported position, if any. `(0, 0)` is dump1090's zero-fill and is
    /// treated as no position.
    pub fn position(&self) -> Option<ReferencePoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if lat != 0.0 || lon != 0.0 => {
                Some(ReferencePoint::new(lat, lon))
            }
            _ => None,
        }
    }
}

/// dump1090-fa reports `"alt_baro": "ground"` for aircraft on the surface.
fn altitude_or_ground<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Altitude {
        Feet(f64),
        Label(String),
    }

    Ok(match Altitude::deserialize(deserializer)? {
        Altitude::Feet(ft) => ft,
        Altitude::Label(_) => 0.0,
    })
}

// ---------------------------------------------------------------------------
// stats.json
// ---------------------------------------------------------------------------

/// One `stats.json` document: a map of window name to window.
///
/// Windows are kept as raw JSON until selected, so unknown top-level keys
/// (newer dump1090 builds add scalars next to the windows) are never a
/// reason to reject the document.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    windows: BTreeMap<String, Value>,
}

impl StatsSnapshot {
    /// Parse a `stats.json` body. The top level must be a JSON object.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| malformed(SnapshotKind::Stats, e))?;
        match value {
            Value::Object(map) => Ok(StatsSnapshot {
                windows: map.into_iter().collect(),
            }),
            other => Err(malformed(
                SnapshotKind::Stats,
                format!("expected an object of windows, got {}", json_type(&other)),
            )),
        }
    }

    /// Decode the named window. `Ok(None)` when the window is absent or
    /// `null`.
    pub fn window(&self, name: &str) -> Result<Option<StatWindow>> {
        match self.windows.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => StatWindow::deserialize(value)
                .map(Some)
                .map_err(|e| malformed(SnapshotKind::Stats, format!("window {name}: {e}"))),
        }
    }

    /// Names of the non-null top-level entries.
    pub fn window_names(&self) -> impl Iterator<Item = &str> {
        self.windows
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Counters for one time window.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatWindow {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub messages: Option<f64>,
    pub local: Option<StatLocal>,
    pub remote: Option<StatRemote>,
    pub cpr: Option<StatCpr>,
    pub cpu: Option<StatCpu>,
    pub tracks: Option<StatTracks>,
}

/// Local SDR receiver quality.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatLocal {
    /// Accepted messages indexed by number of corrected bits.
    pub accepted: Vec<f64>,
    pub bad: Option<f64>,
    pub modeac: Option<f64>,
    pub modes: Option<f64>,
    pub noise: Option<f64>,
    pub peak_signal: Option<f64>,
    pub samples_dropped: Option<f64>,
    pub samples_processed: Option<f64>,
    pub signal: Option<f64>,
    pub strong_signals: Option<f64>,
    pub unknown_icao: Option<f64>,
}

/// Messages received from network inputs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatRemote {
    pub accepted: Vec<f64>,
    pub bad: Option<f64>,
    pub modeac: Option<f64>,
    pub modes: Option<f64>,
    pub unknown_icao: Option<f64>,
}

/// CPR position decoding outcomes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatCpr {
    pub airborne: Option<f64>,
    pub filtered: Option<f64>,
    pub global_bad: Option<f64>,
    pub global_ok: Option<f64>,
    pub global_range: Option<f64>,
    pub global_skipped: Option<f64>,
    pub global_speed: Option<f64>,
    pub local_aircraft_relative: Option<f64>,
    pub local_ok: Option<f64>,
    pub local_range: Option<f64>,
    pub local_receiver_relative: Option<f64>,
    pub local_skipped: Option<f64>,
    pub local_speed: Option<f64>,
    pub surface: Option<f64>,
}

/// CPU milliseconds spent per thread.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatCpu {
    pub background: Option<f64>,
    pub demod: Option<f64>,
    pub reader: Option<f64>,
}

/// Track formation counts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatTracks {
    pub all: Option<f64>,
    pub single_message: Option<f64>,
}

// ---------------------------------------------------------------------------
// receiver.json
// ---------------------------------------------------------------------------

/// The parts of `receiver.json` the exporter uses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReceiverInfo {
    pub version: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl ReceiverInfo {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| malformed(SnapshotKind::Receiver, e))
    }

    /// Receiver location, when the receiver was configured with one.
    pub fn reference_point(&self) -> Option<ReferencePoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(ReferencePoint::new(lat, lon)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const AIRCRAFT_JSON: &str = r#"{
        "now": 1700000000.1,
        "messages": 1234567,
        "aircraft": [
            {"hex":"c0ffee","flight":"ACA123  ","alt_baro":35000,"alt_geom":35550,
             "gs":450.2,"baro_rate":-64,"nav_heading":271.2,"lat":51.72,"lon":-115.99,
             "seen_pos":1.2,"seen":0.4,"rssi":-21.5,"mlat":[]},
            {"hex":"abc123","alt_baro":"ground","seen":3.0,"mlat":["lat","lon"]},
            {"hex":"~2a0001","seen":22.0}
        ]
    }"#;

    #[test]
    fn test_parse_aircraft() {
        let snap = AircraftSnapshot::from_json(AIRCRAFT_JSON.as_bytes()).unwrap();
        assert_eq!(snap.messages, 1234567.0);
        assert_eq!(snap.aircraft.len(), 3);

        let first = &snap.aircraft[0];
        assert_eq!(first.flight_label(), "ACA123");
        assert_eq!(first.alt_baro, 35000.0);
        assert!(first.is_recent());
        assert!(first.has_recent_position());
        assert!(!first.is_mlat_position());
        assert_eq!(first.position(), Some(ReferencePoint::new(51.72, -115.99)));

        let ground = &snap.aircraft[1];
        assert_eq!(ground.alt_baro, 0.0);
        assert_eq!(ground.flight_label(), "");
        assert!(ground.is_mlat_position());
        assert!(!ground.has_recent_position());
        assert!(ground.position().is_none());

        assert!(!snap.aircraft[2].is_recent());
    }

    #[test]
    fn test_null_island_is_no_position() {
        let c = Contact {
            lat: Some(0.0),
            lon: Some(0.0),
            ..Default::default()
        };
        assert!(c.position().is_none());

        let c = Contact {
            lat: Some(0.0),
            lon: Some(12.5),
            ..Default::default()
        };
        assert!(c.position().is_some());
    }

    #[test]
    fn test_aircraft_malformed() {
        for body in ["", "[]", "{}", r#"{"aircraft": 7}"#, "not json"] {
            let err = AircraftSnapshot::from_json(body.as_bytes()).unwrap_err();
            assert!(
                matches!(
                    err,
                    ExporterError::MalformedSnapshot {
                        kind: SnapshotKind::Aircraft,
                        ..
                    }
                ),
                "{body:?}"
            );
        }
    }

    #[test]
    fn test_parse_stats_windows() {
        let body = r#"{
            "latest": {"start": 1.0, "end": 2.0, "cpr": {"airborne": 3}},
            "last1min": {"messages": 900, "local": {"accepted": [880, 20], "signal": -9.8}},
            "gain_db": 49.6
        }"#;
        let snap = StatsSnapshot::from_json(body.as_bytes()).unwrap();
        let names: Vec<&str> = snap.window_names().collect();
        assert_eq!(names, vec!["gain_db", "last1min", "latest"]);

        let latest = snap.window("latest").unwrap().unwrap();
        assert_eq!(latest.cpr.unwrap().airborne, Some(3.0));
        assert!(latest.local.is_none());

        let last1 = snap.window("last1min").unwrap().unwrap();
        assert_eq!(last1.messages, Some(900.0));
        let local = last1.local.unwrap();
        assert_eq!(local.accepted, vec![880.0, 20.0]);
        assert_eq!(local.signal, Some(-9.8));
        assert!(local.noise.is_none());

        assert!(snap.window("last15min").unwrap().is_none());

        let snap = StatsSnapshot::from_json(br#"{"latest": null, "last1min": {}}"#).unwrap();
        assert!(snap.window("latest").unwrap().is_none());
        assert_eq!(snap.window_names().collect::<Vec<_>>(), vec!["last1min"]);
        // a scalar is not a window
        assert!(snap.window("gain_db").is_err());
    }

    #[test]
    fn test_stats_malformed() {
        for body in ["", "[1,2]", "42", "{"] {
            assert!(StatsSnapshot::from_json(body.as_bytes()).is_err(), "{body:?}");
        }
    }

    #[test]
    fn test_receiver_info() {
        let body = r#"{"version":"9.0","refresh":1000,"history":120,"lat":50.72,"lon":-113.99}"#;
        let info = ReceiverInfo::from_json(body.as_bytes()).unwrap();
        assert_eq!(info.reference_point(), Some(ReferencePoint::new(50.72, -113.99)));
        assert_eq!(info.version.as_deref(), Some("9.0"));

        let info = ReceiverInfo::from_json(br#"{"version":"9.0"}"#).unwrap();
        assert!(info.reference_point().is_none());
    }
}
