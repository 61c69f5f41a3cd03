//! Shared types and the error enum for dump1090-core.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// All errors produced by dump1090-core.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("malformed {kind} snapshot: {reason}")]
    MalformedSnapshot {
        kind: SnapshotKind,
        reason: String,
    },
    #[error("unknown metric family: {0}")]
    UnknownFamily(String),
    #[error("metric family {family} takes {expected} labels, got {actual}")]
    LabelArity {
        family: String,
        expected: usize,
        actual: usize,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, ExporterError>;

// ---------------------------------------------------------------------------
// Snapshot kinds
// ---------------------------------------------------------------------------

/// The documents a dump1090 instance publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    Aircraft,
    Stats,
    Receiver,
}

impl SnapshotKind {
    /// File name of the document under the dump1090 JSON directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            SnapshotKind::Aircraft => "aircraft.json",
            SnapshotKind::Stats => "stats.json",
            SnapshotKind::Receiver => "receiver.json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Aircraft => "aircraft",
            SnapshotKind::Stats => "stats",
            SnapshotKind::Receiver => "receiver",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reference point
// ---------------------------------------------------------------------------

/// Receiver location that every range and bearing is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferencePoint {
    pub lat: f64,
    pub lon: f64,
}

impl ReferencePoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        ReferencePoint { lat, lon }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_file_names() {
        assert_eq!(SnapshotKind::Aircraft.file_name(), "aircraft.json");
        assert_eq!(SnapshotKind::Stats.file_name(), "stats.json");
        assert_eq!(SnapshotKind::Receiver.file_name(), "receiver.json");
    }

    #[test]
    fn test_error_display() {
        let err = ExporterError::MalformedSnapshot {
            kind: SnapshotKind::Aircraft,
            reason: "missing field `aircraft`".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed aircraft snapshot: missing field `aircraft`"
        );

        let err = ExporterError::LabelArity {
            family: "dump1090_rssi".into(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "metric family dump1090_rssi takes 2 labels, got 1"
        );
    }
}
