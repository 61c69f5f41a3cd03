//! The derivation engine: one object built at startup and shared by the
//! aircraft cadence, the stats cadence and the metric readers.
//!
//! Each cadence owns a pass lock, so two aircraft passes never interleave
//! while an aircraft pass and a stats pass run side by side. The two touch
//! disjoint metric families.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::aggregate::{self, ContactAggregator, FleetSummary};
use crate::geo::CompassRose;
use crate::snapshot::{AircraftSnapshot, StatsSnapshot};
use crate::stats::{self, WindowFanout, WindowSpec};
use crate::surface::{FamilyDesc, MetricSurface};
use crate::types::{ReferencePoint, Result, SnapshotKind};

pub const AIRCRAFT_FILE_READS: &str = "aircraft_file_reads";
pub const STATS_FILE_READS: &str = "stats_file_reads";

/// Operational counters maintained by the acquisition layer.
pub const OPS_FAMILIES: &[FamilyDesc] = &[
    FamilyDesc::counter(
        AIRCRAFT_FILE_READS,
        "Number of reads on the aircraft file",
        &[],
    ),
    FamilyDesc::counter(STATS_FILE_READS, "Number of reads on the stats file", &[]),
];

// ---------------------------------------------------------------------------
// Reference point
// ---------------------------------------------------------------------------

/// The receiver location, replaced as a whole pair.
#[derive(Debug, Default)]
pub struct ReferenceCell {
    point: RwLock<Option<ReferencePoint>>,
}

impl ReferenceCell {
    pub fn new(point: Option<ReferencePoint>) -> Self {
        ReferenceCell {
            point: RwLock::new(point),
        }
    }

    pub fn get(&self) -> Option<ReferencePoint> {
        *self.point.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, point: ReferencePoint) {
        *self.point.write().unwrap_or_else(PoisonError::into_inner) = Some(point);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub rose: CompassRose,
    pub windows: Vec<WindowSpec>,
    pub reference: Option<ReferencePoint>,
}

/// Outcome of a successful aircraft pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AircraftReport {
    pub summary: FleetSummary,
    pub series: usize,
}

/// Outcome of a successful stats pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsReport {
    pub windows: usize,
    pub series: usize,
}

#[derive(Debug)]
pub struct Engine {
    surface: Arc<MetricSurface>,
    reference: ReferenceCell,
    aggregator: ContactAggregator,
    fanout: WindowFanout,
    aircraft_pass: Mutex<()>,
    stats_pass: Mutex<()>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let descs: Vec<FamilyDesc> = aggregate::FAMILIES
            .iter()
            .chain(stats::FAMILIES)
            .chain(OPS_FAMILIES)
            .copied()
            .collect();

        let windows = if config.windows.is_empty() {
            stats::default_windows()
        } else {
            config.windows
        };

        Engine {
            surface: Arc::new(MetricSurface::new(&descs)),
            reference: ReferenceCell::new(config.reference),
            aggregator: ContactAggregator::new(config.rose),
            fanout: WindowFanout::new(windows),
            aircraft_pass: Mutex::new(()),
            stats_pass: Mutex::new(()),
        }
    }

    pub fn surface(&self) -> &MetricSurface {
        &self.surface
    }

    /// Handle to the surface for registering it with a Prometheus registry.
    pub fn shared_surface(&self) -> Arc<MetricSurface> {
        Arc::clone(&self.surface)
    }

    pub fn reference(&self) -> Option<ReferencePoint> {
        self.reference.get()
    }

    pub fn update_reference(&self, point: ReferencePoint) {
        self.reference.set(point);
    }

    pub fn windows(&self) -> &[WindowSpec] {
        self.fanout.windows()
    }

    /// Run one aircraft pass over a raw `aircraft.json` body.
    ///
    /// A body that does not parse leaves every published family as it was.
    pub fn process_aircraft(&self, body: &[u8]) -> Result<AircraftReport> {
        let _pass = self
            .aircraft_pass
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let snapshot = AircraftSnapshot::from_json(body)?;
        let reference = self.reference.get();
        let pass = self.aggregator.aggregate(&snapshot, reference);
        let summary = pass.summary;

        let batch = pass.into_batch();
        let series = batch.series_count();
        self.surface.publish(batch)?;

        debug!(
            total = summary.total,
            observed = summary.observed,
            with_position = summary.with_position,
            with_mlat = summary.with_mlat,
            max_range_m = ?summary.max_range,
            series,
            "aircraft pass"
        );
        Ok(AircraftReport { summary, series })
    }

    /// Run one stats pass over a raw `stats.json` body.
    pub fn process_stats(&self, body: &[u8]) -> Result<StatsReport> {
        let _pass = self
            .stats_pass
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let snapshot = StatsSnapshot::from_json(body)?;
        let batch = self.fanout.fan_out(&snapshot)?;
        let windows = self
            .fanout
            .windows()
            .iter()
            .filter(|w| snapshot.window_names().any(|n| n == w.name))
            .count();
        let series = batch.series_count();
        self.surface.publish(batch)?;

        debug!(windows, series, "stats pass");
        Ok(StatsReport { windows, series })
    }

    /// Count one successful read of a snapshot document.
    pub fn record_read(&self, kind: SnapshotKind) -> Result<()> {
        let family = match kind {
            SnapshotKind::Aircraft => AIRCRAFT_FILE_READS,
            SnapshotKind::Stats => STATS_FILE_READS,
            SnapshotKind::Receiver => return Ok(()),
        };
        self.surface.increment(family, &[], 1.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::aggregate::{DISTANCE, LATEST, MAX_RANGE_BY_DIRECTION, OBSERVED, RSSI};
    use crate::types::ExporterError;

    const CYCLE_1: &str = r#"{"messages": 100, "aircraft": [
        {"hex":"c0ffee","flight":"ACA123 ","lat":51.72,"lon":-115.99,"seen":1,"seen_pos":1,"rssi":-20},
        {"hex":"beef01","flight":"WJA9   ","lat":49.72,"lon":-113.99,"seen":2,"seen_pos":2,"rssi":-25}
    ]}"#;

    const CYCLE_2: &str = r#"{"messages": 150, "aircraft": [
        {"hex":"c0ffee","flight":"ACA123 ","lat":51.70,"lon":-115.90,"seen":1,"seen_pos":1,"rssi":-19}
    ]}"#;

    const STATS: &str = r#"{
        "latest": {"cpr": {"airborne": 4}, "messages": 10},
        "last1min": {"messages": 2400, "cpr": {"airborne": 400}}
    }"#;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            reference: Some(ReferencePoint::new(50.72, -113.99)),
            ..Default::default()
        })
    }

    #[test]
    fn test_idempotent_passes() {
        let e = engine();
        e.process_aircraft(CYCLE_1.as_bytes()).unwrap();
        let first = e.surface().render().unwrap();
        e.process_aircraft(CYCLE_1.as_bytes()).unwrap();
        assert_eq!(e.surface().render().unwrap(), first);
    }

    #[test]
    fn test_vanished_contact_removed() {
        let e = engine();
        e.process_aircraft(CYCLE_1.as_bytes()).unwrap();
        assert!(e.surface().get(RSSI, &["WJA9", "beef01"]).is_some());
        assert!(e.surface().get(MAX_RANGE_BY_DIRECTION, &["S", LATEST]).is_some());

        e.process_aircraft(CYCLE_2.as_bytes()).unwrap();
        assert!(e.surface().get(RSSI, &["WJA9", "beef01"]).is_none());
        assert!(e.surface().get(DISTANCE, &["WJA9", "beef01"]).is_none());
        assert!(e.surface().get(MAX_RANGE_BY_DIRECTION, &["S", LATEST]).is_none());
        assert_eq!(e.surface().get(RSSI, &["ACA123", "c0ffee"]), Some(-19.0));
        assert_eq!(e.surface().get(OBSERVED, &[LATEST]), Some(1.0));
    }

    #[test]
    fn test_malformed_keeps_previous_surface() {
        let e = engine();
        e.process_aircraft(CYCLE_1.as_bytes()).unwrap();
        e.process_stats(STATS.as_bytes()).unwrap();
        let before = e.surface().render().unwrap();

        for body in ["", "{}", "{\"aircraft\": {}}", "<html>"] {
            let err = e.process_aircraft(body.as_bytes()).unwrap_err();
            assert!(matches!(err, ExporterError::MalformedSnapshot { .. }));
        }
        for body in ["", "[]", r#"{"last1min": 5}"#] {
            assert!(e.process_stats(body.as_bytes()).is_err());
        }
        assert_eq!(e.surface().render().unwrap(), before);
    }

    #[test]
    fn test_passes_touch_disjoint_families() {
        let e = engine();
        e.process_stats(STATS.as_bytes()).unwrap();
        e.process_aircraft(CYCLE_1.as_bytes()).unwrap();
        assert_eq!(
            e.surface().get("stats_messages_total", &["last1min"]),
            Some(2400.0)
        );

        e.process_stats(br#"{"last1min": {"messages": 2500}}"#).unwrap();
        assert_eq!(e.surface().get(RSSI, &["ACA123", "c0ffee"]), Some(-20.0));
        // latest window vanished from the stats document
        assert!(e.surface().get("stats_cpr_airborne", &["latest"]).is_none());
    }

    #[test]
    fn test_null_window_skipped() {
        let e = engine();
        let report = e
            .process_stats(br#"{"latest": null, "last1min": {"messages": 7}}"#)
            .unwrap();
        assert_eq!(report.windows, 1);
        assert_eq!(
            e.surface().get("stats_messages_total", &["last1min"]),
            Some(7.0)
        );
    }

    #[test]
    fn test_stats_report() {
        let e = engine();
        let report = e.process_stats(STATS.as_bytes()).unwrap();
        assert_eq!(report.windows, 2);
        assert_eq!(report.series, 3);
    }

    #[test]
    fn test_reference_update_between_cycles() {
        let e = Engine::new(EngineConfig::default());
        let report = e.process_aircraft(CYCLE_2.as_bytes()).unwrap();
        assert!(report.summary.max_range.is_none());

        e.update_reference(ReferencePoint::new(50.72, -113.99));
        let report = e.process_aircraft(CYCLE_2.as_bytes()).unwrap();
        assert!(report.summary.max_range.is_some());
    }

    #[test]
    fn test_record_read() {
        let e = engine();
        e.record_read(SnapshotKind::Aircraft).unwrap();
        e.record_read(SnapshotKind::Aircraft).unwrap();
        e.record_read(SnapshotKind::Receiver).unwrap();
        assert_eq!(e.surface().get(AIRCRAFT_FILE_READS, &[]), Some(2.0));
        assert_eq!(e.surface().get(STATS_FILE_READS, &[]), None);
    }

    #[test]
    fn test_concurrent_cadences() {
        let e = Arc::new(engine());
        let aircraft = {
            let e = Arc::clone(&e);
            std::thread::spawn(move || {
                for i in 0..50 {
                    let body = if i % 2 == 0 { CYCLE_1 } else { CYCLE_2 };
                    e.process_aircraft(body.as_bytes()).unwrap();
                }
            })
        };
        let stats = {
            let e = Arc::clone(&e);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    e.process_stats(STATS.as_bytes()).unwrap();
                }
            })
        };
        aircraft.join().unwrap();
        stats.join().unwrap();

        // last aircraft pass was CYCLE_2
        assert_eq!(e.surface().get(OBSERVED, &[LATEST]), Some(1.0));
        assert_eq!(
            e.surface().get("stats_cpr_airborne", &["last1min"]),
            Some(400.0)
        );
    }
}
