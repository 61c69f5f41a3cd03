//! The two poll cadences: aircraft (default every 5 s) and stats plus
//! receiver location (default every 30 s).
//!
//! Each cadence is one tokio task awaiting its own interval, so a cadence
//! never overlaps itself and a slow stats fetch never delays aircraft. Any
//! failure is logged and the next tick tries again.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use dump1090_core::engine::{AircraftReport, StatsReport};
use dump1090_core::snapshot::ReceiverInfo;
use dump1090_core::types::{ReferencePoint, Result, SnapshotKind};
use dump1090_core::Engine;

use crate::source::SnapshotSource;

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Pass bookkeeping for /health
// ---------------------------------------------------------------------------

/// When a cadence last completed a pass, and how many series it wrote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PassStamp {
    pub at: f64,
    pub series: usize,
}

#[derive(Debug, Default)]
pub struct PassStatus {
    aircraft: RwLock<Option<PassStamp>>,
    stats: RwLock<Option<PassStamp>>,
}

impl PassStatus {
    pub fn aircraft(&self) -> Option<PassStamp> {
        *self.aircraft.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> Option<PassStamp> {
        *self.stats.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark(slot: &RwLock<Option<PassStamp>>, series: usize) {
        *slot.write().unwrap_or_else(PoisonError::into_inner) = Some(PassStamp {
            at: now(),
            series,
        });
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Fetches documents from a source and feeds them to the engine.
pub struct Poller {
    engine: Arc<Engine>,
    source: Box<dyn SnapshotSource>,
    status: Arc<PassStatus>,
    /// Receiver location came from config/CLI; never read `receiver.json`.
    pinned_reference: bool,
}

impl Poller {
    pub fn new(
        engine: Arc<Engine>,
        source: Box<dyn SnapshotSource>,
        status: Arc<PassStatus>,
        pinned_reference: bool,
    ) -> Self {
        Poller {
            engine,
            source,
            status,
            pinned_reference,
        }
    }

    pub fn source(&self) -> &dyn SnapshotSource {
        self.source.as_ref()
    }

    /// One aircraft cycle. `Ok(None)` when `aircraft.json` is not there.
    pub async fn poll_aircraft(&self) -> Result<Option<AircraftReport>> {
        let Some(body) = self.source.fetch(SnapshotKind::Aircraft).await? else {
            debug!(source = %self.source.describe(), "aircraft.json not present");
            return Ok(None);
        };
        self.engine.record_read(SnapshotKind::Aircraft)?;

        let report = self.engine.process_aircraft(&body)?;
        PassStatus::mark(&self.status.aircraft, report.series);
        Ok(Some(report))
    }

    /// One stats cycle. `Ok(None)` when `stats.json` is not there.
    pub async fn poll_stats(&self) -> Result<Option<StatsReport>> {
        let Some(body) = self.source.fetch(SnapshotKind::Stats).await? else {
            debug!(source = %self.source.describe(), "stats.json not present");
            return Ok(None);
        };
        self.engine.record_read(SnapshotKind::Stats)?;

        let report = self.engine.process_stats(&body)?;
        PassStatus::mark(&self.status.stats, report.series);
        Ok(Some(report))
    }

    /// Re-read the receiver location from `receiver.json`, unless it was
    /// pinned. Returns the location in effect afterwards.
    pub async fn refresh_receiver(&self) -> Result<Option<ReferencePoint>> {
        if self.pinned_reference {
            return Ok(self.engine.reference());
        }

        let Some(body) = self.source.fetch(SnapshotKind::Receiver).await? else {
            return Ok(self.engine.reference());
        };
        let info = ReceiverInfo::from_json(&body)?;

        if let Some(point) = info.reference_point() {
            if self.engine.reference() != Some(point) {
                info!(
                    lat = point.lat,
                    lon = point.lon,
                    version = info.version.as_deref().unwrap_or("unknown"),
                    "receiver location"
                );
                self.engine.update_reference(point);
            }
        }
        Ok(self.engine.reference())
    }

    /// Start both cadences. The first tick of each fires immediately.
    pub fn spawn(
        self: Arc<Self>,
        aircraft_every: Duration,
        stats_every: Duration,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let aircraft = {
            let poller = Arc::clone(&self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(aircraft_every);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if let Err(e) = poller.poll_aircraft().await {
                        warn!(error = %e, "aircraft pass failed");
                    }
                }
            })
        };

        let stats = tokio::spawn(async move {
            let mut interval = tokio::time::interval(stats_every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if let Err(e) = self.refresh_receiver().await {
                    warn!(error = %e, "receiver refresh failed");
                }
                if let Err(e) = self.poll_stats().await {
                    warn!(error = %e, "stats pass failed");
                }
            }
        });

        (aircraft, stats)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dump1090_core::aggregate::{LATEST, OBSERVED};
    use dump1090_core::engine::{AIRCRAFT_FILE_READS, STATS_FILE_READS};
    use dump1090_core::EngineConfig;

    use crate::source::FileSource;

    const AIRCRAFT: &str = r#"{"messages": 5, "aircraft": [
        {"hex":"c0ffee","flight":"ACA123","lat":51.72,"lon":-115.99,"seen":1,"seen_pos":1}
    ]}"#;

    fn poller(dir: &std::path::Path, reference: Option<ReferencePoint>) -> Poller {
        let engine = Arc::new(Engine::new(EngineConfig {
            reference,
            ..Default::default()
        }));
        Poller::new(
            engine,
            Box::new(FileSource::new(dir)),
            Arc::new(PassStatus::default()),
            reference.is_some(),
        )
    }

    #[tokio::test]
    async fn test_poll_aircraft() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aircraft.json"), AIRCRAFT).unwrap();
        let p = poller(dir.path(), Some(ReferencePoint::new(50.72, -113.99)));

        let report = p.poll_aircraft().await.unwrap().unwrap();
        assert_eq!(report.summary.observed, 1);
        assert!(report.summary.max_range.is_some());
        assert_eq!(p.engine.surface().get(AIRCRAFT_FILE_READS, &[]), Some(1.0));
        assert_eq!(p.status.aircraft().unwrap().series, report.series);
    }

    #[tokio::test]
    async fn test_missing_documents_are_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let p = poller(dir.path(), None);
        assert!(p.poll_aircraft().await.unwrap().is_none());
        assert!(p.poll_stats().await.unwrap().is_none());
        assert!(p.refresh_receiver().await.unwrap().is_none());
        assert!(p.status.aircraft().is_none());
        assert_eq!(p.engine.surface().get(STATS_FILE_READS, &[]), None);
    }

    #[tokio::test]
    async fn test_malformed_document_keeps_surface() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aircraft.json"), AIRCRAFT).unwrap();
        let p = poller(dir.path(), None);
        p.poll_aircraft().await.unwrap();

        std::fs::write(dir.path().join("aircraft.json"), "{\"aircraft\": [").unwrap();
        assert!(p.poll_aircraft().await.is_err());
        assert_eq!(p.engine.surface().get(OBSERVED, &[LATEST]), Some(1.0));
        // the read itself still counts
        assert_eq!(p.engine.surface().get(AIRCRAFT_FILE_READS, &[]), Some(2.0));
    }

    #[tokio::test]
    async fn test_receiver_refresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("receiver.json"),
            r#"{"version":"9.0","lat":50.72,"lon":-113.99}"#,
        )
        .unwrap();

        let p = poller(dir.path(), None);
        let point = p.refresh_receiver().await.unwrap();
        assert_eq!(point, Some(ReferencePoint::new(50.72, -113.99)));
        assert_eq!(p.engine.reference(), point);
    }

    #[tokio::test]
    async fn test_pinned_receiver_ignores_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("receiver.json"), r#"{"lat":1.0,"lon":2.0}"#).unwrap();

        let pinned = ReferencePoint::new(50.72, -113.99);
        let p = poller(dir.path(), Some(pinned));
        assert_eq!(p.refresh_receiver().await.unwrap(), Some(pinned));
    }

    #[tokio::test]
    async fn test_poll_stats() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("stats.json"),
            r#"{"last1min": {"messages": 100}, "latest": {"cpu": {"demod": 1}}}"#,
        )
        .unwrap();
        let p = poller(dir.path(), None);
        let report = p.poll_stats().await.unwrap().unwrap();
        assert_eq!(report.windows, 2);
        assert_eq!(report.series, 2);
        assert_eq!(p.engine.surface().get(STATS_FILE_READS, &[]), Some(1.0));
    }
}
