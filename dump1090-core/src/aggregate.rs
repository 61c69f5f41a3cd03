//! Aircraft snapshot aggregation: per-contact telemetry, range and
//! direction buckets, and fleet-wide counts.
//!
//! Pure logic, one call per `aircraft.json`. Every cycle starts from zero;
//! nothing carries over from the previous snapshot.

use std::collections::BTreeMap;

use crate::geo::{self, CompassRose, DIRECTIONS};
use crate::snapshot::AircraftSnapshot;
use crate::surface::{FamilyDesc, MetricBatch};
use crate::types::ReferencePoint;

/// `time_period` label value for everything derived from `aircraft.json`.
pub const LATEST: &str = "latest";

// ---------------------------------------------------------------------------
// Metric families
// ---------------------------------------------------------------------------

pub const ALT_BARO: &str = "alt_baro";
pub const ALT_GEOM: &str = "alt_geom";
pub const BARO_RATE: &str = "baro_rate";
pub const GROUND_SPEED: &str = "gs";
pub const NAV_HEADING: &str = "nav_heading";
pub const RSSI: &str = "rssi";
pub const DISTANCE: &str = "distance";
pub const MESSAGES: &str = "messages_total";
pub const OBSERVED: &str = "recent_aircraft_observed";
pub const WITH_POSITION: &str = "recent_aircraft_with_position";
pub const WITH_MLAT: &str = "recent_aircraft_with_multilateration";
pub const TOTAL: &str = "recent_aircraft_total";
pub const MAX_RANGE: &str = "recent_aircraft_max_range";
pub const COUNT_BY_DIRECTION: &str = "recent_aircraft_with_direction";
pub const MAX_RANGE_BY_DIRECTION: &str = "recent_aircraft_max_range_by_direction";

const CONTACT_LABELS: &[&str] = &["flight", "hex"];
const PERIOD_LABELS: &[&str] = &["time_period"];
const DIRECTION_LABELS: &[&str] = &["direction", "time_period"];

/// Every family an aircraft pass owns.
pub const FAMILIES: &[FamilyDesc] = &[
    FamilyDesc::gauge(ALT_BARO, "Barometric Altitude.", CONTACT_LABELS),
    FamilyDesc::gauge(ALT_GEOM, "Geometric Altitude.", CONTACT_LABELS),
    FamilyDesc::gauge(BARO_RATE, "Rate of Barometric Change.", CONTACT_LABELS),
    FamilyDesc::gauge(GROUND_SPEED, "Ground Speed.", CONTACT_LABELS),
    FamilyDesc::gauge(NAV_HEADING, "Navigational Heading.", CONTACT_LABELS),
    FamilyDesc::gauge(RSSI, "Signal Strength.", CONTACT_LABELS),
    FamilyDesc::gauge(DISTANCE, "Distance from receiver in meters.", CONTACT_LABELS),
    FamilyDesc::gauge(MESSAGES, "Number of Messages.", PERIOD_LABELS),
    FamilyDesc::gauge(OBSERVED, "Recent Aircraft observed.", PERIOD_LABELS),
    FamilyDesc::gauge(
        WITH_POSITION,
        "Number of aircraft with position.",
        PERIOD_LABELS,
    ),
    FamilyDesc::gauge(
        WITH_MLAT,
        "Number of aircraft with multilateration position.",
        PERIOD_LABELS,
    ),
    FamilyDesc::gauge(TOTAL, "Aircraft in the snapshot.", PERIOD_LABELS),
    FamilyDesc::gauge(
        MAX_RANGE,
        "Maximum range of recently observed aircraft in meters.",
        PERIOD_LABELS,
    ),
    FamilyDesc::gauge(
        COUNT_BY_DIRECTION,
        "Aircraft count by direction.",
        DIRECTION_LABELS,
    ),
    FamilyDesc::gauge(
        MAX_RANGE_BY_DIRECTION,
        "Max distance by direction in meters.",
        DIRECTION_LABELS,
    ),
];

// ---------------------------------------------------------------------------
// Per-cycle state
// ---------------------------------------------------------------------------

/// Observations in one compass direction during one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectionBucket {
    pub count: u32,
    pub max_range: Option<f64>,
}

impl DirectionBucket {
    fn observe(&mut self, range_m: f64) {
        self.count += 1;
        raise(&mut self.max_range, range_m);
    }
}

/// Fleet-wide counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FleetSummary {
    pub total: u32,
    pub observed: u32,
    pub with_position: u32,
    pub with_mlat: u32,
    pub max_range: Option<f64>,
}

fn raise(max: &mut Option<f64>, value: f64) {
    match max {
        Some(m) if *m >= value => {}
        _ => *max = Some(value),
    }
}

/// Result of aggregating one aircraft snapshot.
#[derive(Debug, Clone)]
pub struct AircraftPass {
    pub summary: FleetSummary,
    pub directions: BTreeMap<&'static str, DirectionBucket>,
    pub messages: f64,
    /// Per-contact series built while accumulating.
    contacts: MetricBatch,
}

impl AircraftPass {
    fn reset(messages: f64) -> Self {
        let mut contacts = MetricBatch::new();
        for family in [
            ALT_BARO,
            ALT_GEOM,
            BARO_RATE,
            GROUND_SPEED,
            NAV_HEADING,
            RSSI,
            DISTANCE,
        ] {
            contacts.reset(family);
        }

        AircraftPass {
            summary: FleetSummary::default(),
            directions: DIRECTIONS
                .iter()
                .map(|d| (*d, DirectionBucket::default()))
                .collect(),
            messages,
            contacts,
        }
    }

    /// Full contents of every aircraft family, ready to publish.
    ///
    /// Counts are emitted for all eight directions, zeros included; maxima
    /// only where something was seen.
    pub fn into_batch(self) -> MetricBatch {
        let mut batch = self.contacts;
        let s = &self.summary;

        batch.set(MESSAGES, &[LATEST], self.messages);
        batch.set(OBSERVED, &[LATEST], s.observed as f64);
        batch.set(WITH_POSITION, &[LATEST], s.with_position as f64);
        batch.set(WITH_MLAT, &[LATEST], s.with_mlat as f64);
        batch.set(TOTAL, &[LATEST], s.total as f64);

        batch.reset(MAX_RANGE);
        if let Some(max) = s.max_range {
            batch.set(MAX_RANGE, &[LATEST], max);
        }

        batch.reset(COUNT_BY_DIRECTION);
        batch.reset(MAX_RANGE_BY_DIRECTION);
        for (&direction, bucket) in &self.directions {
            batch.set(COUNT_BY_DIRECTION, &[direction, LATEST], bucket.count as f64);
            if let Some(max) = bucket.max_range {
                batch.set(MAX_RANGE_BY_DIRECTION, &[direction, LATEST], max);
            }
        }
        batch
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Folds an aircraft snapshot into an [`AircraftPass`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactAggregator {
    pub rose: CompassRose,
}

impl ContactAggregator {
    pub fn new(rose: CompassRose) -> Self {
        ContactAggregator { rose }
    }

    /// Aggregate one snapshot. Without a reference point no ranges or
    /// directions are produced; everything else still is.
    pub fn aggregate(
        &self,
        snapshot: &AircraftSnapshot,
        reference: Option<ReferencePoint>,
    ) -> AircraftPass {
        let mut pass = AircraftPass::reset(snapshot.messages);

        for contact in &snapshot.aircraft {
            pass.summary.total += 1;
            let labels = [contact.flight_label(), contact.hex.as_str()];

            if contact.is_recent() {
                pass.summary.observed += 1;

                if contact.has_recent_position() {
                    pass.summary.with_position += 1;
                    if contact.is_mlat_position() {
                        pass.summary.with_mlat += 1;
                    }

                    if let (Some(receiver), Some(position)) = (reference, contact.position()) {
                        let range = geo::distance(&receiver, &position);
                        let direction = self.rose.bucket(geo::bearing(&receiver, &position));

                        if let Some(bucket) = pass.directions.get_mut(direction) {
                            bucket.observe(range);
                        }
                        raise(&mut pass.summary.max_range, range);
                        pass.contacts.set(DISTANCE, &labels, range);
                    }
                }
            }

            pass.contacts.set(ALT_BARO, &labels, contact.alt_baro);
            pass.contacts.set(ALT_GEOM, &labels, contact.alt_geom);
            pass.contacts.set(BARO_RATE, &labels, contact.baro_rate);
            pass.contacts.set(GROUND_SPEED, &labels, contact.gs);
            pass.contacts.set(NAV_HEADING, &labels, contact.nav_heading);
            pass.contacts.set(RSSI, &labels, contact.rssi);
        }

        pass
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Contact;

    fn receiver() -> Option<ReferencePoint> {
        Some(ReferencePoint::new(50.72, -113.99))
    }

    fn contact(hex: &str, lat: f64, lon: f64) -> Contact {
        Contact {
            hex: hex.into(),
            flight: Some(format!("{hex}  ")),
            lat: Some(lat),
            lon: Some(lon),
            seen: 1.0,
            seen_pos: Some(1.0),
            alt_baro: 30000.0,
            rssi: -20.0,
            ..Default::default()
        }
    }

    fn snapshot(aircraft: Vec<Contact>) -> AircraftSnapshot {
        AircraftSnapshot {
            now: None,
            messages: 42.0,
            aircraft,
        }
    }

    #[test]
    fn test_golden_contact() {
        let agg = ContactAggregator::default();
        let pass = agg.aggregate(&snapshot(vec![contact("c0ffee", 51.72, -115.99)]), receiver());

        assert_eq!(pass.summary.total, 1);
        assert_eq!(pass.summary.observed, 1);
        assert_eq!(pass.summary.with_position, 1);
        let nw = pass.directions["NW"];
        assert_eq!(nw.count, 1);
        assert!((nw.max_range.unwrap() - 178_218.9).abs() < 0.5);
        assert_eq!(pass.summary.max_range, nw.max_range);

        let batch = pass.into_batch();
        assert!(
            (batch.get(DISTANCE, &["c0ffee", "c0ffee"]).unwrap() - 178_218.9).abs() < 0.5
        );
        assert_eq!(batch.get(COUNT_BY_DIRECTION, &["NW", LATEST]), Some(1.0));
        assert_eq!(batch.get(COUNT_BY_DIRECTION, &["S", LATEST]), Some(0.0));
        assert_eq!(batch.get(MAX_RANGE_BY_DIRECTION, &["S", LATEST]), None);
        assert_eq!(batch.get(MESSAGES, &[LATEST]), Some(42.0));
    }

    #[test]
    fn test_freshness_gates() {
        let mut stale = contact("aaaaaa", 51.0, -114.0);
        stale.seen = 15.0;

        let mut stale_pos = contact("bbbbbb", 51.0, -114.0);
        stale_pos.seen_pos = Some(20.0);

        let mut mlat = contact("cccccc", 50.0, -114.0);
        mlat.mlat = vec!["lat".into(), "lon".into()];

        let mut no_pos = contact("dddddd", 0.0, 0.0);
        no_pos.lat = None;
        no_pos.lon = None;
        no_pos.seen_pos = None;

        let agg = ContactAggregator::default();
        let pass = agg.aggregate(&snapshot(vec![stale, stale_pos, mlat, no_pos]), receiver());

        assert_eq!(
            pass.summary,
            FleetSummary {
                total: 4,
                observed: 3,
                with_position: 1,
                with_mlat: 1,
                max_range: pass.directions["S"].max_range,
            }
        );
        let counted: u32 = pass.directions.values().map(|b| b.count).sum();
        assert_eq!(counted, 1);

        let batch = pass.into_batch();
        // telemetry is published for every contact, distance only with a fresh fix
        assert_eq!(batch.get(ALT_BARO, &["aaaaaa", "aaaaaa"]), Some(30000.0));
        assert_eq!(batch.get(ALT_BARO, &["dddddd", "dddddd"]), Some(30000.0));
        assert_eq!(batch.get(DISTANCE, &["aaaaaa", "aaaaaa"]), None);
        assert_eq!(batch.get(DISTANCE, &["bbbbbb", "bbbbbb"]), None);
        assert!(batch.get(DISTANCE, &["cccccc", "cccccc"]).is_some());
    }

    #[test]
    fn test_direction_max_is_monotonic() {
        let agg = ContactAggregator::default();
        let far = contact("000001", 52.72, -113.99);
        let near = contact("000002", 50.80, -113.99);
        let pass = agg.aggregate(&snapshot(vec![far, near]), receiver());

        let n = pass.directions["N"];
        assert_eq!(n.count, 2);
        assert!(n.max_range.unwrap() > 200_000.0);
        assert_eq!(pass.summary.max_range, n.max_range);
    }

    #[test]
    fn test_no_reference_point() {
        let agg = ContactAggregator::default();
        let pass = agg.aggregate(&snapshot(vec![contact("c0ffee", 51.72, -115.99)]), None);
        assert_eq!(pass.summary.with_position, 1);
        assert!(pass.summary.max_range.is_none());
        assert!(pass.directions.values().all(|b| b.count == 0));

        let batch = pass.into_batch();
        assert_eq!(batch.get(MAX_RANGE, &[LATEST]), None);
        assert_eq!(batch.get(DISTANCE, &["c0ffee", "c0ffee"]), None);
        assert!(batch.families().any(|f| f == MAX_RANGE));
    }

    #[test]
    fn test_empty_snapshot_resets_every_family() {
        let agg = ContactAggregator::default();
        let batch = agg.aggregate(&snapshot(Vec::new()), receiver()).into_batch();
        let families: Vec<&str> = batch.families().collect();
        for desc in FAMILIES {
            assert!(families.contains(&desc.name), "{} missing", desc.name);
        }
        assert_eq!(batch.get(TOTAL, &[LATEST]), Some(0.0));
    }

    #[test]
    fn test_flight_label_trimmed() {
        let mut c = contact("c0ffee", 51.72, -115.99);
        c.flight = Some("  WJA42 ".into());
        let batch = ContactAggregator::default()
            .aggregate(&snapshot(vec![c]), receiver())
            .into_batch();
        assert_eq!(batch.get(RSSI, &["WJA42", "c0ffee"]), Some(-20.0));
    }

    #[test]
    fn test_identical_snapshots_identical_batches() {
        let agg = ContactAggregator::new(CompassRose::Sixteen);
        let snap = snapshot(vec![
            contact("000001", 52.72, -113.99),
            contact("000002", 49.0, -110.0),
        ]);
        let a = agg.aggregate(&snap, receiver()).into_batch();
        let b = agg.aggregate(&snap, receiver()).into_batch();
        assert_eq!(a, b);
    }
}
