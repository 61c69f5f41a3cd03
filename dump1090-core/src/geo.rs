//! Range and bearing from the receiver, and compass bucketing of bearings.
//!
//! Distances are haversine great-circle meters on a spherical Earth. Bearings
//! come from the raw latitude/longitude offsets, which is what dump1090 range
//! dashboards have always plotted; they are not true initial great-circle
//! courses.

use crate::types::ReferencePoint;

// ---------------------------------------------------------------------------
// Haversine
// ---------------------------------------------------------------------------

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
///
/// Symmetric in its arguments and exactly zero for identical points. The
/// haversine term is clamped to `[0, 1]` so rounding near antipodal points
/// cannot push the square roots out of their domain.
pub fn distance(p1: &ReferencePoint, p2: &ReferencePoint) -> f64 {
    let dlat = (p2.lat - p1.lat).to_radians();
    let dlon = (p2.lon - p1.lon).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + p1.lat.to_radians().cos() * p2.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

// ---------------------------------------------------------------------------
// Bearing
// ---------------------------------------------------------------------------

/// Bearing in degrees `[0, 360)` from `from` towards `to`.
///
/// Argument order matters: `bearing(receiver, aircraft)` points at the
/// aircraft, `bearing(aircraft, receiver)` points back at the receiver and
/// differs by 180°. On equal latitudes the result is exactly 90 when `to`
/// lies east and 270 otherwise.
pub fn bearing(from: &ReferencePoint, to: &ReferencePoint) -> f64 {
    let dlat = to.lat - from.lat;
    let dlon = to.lon - from.lon;

    if dlat == 0.0 {
        return if dlon > 0.0 { 90.0 } else { 270.0 };
    }

    normalize_degrees(dlon.atan2(dlat).to_degrees())
}

/// Fold any angle into `[0, 360)`. NaN folds to 0.
pub fn normalize_degrees(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let d = deg.rem_euclid(360.0);
    // rem_euclid can round tiny negatives up to exactly 360.0
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}

// ---------------------------------------------------------------------------
// Compass buckets
// ---------------------------------------------------------------------------

/// The fixed label set every bucketing produces.
pub const DIRECTIONS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Coarse 16-slot lookup, one slot per 22.5°. Half-step labels are repeated
/// rather than spelled out (`NNE`, `ENE`, ...), which makes every 45° sector
/// centred on its cardinal or intercardinal label.
pub const COARSE_16: [&str; 16] = [
    "N", "NE", "NE", "E", "E", "SE", "SE", "S", "S", "SW", "SW", "W", "W", "NW", "NW", "N",
];

/// How bearings are bucketed into compass labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompassRose {
    /// Eight 45° sectors centred on each label.
    #[default]
    Eight,
    /// The coarse 16-slot table ([`COARSE_16`]).
    Sixteen,
}

impl CompassRose {
    /// Map a bearing to its compass label. Total over every `f64`; exact
    /// sector boundaries belong to the upper sector.
    pub fn bucket(&self, bearing_deg: f64) -> &'static str {
        let b = normalize_degrees(bearing_deg);
        match self {
            CompassRose::Eight => {
                let idx = ((b + 22.5) / 45.0) as usize % DIRECTIONS.len();
                DIRECTIONS[idx]
            }
            CompassRose::Sixteen => {
                let idx = ((b / 22.5) as usize).min(COARSE_16.len() - 1);
                COARSE_16[idx]
            }
        }
    }

    /// Parse `8` or `16`.
    pub fn from_slots(slots: &str) -> Option<Self> {
        match slots.trim() {
            "8" => Some(CompassRose::Eight),
            "16" => Some(CompassRose::Sixteen),
            _ => None,
        }
    }

    pub fn slots(&self) -> u8 {
        match self {
            CompassRose::Eight => 8,
            CompassRose::Sixteen => 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
