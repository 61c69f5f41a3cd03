//! dump1090-core: snapshot-to-metric derivation for dump1090 receivers.
//!
//! No async and no network: parsing, geodesy, aggregation and the metric
//! store. The `dump1090-exporter` binary fetches the JSON documents, drives
//! the two cadences and serves the rendered surface.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod geo;
pub mod snapshot;
pub mod stats;
pub mod surface;
pub mod types;

// Re-export commonly used types at crate root
pub use engine::{Engine, EngineConfig};
pub use geo::CompassRose;
pub use surface::{MetricBatch, MetricSurface};
pub use types::*;
