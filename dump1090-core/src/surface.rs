//! Label-keyed metric store, exposed to Prometheus through a custom
//! collector.
//!
//! Families are registered once when the surface is built and never added
//! or removed afterwards, so the family map itself needs no lock. Each
//! family owns its series behind its own `RwLock`; writers for different
//! families never contend.
//!
//! A pass publishes a [`MetricBatch`]: every family named in the batch is
//! replaced by the batch contents in one write. Series whose label set is
//! not in the batch disappear, new ones appear, and readers never observe a
//! family half-way through a rebuild. Families are swapped one at a time, so
//! two families can briefly come from different passes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use prometheus::core::{Collector, Desc};
use prometheus::{proto, Registry, TextEncoder};

use crate::types::{ExporterError, Result};

/// Prefix of every exported metric name.
pub const NAMESPACE: &str = "dump1090";

/// Ordered label values of one series; order follows [`FamilyDesc::labels`].
pub type LabelValues = Vec<String>;

// ---------------------------------------------------------------------------
// Family descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn proto_type(&self) -> proto::MetricType {
        match self {
            MetricKind::Gauge => proto::MetricType::GAUGE,
            MetricKind::Counter => proto::MetricType::COUNTER,
        }
    }
}

/// Static description of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyDesc {
    /// Name without the namespace prefix.
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

impl FamilyDesc {
    pub const fn gauge(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        FamilyDesc {
            name,
            help,
            kind: MetricKind::Gauge,
            labels,
        }
    }

    pub const fn counter(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        FamilyDesc {
            name,
            help,
            kind: MetricKind::Counter,
            labels,
        }
    }

    /// Exported name, e.g. `dump1090_alt_baro`.
    pub fn full_name(&self) -> String {
        format!("{NAMESPACE}_{}", self.name)
    }

    fn check_arity(&self, actual: usize) -> Result<()> {
        if actual != self.labels.len() {
            return Err(ExporterError::LabelArity {
                family: self.full_name(),
                expected: self.labels.len(),
                actual,
            });
        }
        Ok(())
    }
}

fn owned_labels(labels: &[&str]) -> LabelValues {
    labels.iter().map(|l| l.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// The complete new contents of the families one pass touches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBatch {
    families: BTreeMap<&'static str, BTreeMap<LabelValues, f64>>,
}

impl MetricBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a family as owned by this batch even if it ends up empty, so
    /// publishing clears whatever the previous pass left in it.
    pub fn reset(&mut self, family: &'static str) {
        self.families.entry(family).or_default();
    }

    /// Set one series. A repeated label set overwrites the earlier value.
    pub fn set(&mut self, family: &'static str, labels: &[&str], value: f64) {
        self.families
            .entry(family)
            .or_default()
            .insert(owned_labels(labels), value);
    }

    pub fn get(&self, family: &str, labels: &[&str]) -> Option<f64> {
        self.families
            .get(family)?
            .get(&owned_labels(labels))
            .copied()
    }

    pub fn families(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.families.keys().copied()
    }

    /// Total number of series across all families.
    pub fn series_count(&self) -> usize {
        self.families.values().map(BTreeMap::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Family {
    desc: FamilyDesc,
    series: RwLock<BTreeMap<LabelValues, f64>>,
}

/// One rendered series, as returned by [`MetricSurface::samples`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
}

/// The published metric surface shared by both cadences and the readers.
#[derive(Debug)]
pub struct MetricSurface {
    families: BTreeMap<&'static str, Family>,
}

impl MetricSurface {
    /// Build a surface with a fixed set of families. A later descriptor with
    /// the same name replaces an earlier one.
    pub fn new(descs: &[FamilyDesc]) -> Self {
        let families = descs
            .iter()
            .map(|d| {
                (
                    d.name,
                    Family {
                        desc: *d,
                        series: RwLock::new(BTreeMap::new()),
                    },
                )
            })
            .collect();
        MetricSurface { families }
    }

    fn family(&self, name: &str) -> Result<&Family> {
        self.families
            .get(name)
            .ok_or_else(|| ExporterError::UnknownFamily(name.to_string()))
    }

    /// Drop every series of a family.
    pub fn reset_family(&self, name: &str) -> Result<()> {
        let family = self.family(name)?;
        family
            .series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    /// Set one series, creating it if needed.
    pub fn set_series(&self, name: &str, labels: &[&str], value: f64) -> Result<()> {
        let family = self.family(name)?;
        family.desc.check_arity(labels.len())?;
        family
            .series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owned_labels(labels), value);
        Ok(())
    }

    /// Add to a series, starting from zero if it does not exist yet.
    pub fn increment(&self, name: &str, labels: &[&str], by: f64) -> Result<()> {
        let family = self.family(name)?;
        family.desc.check_arity(labels.len())?;
        *family
            .series
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(owned_labels(labels))
            .or_insert(0.0) += by;
        Ok(())
    }

    /// Replace every family named in `batch` with the batch contents.
    ///
    /// The whole batch is validated before anything is written: an unknown
    /// family or a wrong label count leaves the surface untouched.
    pub fn publish(&self, batch: MetricBatch) -> Result<()> {
        for (name, series) in &batch.families {
            let family = self.family(name)?;
            for labels in series.keys() {
                family.desc.check_arity(labels.len())?;
            }
        }

        for (name, series) in batch.families {
            let family = self.family(name)?;
            *family
                .series
                .write()
                .unwrap_or_else(PoisonError::into_inner) = series;
        }
        Ok(())
    }

    /// Current value of one series.
    pub fn get(&self, name: &str, labels: &[&str]) -> Option<f64> {
        let family = self.families.get(name)?;
        let series = family.series.read().unwrap_or_else(PoisonError::into_inner);
        series.get(&owned_labels(labels)).copied()
    }

    /// All series of one family, ordered by label values.
    pub fn series(&self, name: &str) -> Vec<(LabelValues, f64)> {
        match self.families.get(name) {
            Some(family) => family
                .series
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every series on the surface, families in name order.
    pub fn samples(&self) -> Vec<Sample> {
        let mut out = Vec::new();
        for family in self.families.values() {
            let name = family.desc.full_name();
            let series = family.series.read().unwrap_or_else(PoisonError::into_inner);
            for (values, value) in series.iter() {
                out.push(Sample {
                    name: name.clone(),
                    labels: family
                        .desc
                        .labels
                        .iter()
                        .copied()
                        .zip(values.iter().cloned())
                        .collect(),
                    value: *value,
                });
            }
        }
        out
    }

    /// Families with at least one series, as Prometheus protobuf families.
    ///
    /// Each family is read under its own lock, so every returned family is
    /// internally consistent. Empty families are left out.
    pub fn gather(&self) -> Vec<proto::MetricFamily> {
        self.families.values().filter_map(Family::to_proto).collect()
    }

    /// Render the surface in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        TextEncoder::new().encode_utf8(&self.gather(), &mut out)?;
        Ok(out)
    }
}

impl Family {
    fn to_proto(&self) -> Option<proto::MetricFamily> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        if series.is_empty() {
            return None;
        }

        let mut mf = proto::MetricFamily::default();
        mf.set_name(self.desc.full_name());
        mf.set_help(self.desc.help.to_string());
        mf.set_field_type(self.desc.kind.proto_type());

        for (values, value) in series.iter() {
            let mut m = proto::Metric::default();
            for (label, v) in self.desc.labels.iter().zip(values) {
                let mut pair = proto::LabelPair::default();
                pair.set_name(label.to_string());
                pair.set_value(v.clone());
                m.mut_label().push(pair);
            }
            match self.desc.kind {
                MetricKind::Gauge => {
                    let mut g = proto::Gauge::default();
                    g.set_value(*value);
                    m.set_gauge(g);
                }
                MetricKind::Counter => {
                    let mut c = proto::Counter::default();
                    c.set_value(*value);
                    m.set_counter(c);
                }
            }
            mf.mut_metric().push(m);
        }
        Some(mf)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Exposes a shared [`MetricSurface`] to a Prometheus [`Registry`].
pub struct SurfaceCollector {
    surface: Arc<MetricSurface>,
    descs: Vec<Desc>,
}

impl SurfaceCollector {
    pub fn new(surface: Arc<MetricSurface>) -> Result<Self> {
        let descs = surface
            .families
            .values()
            .map(|f| {
                Desc::new(
                    f.desc.full_name(),
                    f.desc.help.to_string(),
                    f.desc.labels.iter().map(|l| l.to_string()).collect(),
                    HashMap::new(),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;
        Ok(SurfaceCollector { surface, descs })
    }
}

impl Collector for SurfaceCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        self.surface.gather()
    }
}

/// A registry holding exactly the given surface.
pub fn registry(surface: Arc<MetricSurface>) -> Result<Registry> {
    let registry = Registry::new();
    registry.register(Box::new(SurfaceCollector::new(surface)?))?;
    Ok(registry)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
