//! Receiver statistics fan-out: one `stats.json` → one set of series per
//! allow-listed window, labelled by `time_period`.
//!
//! The instantaneous `latest` window has no meaningful message volume or
//! signal figures in dump1090 output, so those groups are only published for
//! trailing windows. A group or leaf missing from the document is skipped,
//! never zero-filled.

use crate::snapshot::{StatWindow, StatsSnapshot};
use crate::surface::{FamilyDesc, MetricBatch};
use crate::types::{ExporterError, Result};

// ---------------------------------------------------------------------------
// Window allow-list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// A point-in-time window such as `latest`.
    Instantaneous,
    /// A window covering a trailing duration such as `last1min`.
    Trailing,
}

/// One window the exporter publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub name: String,
    pub kind: WindowKind,
}

impl WindowSpec {
    pub fn instantaneous(name: &str) -> Self {
        WindowSpec {
            name: name.to_string(),
            kind: WindowKind::Instantaneous,
        }
    }

    pub fn trailing(name: &str) -> Self {
        WindowSpec {
            name: name.to_string(),
            kind: WindowKind::Trailing,
        }
    }

    /// Parse `name` or `name:instant`. `latest` is instantaneous even
    /// without the suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (name, kind) = match text.split_once(':') {
            Some((name, "instant")) => (name.trim(), WindowKind::Instantaneous),
            Some((name, "trailing")) => (name.trim(), WindowKind::Trailing),
            Some(_) => return None,
            None if text == "latest" => (text, WindowKind::Instantaneous),
            None => (text, WindowKind::Trailing),
        };
        if name.is_empty() {
            return None;
        }
        Some(WindowSpec {
            name: name.to_string(),
            kind,
        })
    }

    /// Parse a comma-separated list of window specs.
    pub fn parse_list(text: &str) -> Result<Vec<Self>> {
        text.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                WindowSpec::parse(s)
                    .ok_or_else(|| ExporterError::Config(format!("invalid window spec: {s:?}")))
            })
            .collect()
    }

    pub fn label(&self) -> String {
        match self.kind {
            WindowKind::Instantaneous => format!("{}:instant", self.name),
            WindowKind::Trailing => self.name.clone(),
        }
    }
}

/// The windows published when nothing else is configured.
pub fn default_windows() -> Vec<WindowSpec> {
    vec![
        WindowSpec::instantaneous("latest"),
        WindowSpec::trailing("last1min"),
    ]
}

// ---------------------------------------------------------------------------
// Metric families
// ---------------------------------------------------------------------------

const WINDOW_LABELS: &[&str] = &["time_period"];

macro_rules! stat_families {
    ($($name:literal => $help:literal),* $(,)?) => {
        &[$(FamilyDesc::gauge($name, $help, WINDOW_LABELS)),*]
    };
}

/// Every family a stats pass owns.
pub const FAMILIES: &[FamilyDesc] = stat_families![
    "stats_messages_total" => "Total number of Mode-S messages processed",

    "stats_cpr_airborne" => "Airborne CPR messages received",
    "stats_cpr_filtered" => "CPR messages ignored because they matched a filter",
    "stats_cpr_global_bad" => "Global positions rejected as inconsistent",
    "stats_cpr_global_ok" => "Global positions successfully derived",
    "stats_cpr_global_range" => "Global positions rejected by the receiver range check",
    "stats_cpr_global_skipped" => "Global position attempts skipped due to missing data",
    "stats_cpr_global_speed" => "Global positions rejected due to speed check",
    "stats_cpr_local_aircraft_relative" => "Local positions relative to a previous aircraft position",
    "stats_cpr_local_ok" => "Local (relative) positions successfully found",
    "stats_cpr_local_range" => "Local positions rejected by the receiver range check",
    "stats_cpr_local_receiver_relative" => "Local positions relative to the receiver position",
    "stats_cpr_local_skipped" => "Local position attempts skipped due to missing data",
    "stats_cpr_local_speed" => "Local positions rejected due to speed check",
    "stats_cpr_surface" => "Surface CPR messages received",

    "stats_cpu_background_milliseconds" => "Milliseconds spent in network I/O and periodic tasks",
    "stats_cpu_demod_milliseconds" => "Milliseconds spent demodulating",
    "stats_cpu_reader_milliseconds" => "Milliseconds spent reading samples from the SDR",

    "stats_local_accepted" => "Valid Mode S messages accepted with no bit errors corrected",
    "stats_local_bad" => "Number of Mode S preambles that didn't result in a valid message",
    "stats_local_modeac" => "Mode A/C preambles decoded",
    "stats_local_modes" => "Number of Mode S preambles received",
    "stats_local_noise_level_dbFS" => "Noise level dbFS",
    "stats_local_peak_signal_strength_dbFS" => "Peak signal strength dbFS",
    "stats_local_samples_dropped" => "Number of samples dropped",
    "stats_local_samples_processed" => "Number of samples processed",
    "stats_local_signal_strength_dbFS" => "Signal strength dbFS",
    "stats_local_strong_signals" => "Number of messages that had a signal power above -3dBFS",
    "stats_local_unknown_icao" => "Number of Mode S preambles containing unrecognized ICAO",

    "stats_remote_accepted" => "Valid Mode S messages accepted from network inputs with no bit errors corrected",
    "stats_remote_bad" => "Network messages that didn't result in a valid message",
    "stats_remote_modeac" => "Number of Mode A/C messages received from network inputs",
    "stats_remote_modes" => "Number of Mode S messages received from network inputs",
    "stats_remote_unknown_icao" => "Network Mode S messages containing unrecognized ICAO",

    "stats_tracks_all" => "Number of tracks created",
    "stats_tracks_single_message" => "Number of tracks consisting of only a single message",
];

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Publishes allow-listed windows of a statistics snapshot.
#[derive(Debug, Clone)]
pub struct WindowFanout {
    windows: Vec<WindowSpec>,
}

impl Default for WindowFanout {
    fn default() -> Self {
        WindowFanout::new(default_windows())
    }
}

impl WindowFanout {
    pub fn new(windows: Vec<WindowSpec>) -> Self {
        WindowFanout { windows }
    }

    pub fn windows(&self) -> &[WindowSpec] {
        &self.windows
    }

    /// Build the full contents of every stats family.
    ///
    /// Windows not in the allow-list are ignored. An allow-listed window
    /// that is present but not a window object fails the whole snapshot.
    pub fn fan_out(&self, snapshot: &StatsSnapshot) -> Result<MetricBatch> {
        let mut batch = MetricBatch::new();
        for desc in FAMILIES {
            batch.reset(desc.name);
        }

        for spec in &self.windows {
            if let Some(window) = snapshot.window(&spec.name)? {
                publish_window(&mut batch, spec, &window);
            }
        }
        Ok(batch)
    }
}

struct WindowWriter<'a> {
    batch: &'a mut MetricBatch,
    label: &'a str,
}

impl WindowWriter<'_> {
    fn put(&mut self, family: &'static str, value: Option<f64>) {
        if let Some(v) = value {
            self.batch.set(family, &[self.label], v);
        }
    }
}

fn publish_window(batch: &mut MetricBatch, spec: &WindowSpec, window: &StatWindow) {
    let mut w = WindowWriter {
        batch,
        label: &spec.name,
    };

    if let Some(cpr) = &window.cpr {
        w.put("stats_cpr_airborne", cpr.airborne);
        w.put("stats_cpr_filtered", cpr.filtered);
        w.put("stats_cpr_global_bad", cpr.global_bad);
        w.put("stats_cpr_global_ok", cpr.global_ok);
        w.put("stats_cpr_global_range", cpr.global_range);
        w.put("stats_cpr_global_skipped", cpr.global_skipped);
        w.put("stats_cpr_local_aircraft_relative", cpr.local_aircraft_relative);
        w.put("stats_cpr_local_ok", cpr.local_ok);
        w.put("stats_cpr_local_range", cpr.local_range);
        w.put("stats_cpr_local_receiver_relative", cpr.local_receiver_relative);
        w.put("stats_cpr_local_skipped", cpr.local_skipped);
        w.put("stats_cpr_surface", cpr.surface);
    }

    if let Some(cpu) = &window.cpu {
        w.put("stats_cpu_background_milliseconds", cpu.background);
        w.put("stats_cpu_demod_milliseconds", cpu.demod);
        w.put("stats_cpu_reader_milliseconds", cpu.reader);
    }

    if spec.kind == WindowKind::Instantaneous {
        return;
    }

    w.put("stats_messages_total", window.messages);

    if let Some(cpr) = &window.cpr {
        w.put("stats_cpr_local_speed", cpr.local_speed);
        w.put("stats_cpr_global_speed", cpr.global_speed);
    }

    if let Some(local) = &window.local {
        w.put("stats_local_accepted", local.accepted.first().copied());
        w.put("stats_local_bad", local.bad);
        w.put("stats_local_modeac", local.modeac);
        w.put("stats_local_modes", local.modes);
        w.put("stats_local_noise_level_dbFS", local.noise);
        w.put("stats_local_peak_signal_strength_dbFS", local.peak_signal);
        w.put("stats_local_samples_dropped", local.samples_dropped);
        w.put("stats_local_samples_processed", local.samples_processed);
        w.put("stats_local_signal_strength_dbFS", local.signal);
        w.put("stats_local_strong_signals", local.strong_signals);
        w.put("stats_local_unknown_icao", local.unknown_icao);
    }

    if let Some(remote) = &window.remote {
        w.put("stats_remote_accepted", remote.accepted.first().copied());
        w.put("stats_remote_bad", remote.bad);
        w.put("stats_remote_modeac", remote.modeac);
        w.put("stats_remote_modes", remote.modes);
        w.put("stats_remote_unknown_icao", remote.unknown_icao);
    }

    if let Some(tracks) = &window.tracks {
        w.put("stats_tracks_all", tracks.all);
        w.put("stats_tracks_single_message", tracks.single_message);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
