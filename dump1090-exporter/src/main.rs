//! dump1090-exporter: Prometheus metrics for a dump1090 receiver.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::{error, info, warn};

use dump1090_core::config::{self, Config};
use dump1090_core::stats::WindowSpec;
use dump1090_core::surface;
use dump1090_core::types::ReferencePoint;
use dump1090_core::{CompassRose, Engine, EngineConfig};

mod logging;
mod scheduler;
mod source;
mod web;

use scheduler::{PassStatus, Poller};

#[derive(Parser)]
#[command(
    name = "dump1090-exporter",
    version,
    about = "Prometheus exporter for dump1090 aircraft and receiver statistics"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll dump1090 and serve /metrics
    Serve {
        #[command(flatten)]
        common: CommonArgs,

        /// Address to listen on
        #[arg(long, env = "DUMP1090_EXPORTER_HOST")]
        host: Option<String>,

        /// Port to expose metrics on
        #[arg(long, env = "DUMP1090_EXPORTER_PORT")]
        port: Option<u16>,

        /// Seconds between aircraft.json reads
        #[arg(long)]
        aircraft_interval: Option<u64>,

        /// Seconds between stats.json reads
        #[arg(long)]
        stats_interval: Option<u64>,
    },

    /// Run one aircraft and one stats pass and print the resulting series
    Inspect {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print the effective configuration
    Config {
        #[command(flatten)]
        common: CommonArgs,

        /// Also write it to ~/.dump1090-exporter/config.yaml
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Directory or http(s) URL holding aircraft.json, stats.json and receiver.json
    #[arg(long, env = "DUMP1090_PATH")]
    path: Option<String>,

    /// Config file (default ~/.dump1090-exporter/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Receiver latitude; overrides receiver.json
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Receiver longitude; overrides receiver.json
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Comma-separated stats windows to publish, e.g. "latest,last1min,last15min"
    #[arg(long)]
    windows: Option<String>,

    /// Compass buckets: 8 or the coarse 16-slot table
    #[arg(long, value_parser = ["8", "16"])]
    compass: Option<String>,
}

impl CommonArgs {
    /// Config file values overlaid with whatever was given on the command line.
    fn resolve(&self) -> Result<Config, dump1090_core::ExporterError> {
        let mut config = config::load_config(self.config.as_ref())?;

        if let Some(path) = &self.path {
            config.source.path = path.clone();
        }
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            config.receiver.lat = Some(lat);
            config.receiver.lon = Some(lon);
        }
        if let Some(windows) = &self.windows {
            config.metrics.windows = WindowSpec::parse_list(windows)?;
        }
        if let Some(rose) = self.compass.as_deref().and_then(CompassRose::from_slots) {
            config.metrics.compass = rose;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Commands::Serve {
            common,
            host,
            port,
            aircraft_interval,
            stats_interval,
        } => {
            let mut config = resolve_or_exit(&common);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(secs) = aircraft_interval.filter(|&s| s > 0) {
                config.schedule.aircraft_secs = secs;
            }
            if let Some(secs) = stats_interval.filter(|&s| s > 0) {
                config.schedule.stats_secs = secs;
            }
            cmd_serve(config).await
        }
        Commands::Inspect { common } => cmd_inspect(resolve_or_exit(&common)).await,
        Commands::Config { common, save } => cmd_config(&resolve_or_exit(&common), save),
    }
}

fn resolve_or_exit(common: &CommonArgs) -> Config {
    common.resolve().unwrap_or_else(|e| {
        error!("{e}");
        std::process::exit(1);
    })
}

fn build_poller(config: &Config) -> (Arc<Engine>, Arc<PassStatus>, Poller) {
    let pinned = config.receiver.reference_point();
    let engine = Arc::new(Engine::new(EngineConfig {
        rose: config.metrics.compass,
        windows: config.metrics.windows.clone(),
        reference: pinned,
    }));

    let source = source::open_source(&config.source.path).unwrap_or_else(|e| {
        error!("cannot open source {}: {e}", config.source.path);
        std::process::exit(1);
    });

    let status = Arc::new(PassStatus::default());
    let poller = Poller::new(
        Arc::clone(&engine),
        source,
        Arc::clone(&status),
        pinned.is_some(),
    );
    (engine, status, poller)
}

async fn log_reference(poller: &Poller) -> Option<ReferencePoint> {
    match poller.refresh_receiver().await {
        Ok(Some(point)) => Some(point),
        Ok(None) => {
            warn!("receiver location unknown; range and direction metrics disabled until receiver.json has lat/lon");
            None
        }
        Err(e) => {
            warn!(error = %e, "receiver refresh failed");
            None
        }
    }
}

async fn cmd_serve(config: Config) {
    let (engine, status, poller) = build_poller(&config);

    info!(
        source = %poller.source().describe(),
        aircraft_secs = config.schedule.aircraft_secs,
        stats_secs = config.schedule.stats_secs,
        "polling dump1090"
    );
    log_reference(&poller).await;

    let poller = Arc::new(poller);
    let (aircraft_task, stats_task) = poller.spawn(
        Duration::from_secs(config.schedule.aircraft_secs),
        Duration::from_secs(config.schedule.stats_secs),
    );

    let registry = surface::registry(engine.shared_surface()).unwrap_or_else(|e| {
        error!("cannot register metrics: {e}");
        std::process::exit(1);
    });

    let state = Arc::new(web::AppState {
        engine,
        status,
        registry,
    });
    let served = web::serve(state, &config.server.host, config.server.port).await;

    aircraft_task.abort();
    stats_task.abort();

    if let Err(e) = served {
        error!(
            "cannot serve on {}:{}: {e}",
            config.server.host, config.server.port
        );
        std::process::exit(1);
    }
}

async fn cmd_inspect(config: Config) {
    let (engine, _status, poller) = build_poller(&config);
    let reference = log_reference(&poller).await;

    let aircraft = poller.poll_aircraft().await;
    let stats = poller.poll_stats().await;

    let samples = engine.surface().samples();
    if !samples.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Metric", "Labels", "Value"]);
        for s in &samples {
            let labels: Vec<String> = s.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
            table.add_row(vec![
                Cell::new(&s.name),
                Cell::new(labels.join(", ")),
                Cell::new(s.value),
            ]);
        }
        println!("{table}");
    }

    println!();
    println!("Source: {}", poller.source().describe());
    match reference {
        Some(p) => println!("  Receiver:  {:.4}, {:.4}", p.lat, p.lon),
        None => println!("  Receiver:  unknown"),
    }
    match aircraft {
        Ok(Some(r)) => println!(
            "  Aircraft:  {} total, {} recent, {} with position, {} mlat",
            r.summary.total, r.summary.observed, r.summary.with_position, r.summary.with_mlat
        ),
        Ok(None) => println!("  Aircraft:  aircraft.json not found"),
        Err(e) => println!("  Aircraft:  {e}"),
    }
    match stats {
        Ok(Some(r)) => println!("  Stats:     {} windows, {} series", r.windows, r.series),
        Ok(None) => println!("  Stats:     stats.json not found"),
        Err(e) => println!("  Stats:     {e}"),
    }
    println!("  Series:    {}", samples.len());
    println!();
}

fn cmd_config(config: &Config, save: bool) {
    print!("{}", config::serialize_config(config));
    if save {
        match config::save_config(config) {
            Ok(path) => info!("config written to {}", path.display()),
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        }
    }
}
