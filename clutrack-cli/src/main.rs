//! clutrack: command-line driver for segment-based track reconstruction.
//!
//! Events are read from JSON files (one event object or an array of them).
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

mod synthetic;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use clutrack_algorithms::{
    check_truth, reconstruct_event, CircleHelixFitter, EventReconstruction, ReconstructionConfig,
    RunStatistics,
};
use clutrack_core::{CylindricalLayers, Event, LeftoverStrategy, NoopObserver};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] clutrack_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Leftover matching strategy selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Best leftover hit for each track crossing point
    BestHitPerTrack,
    /// Best track for each leftover hit
    BestTrackPerHit,
}

impl From<Strategy> for LeftoverStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::BestHitPerTrack => Self::BestHitPerTrack,
            Strategy::BestTrackPerHit => Self::BestTrackPerHit,
        }
    }
}

/// Detector layout of the reference geometry.
#[derive(Args, Debug, Clone)]
struct GeometryArgs {
    /// Radius of the innermost layer boundary (mm)
    #[arg(long, default_value = "385.0")]
    r_min: f64,

    /// Radius of the outermost layer boundary (mm)
    #[arg(long, default_value = "1705.0")]
    r_max: f64,

    /// Number of layers
    #[arg(long, default_value = "220")]
    layers: usize,
}

impl GeometryArgs {
    fn geometry(&self) -> Result<CylindricalLayers> {
        if !(self.r_min > 0.0 && self.r_max > self.r_min && self.layers > 0) {
            return Err(clutrack_core::Error::InvalidConfig(format!(
                "bad geometry: r_min {} r_max {} layers {}",
                self.r_min, self.r_max, self.layers
            ))
            .into());
        }
        Ok(CylindricalLayers::new(self.r_min, self.r_max, self.layers))
    }
}

/// Configuration file and per-value overrides.
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// JSON reconstruction configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input collection to use (repeatable; default: all)
    #[arg(long = "collection")]
    collections: Vec<String>,

    /// Hit distance cut for the initial clustering (mm)
    #[arg(long)]
    distance_cut: Option<f64>,

    /// Minimum segment size
    #[arg(long)]
    min_segment_size: Option<usize>,

    /// Allowed fraction of duplicate-layer hits per segment
    #[arg(long)]
    duplicate_fraction: Option<f64>,

    /// Radius of the inner region kept out of clustering (mm)
    #[arg(long)]
    r_cut: Option<f64>,

    /// Width of the layer ranges used by the repair passes
    #[arg(long)]
    row_range_width: Option<usize>,

    /// Leftover matching strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Disable the final helix merging
    #[arg(long)]
    no_merge: bool,
}

impl ConfigArgs {
    fn load(&self) -> Result<ReconstructionConfig> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
            None => ReconstructionConfig::default(),
        };
        if !self.collections.is_empty() {
            config = config.with_input_collections(self.collections.iter().cloned());
        }
        if let Some(cut) = self.distance_cut {
            config = config.with_distance_cut(cut);
        }
        if let Some(size) = self.min_segment_size {
            config = config.with_min_segment_size(size);
        }
        if let Some(fraction) = self.duplicate_fraction {
            config = config.with_duplicate_fraction(fraction);
        }
        if let Some(r_cut) = self.r_cut {
            config = config.with_r_cut(r_cut);
        }
        if let Some(width) = self.row_range_width {
            config = config.with_row_range_width(width);
        }
        if let Some(strategy) = self.strategy {
            config.leftover.strategy = strategy.into();
        }
        if self.no_merge {
            config = config.with_merging(false);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Segment-based track reconstruction for cylindrical tracking detectors.
#[derive(Parser)]
#[command(name = "clutrack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads for segment fitting (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct tracks in JSON event files
    Reconstruct {
        /// Input event file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        geometry: GeometryArgs,

        /// Compare tracks against the truth labels of the hits
        #[arg(long)]
        check_truth: bool,
    },

    /// Show information about an event file
    Info {
        /// Input event file
        input: PathBuf,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Time the reconstruction of every event in a file
    Benchmark {
        /// Input event file
        input: PathBuf,

        /// Number of iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,

        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        geometry: GeometryArgs,
    },

    /// Write synthetic events to stdout
    Generate {
        /// Number of events
        #[arg(long, default_value = "1")]
        events: usize,

        /// Helices per event
        #[arg(long, default_value = "10")]
        tracks: usize,

        /// Random noise hits per event
        #[arg(long, default_value = "0")]
        noise: usize,

        /// Random seed
        #[arg(long, default_value = "12345")]
        seed: u64,

        #[command(flatten)]
        geometry: GeometryArgs,
    },
}

/// An event file holds one event or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum EventFile {
    Many(Vec<Event>),
    One(Event),
}

fn read_events(path: &Path) -> Result<Vec<Event>> {
    let file: EventFile = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    Ok(match file {
        EventFile::Many(events) => events,
        EventFile::One(event) => vec![event],
    })
}

/// Reconstructs each event and hands the result to `report`. An event that
/// fails is logged and skipped. Returns the number of failed events.
fn process_events<'e, F, R>(
    events: impl IntoIterator<Item = &'e Event>,
    mut reconstruct: F,
    mut report: R,
) -> usize
where
    F: FnMut(&Event) -> clutrack_core::Result<EventReconstruction>,
    R: FnMut(EventReconstruction),
{
    let mut failed = 0;
    for event in events {
        match reconstruct(event) {
            Ok(out) => report(out),
            Err(e) => {
                log::error!("event {}: {}", event.number, e);
                failed += 1;
            }
        }
    }
    failed
}

/// Prints the per-event summary line and, with `truth`, the truth report.
/// Returns the impure track and split particle counts.
fn print_event(out: &EventReconstruction, truth: bool) -> (usize, usize) {
    let stats = &out.statistics;
    println!(
        "event {:>6}: {:>6} hits, {:>4} segments, {:>4} tracks ({} merged), \
         {:>6} used, {:>6} unused, {} diagnostics, {:.2?}",
        out.event,
        stats.hit_count,
        stats.clean_segments,
        stats.track_count,
        stats.merged_tracks,
        stats.used_hits,
        stats.unused_hits,
        out.diagnostics.len(),
        stats.elapsed
    );
    for diagnostic in &out.diagnostics {
        log::debug!("event {}: {}", out.event, diagnostic);
    }
    if !truth {
        return (0, 0);
    }
    let report = check_truth(&out.hits, &out.tracks);
    for track in &report.impure {
        println!(
            "  impure track {}: {:.1}% from particle {:?}",
            track.track,
            100.0 * track.purity,
            track.dominant
        );
    }
    for particle in &report.split {
        println!(
            "  particle {} split over tracks {:?}",
            particle.truth_id, particle.shares
        );
    }
    (report.impure.len(), report.split.len())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    match cli.command {
        Commands::Reconstruct {
            input,
            config,
            geometry,
            check_truth: truth,
        } => {
            let config = config.load()?;
            let geometry = geometry.geometry()?;
            let fitter = CircleHelixFitter::new(geometry.clone());

            let start = Instant::now();
            let mut run = RunStatistics::default();
            let (mut impure, mut split) = (0usize, 0usize);
            let mut failed = 0usize;

            for path in &input {
                log::info!("reading {}", path.display());
                let events = read_events(path)?;
                failed += process_events(
                    &events,
                    |event| {
                        reconstruct_event(event, &config, &geometry, &fitter, &mut NoopObserver)
                    },
                    |out| {
                        let (i, s) = print_event(&out, truth);
                        impure += i;
                        split += s;
                        run.accumulate(&out.statistics);
                    },
                );
            }

            let elapsed = start.elapsed();
            let totals = &run.totals;
            println!(
                "Processed {} events from {} files in {:.2}s",
                run.events,
                input.len(),
                elapsed.as_secs_f64()
            );
            println!("Total hits: {}", totals.hit_count);
            println!(
                "Total tracks: {} ({} merged)",
                totals.track_count, totals.merged_tracks
            );
            println!(
                "Contaminated segments: {} ({} hits unresolved)",
                totals.contaminated_segments, totals.unresolved_hits
            );
            println!(
                "Leftover hits assigned: {}, reconciliation merges: {}",
                totals.assigned_hits, totals.reconciliation_merges
            );
            println!("Failed fits: {}", totals.failed_fits);
            println!("Failed events: {}", failed);
            println!("Hits used: {:.1}%", 100.0 * totals.used_fraction());
            println!("Hit rate: {:.0} hits/s", run.hit_rate());
            if truth {
                println!("Impure tracks: {}, split particles: {}", impure, split);
            }
        }

        Commands::Info { input, geometry } => {
            let events = read_events(&input)?;
            let geometry = geometry.geometry()?;

            println!("File: {}", input.display());
            println!("Events: {}", events.len());
            let hits: usize = events.iter().map(Event::hit_count).sum();
            println!("Hits: {}", hits);

            let mut names: Vec<&str> = events
                .iter()
                .flat_map(|e| e.collections.iter().map(|c| c.name.as_str()))
                .collect();
            names.sort_unstable();
            names.dedup();
            println!("Collections: {}", names.join(", "));

            let positions: Vec<_> = events
                .iter()
                .flat_map(|e| e.collections.iter())
                .flat_map(|c| c.hits.iter().map(|h| h.position))
                .filter(|p| p.is_finite())
                .collect();
            if !positions.is_empty() {
                let range = |f: &dyn Fn(&clutrack_core::Position) -> f64| {
                    positions
                        .iter()
                        .map(f)
                        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                            (lo.min(v), hi.max(v))
                        })
                };
                let (x0, x1) = range(&|p| p.x);
                let (y0, y1) = range(&|p| p.y);
                let (z0, z1) = range(&|p| p.z);
                let (r0, r1) = range(&|p| p.rho());
                println!("X range: {:.1} - {:.1}", x0, x1);
                println!("Y range: {:.1} - {:.1}", y0, y1);
                println!("Z range: {:.1} - {:.1}", z0, z1);
                println!(
                    "Rho range: {:.1} - {:.1} (detector {:.1} - {:.1})",
                    r0,
                    r1,
                    geometry.r_min(),
                    geometry.r_max()
                );
            }
        }

        Commands::Benchmark {
            input,
            iterations,
            config,
            geometry,
        } => {
            let events = read_events(&input)?;
            let config = config.load()?;
            let geometry = geometry.geometry()?;
            let fitter = CircleHelixFitter::new(geometry.clone());
            let iterations = iterations.max(1);

            println!(
                "Benchmarking {} events, {} iterations",
                events.len(),
                iterations
            );
            println!(
                "{:<8} | {:<8} | {:<15} | {:<15} | {:<15}",
                "Event", "Hits", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<72}", "");

            for event in &events {
                // Warmup
                if let Err(e) =
                    reconstruct_event(event, &config, &geometry, &fitter, &mut NoopObserver)
                {
                    log::error!("event {}: {}", event.number, e);
                    continue;
                }

                let mut times = Vec::with_capacity(iterations);
                for _ in 0..iterations {
                    let start = Instant::now();
                    let _ =
                        reconstruct_event(event, &config, &geometry, &fitter, &mut NoopObserver);
                    times.push(start.elapsed().as_secs_f64() * 1000.0);
                }

                let min_time = times.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                let max_time = times.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
                let mean_time = times.iter().sum::<f64>() / times.len() as f64;

                println!(
                    "{:<8} | {:<8} | {:<15.2} | {:<15.2} | {:<15.2}",
                    event.number,
                    event.hit_count(),
                    mean_time,
                    min_time,
                    max_time
                );
            }
        }

        Commands::Generate {
            events,
            tracks,
            noise,
            seed,
            geometry,
        } => {
            let geometry = geometry.geometry()?;
            let mut rng = synthetic::Lcg::new(seed);
            let generated: Vec<Event> = (0..events)
                .map(|n| synthetic::generate_event(&geometry, &mut rng, n as u64, tracks, noise))
                .collect();

            let stdout = std::io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            serde_json::to_writer(&mut out, &generated)?;
            writeln!(out)?;
            out.flush()?;
            log::info!(
                "generated {} events with {} tracks and {} noise hits each",
                events,
                tracks,
                noise
            );
        }
    }

    Ok(())
}
