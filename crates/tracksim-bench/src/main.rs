//! tracksim-bench: CLI tool for layout experimentation and diagnostics.
//!
//! Builds a track layout with configurable parameters, printing detailed
//! per-stage diagnostics, then drives a train across it for a number of
//! frames. Useful for:
//!
//! - Tuning the endpoint match threshold and resolver sample step
//! - Measuring per-stage durations on large layouts
//! - Checking where a train ends up for a given turnout setting
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin tracksim-bench -- [OPTIONS] [LAYOUT_PATH]
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracksim_core::diagnostics::BuildDiagnostics;
use tracksim_core::{
    Catalog, Frame, Layout, LayoutConfig, PieceId, Point, PreparedLayout, Simulation, Status,
    SystemClock,
};

/// Layout experimentation and diagnostics for tracksim.
///
/// Builds a saved layout (or a built-in demo) with configurable
/// parameters, prints per-stage timing and count diagnostics, and runs a
/// train across the result.
#[derive(Parser)]
#[command(name = "tracksim-bench", version)]
struct Cli {
    /// Saved layout JSON. When omitted, `--demo` picks a built-in layout.
    layout_path: Option<PathBuf>,

    /// Built-in layout used when no layout file is given.
    #[arg(long, value_enum, default_value_t = Demo::Siding)]
    demo: Demo,

    /// Piece catalog JSON replacing the built-in catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Endpoint match distance.
    #[arg(long, default_value_t = LayoutConfig::DEFAULT_MATCH_THRESHOLD)]
    match_threshold: f64,

    /// Arc-length step between resolved world points.
    #[arg(long, default_value_t = LayoutConfig::DEFAULT_SAMPLE_STEP)]
    sample_step: f64,

    /// Train speed in units per frame (negative reverses).
    #[arg(long, default_value_t = LayoutConfig::DEFAULT_MAX_SPEED, allow_negative_numbers = true)]
    speed: f64,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 200)]
    frames: usize,

    /// Flip a turnout before running (`piece-N`, repeatable).
    #[arg(long, value_parser = parse_piece_id)]
    toggle: Vec<PieceId>,

    /// Write SVG output to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of builds for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full layout config as a JSON string.
    ///
    /// When provided, `--match-threshold` and `--sample-step` are
    /// ignored. Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Increase log verbosity (`-v` debug, `-vv` trace). `RUST_LOG`
    /// overrides it.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Built-in demo layouts.
#[derive(Clone, Copy, ValueEnum)]
enum Demo {
    /// Two straights end to end.
    Line,
    /// A feeder, a left-hand turnout, and a straight on the main route.
    Siding,
    /// Four quarter curves closing a loop.
    Oval,
}

impl Demo {
    /// Piece type, position, and rotation of every piece.
    const fn pieces(self) -> &'static [(&'static str, f64, f64, f64)] {
        match self {
            Self::Line => &[
                ("straight20", 0.0, 0.0, 0.0),
                ("straight40", 20.0, 0.0, 0.0),
            ],
            Self::Siding => &[
                ("straight20", -20.0, 0.0, 0.0),
                ("lhPoints", 0.0, 0.0, 0.0),
                ("straight20", 20.0, 0.0, 0.0),
            ],
            Self::Oval => &[
                ("rad40curve90", 0.0, 0.0, 0.0),
                ("rad40curve90", 40.0, 40.0, 90.0),
                ("rad40curve90", 0.0, 80.0, 180.0),
                ("rad40curve90", -40.0, 40.0, 270.0),
            ],
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Siding => "siding",
            Self::Oval => "oval",
        }
    }
}

fn parse_piece_id(s: &str) -> Result<PieceId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

/// Build the layout config from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<LayoutConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(LayoutConfig {
        match_threshold: cli.match_threshold,
        sample_step: cli.sample_step,
        ..LayoutConfig::default()
    })
}

/// Load the catalog and layout named on the command line.
fn load_layout(cli: &Cli) -> Result<(String, Layout), String> {
    let catalog = match cli.catalog {
        Some(ref path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
            Catalog::from_json(&json).map_err(|e| format!("Error loading catalog: {e}"))?
        }
        None => Catalog::builtin(),
    };

    if let Some(ref path) = cli.layout_path {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        let layout =
            Layout::from_json(catalog, &json).map_err(|e| format!("Error loading layout: {e}"))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("layout")
            .to_owned();
        return Ok((name, layout));
    }

    let mut layout = Layout::new(catalog);
    for &(type_name, x, y, rotation) in cli.demo.pieces() {
        let id = layout
            .add_piece(type_name, x, y)
            .map_err(|e| format!("Error placing demo piece: {e}"))?;
        layout
            .rotate_piece(id, rotation)
            .map_err(|e| format!("Error placing demo piece: {e}"))?;
    }
    Ok((cli.demo.name().to_owned(), layout))
}

/// Outcome of driving the train for the requested frames.
#[derive(Debug, Serialize)]
struct TraversalSummary {
    frames: usize,
    moved: usize,
    crossings: usize,
    odometer: f64,
    final_position: Point,
    final_heading: f64,
    status: Status,
    /// Why the train stopped early, if it did.
    halted: Option<String>,
}

/// Drive the train at `speed` for `frames` ticks or until it halts.
fn run_traversal(
    prepared: PreparedLayout,
    config: LayoutConfig,
    toggles: &[PieceId],
    speed: f64,
    frames: usize,
) -> Result<(Simulation, TraversalSummary), String> {
    let mut sim = Simulation::start(prepared, config).map_err(|e| format!("Spawn error: {e}"))?;
    for &id in toggles {
        let branch = sim
            .toggle_turnout(id)
            .map_err(|e| format!("Error toggling {id}: {e}"))?;
        log::info!("{id} set to {branch:?}");
    }
    sim.context_mut().set_speed(speed);

    let mut moved = 0;
    let mut crossings = 0;
    let mut halted = None;
    let mut ticks = 0;
    while ticks < frames {
        ticks += 1;
        match sim.tick() {
            Frame::Moved(_) => moved += 1,
            Frame::Crossed { .. } => crossings += 1,
            Frame::DeadEnd(dead_end) => {
                halted = Some(dead_end.to_string());
                break;
            }
            Frame::Held => {
                if sim.context().status() == &Status::Stopped {
                    break;
                }
            }
        }
    }

    let pose = sim.pose();
    let summary = TraversalSummary {
        frames: ticks,
        moved,
        crossings,
        odometer: sim.odometer(),
        final_position: pose.position,
        final_heading: pose.heading,
        status: sim.context().status().clone(),
        halted,
    };
    Ok((sim, summary))
}

fn print_traversal(summary: &TraversalSummary) {
    println!();
    println!("Traversal\n{}", "=".repeat(60));
    println!(
        "Frames: {}  |  Moved: {}  |  Crossings: {}",
        summary.frames, summary.moved, summary.crossings
    );
    println!("Distance: {:.3}", summary.odometer);
    println!(
        "Final pose: ({:.3}, {:.3}) heading {:.1} deg",
        summary.final_position.x,
        summary.final_position.y,
        summary.final_heading.to_degrees(),
    );
    println!("Status: {:?}", summary.status);
    if let Some(ref reason) = summary.halted {
        println!("Halted: {reason}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let (name, layout) = match load_layout(&cli) {
        Ok(loaded) => loaded,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!("Layout: {name} ({} pieces)", layout.len());
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut prepared = None;

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match tracksim_core::prepare_with_diagnostics(layout.clone(), &config, &SystemClock) {
            Ok((built, diagnostics)) => {
                if !cli.json {
                    println!("{}", diagnostics.report());
                }
                prepared.get_or_insert(built);
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Build error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    let Some(prepared) = prepared else {
        return ExitCode::FAILURE;
    };

    let (sim, summary) = match run_traversal(
        prepared,
        config.clone(),
        &cli.toggle,
        cli.speed,
        cli.frames,
    ) {
        Ok(result) => result,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        let output = serde_json::json!({
            "diagnostics": all_diagnostics,
            "traversal": summary,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing diagnostics: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_traversal(&summary);
    }

    if let Some(ref svg_path) = cli.svg {
        let desc = format!("{config:#?}");
        let layout_json = match sim.prepared().layout().to_json() {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Error serializing layout: {e}");
                return ExitCode::FAILURE;
            }
        };
        let metadata = tracksim_export::SvgMetadata {
            title: Some(&name),
            description: Some(&desc),
            layout_json: Some(&layout_json),
        };
        let svg = tracksim_export::to_svg(sim.prepared(), &metadata, Some(sim.pose()));
        match std::fs::write(svg_path, &svg) {
            Ok(()) => {
                eprintln!(
                    "SVG written to {} ({} bytes)",
                    svg_path.display(),
                    svg.len(),
                );
            }
            Err(e) => {
                eprintln!("Error writing SVG to {}: {e}", svg_path.display());
            }
        }
    }

    ExitCode::SUCCESS
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&BuildDiagnostics) -> Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[BuildDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Match", |d| d.matching.duration),
        ("Connect", |d| d.connect.duration),
        ("Validate", |d| d.validate.duration),
        ("Annotate", |d| d.annotate.duration),
    ];

    for (name, extractor) in stage_extractors {
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
