//! bmptrace CLI - un-mitigated runoff along D8 flow paths

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use bmptrace_algorithms::hydrology::{bmp_trace, d8, load_grids, Placement, TraceOutcome};
use bmptrace_core::io::{read_geotiff, write_geotiff, GeoTiffOptions};
use bmptrace_core::Raster;

use crate::config::{RunArgs, RunConfig};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "bmptrace")]
#[command(author, version, about = "Trace runoff along D8 flow paths through BMP effectiveness grids", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trace every interior cell and write the accumulated grid
    Run(RunArgs),
    /// Load the inputs and check that they are co-registered, without tracing
    Check(RunArgs),
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("Invalid spinner template")?,
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn load_inputs(config: &RunConfig) -> Result<(Raster<i32>, Raster<f64>, Placement)> {
    let pb = spinner("Reading inputs...")?;
    let loaded = load_grids(&config.flow_direction_source, &config.effectiveness_source)
        .with_context(|| {
            format!(
                "Failed to load {} and {}",
                config.flow_direction_source, config.effectiveness_source
            )
        })?;
    pb.finish_and_clear();

    let placement = loaded.2;
    info!(
        "Input: {} x {}, cell size {}, lower-left ({}, {})",
        placement.cols,
        placement.rows,
        placement.cell_size,
        placement.lower_left.0,
        placement.lower_left.1
    );
    Ok(loaded)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
        .context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// Interior cells that hold none of the eight D8 codes
fn unrecognized_codes(flow_dir: &Raster<i32>) -> usize {
    let (rows, cols) = flow_dir.shape();
    (1..rows.saturating_sub(1))
        .flat_map(|row| (1..cols.saturating_sub(1)).map(move |col| (row, col)))
        .filter(|&(row, col)| {
            flow_dir
                .get(row, col)
                .is_ok_and(|code| !d8::is_valid(code))
        })
        .count()
}

/// Load, trace and write one configured run
fn run(config: &RunConfig) -> Result<TraceOutcome> {
    let (flow_dir, bmp, _) = load_inputs(config)?;
    let params = config.to_params();
    info!(
        "Tracing with {:?}, step budget {:?}",
        params.mode, params.step_budget
    );

    let pb = spinner("Tracing flow paths...")?;
    let outcome = bmp_trace(&flow_dir, &bmp, params).context("Flow trace failed")?;
    pb.finish_and_clear();

    info!("{} traces, {} cells visited", outcome.traces, outcome.steps);
    if let Some(first) = outcome.diverged.first() {
        warn!(
            "{} trace(s) never left the grid and were discarded, first from {:?}",
            outcome.diverged.len(),
            first
        );
    }

    write_result(&outcome.output, &config.output_destination)?;
    Ok(outcome)
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run(args) => {
            let config = args.resolve()?;
            let start = Instant::now();
            run(&config)?;
            done("Unmitigated runoff", &config.output_destination, start.elapsed());
        }

        Commands::Check(args) => {
            let config = args.resolve()?;
            let (flow_dir, _, placement) = load_inputs(&config)?;

            println!("Inputs are co-registered");
            println!("  Dimensions: {} x {}", placement.cols, placement.rows);
            println!("  Cell size: {}", placement.cell_size);
            println!(
                "  Lower-left: ({:.6}, {:.6})",
                placement.lower_left.0, placement.lower_left.1
            );
            println!("  Step budget: {:?}", config.to_params().step_budget);
            println!("  Output: {}", config.output_destination.display());

            let invalid = unrecognized_codes(&flow_dir);
            if invalid > 0 {
                warn!(
                    "{} interior cell(s) hold no D8 code; tracing fails if a path reaches one",
                    invalid
                );
            }
        }

        Commands::Info { input } => {
            let pb = spinner("Reading raster...")?;
            let raster: Raster<f64> = read_geotiff(&input).context("Failed to read raster")?;
            pb.finish_and_clear();

            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }
    }

    Ok(())
}
