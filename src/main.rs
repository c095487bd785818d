use clap::Parser;
use core3dmetrics::align::{self, Aligner};
use core3dmetrics::engines::ProcessEngines;
use core3dmetrics::output;
use core3dmetrics::pipeline::{self, Collaborators, RunOptions};
use core3dmetrics::plot::{PngPlotter, Plotter};
use core3dmetrics::raster::TiffBackend;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "core3dmetrics")]
#[command(about = "Evaluate a 3D model against a ground-truth reference")]
#[command(long_about = "\
Evaluate a 3D model against a ground-truth reference

Compares test model rasters (DSM, DTM, classification, materials) with
reference rasters and writes <test DSM name>_metrics.json to the output folder.

Configuration sections:

  [INPUT.REF]      DSMFilename, DTMFilename, CLSFilename, NDXFilename,
                   MTLFilename, CLSMatchValue
  [INPUT.TEST]     DSMFilename, CLSFilename, CLSMatchValue,
                   DTMFilename (optional), MTLFilename (optional)
  [MATERIALS.REF]  MaterialNames, MaterialIndicesToIgnore
  [PLOTS]          ShowPlots, SavePlots
  [OPTIONS]        QuantizeHeight, TerrainZErrorThreshold
  [REGEXEPATH]     Align3DPath, MetricsPath

CLSMatchValue = [256] evaluates every non-zero classification.

Set RUST_LOG=debug for diagnostics on stderr.")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Reference data folder
    #[arg(short = 'r', long = "reference")]
    reference: Option<PathBuf>,

    /// Test data folder
    #[arg(short = 't', long = "test")]
    test: Option<PathBuf>,

    /// Output folder [default: test DSM folder]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Register the test model to the reference (default)
    #[arg(long, conflicts_with = "no_align")]
    align: bool,

    /// Skip registration; use a zero offset
    #[arg(long)]
    no_align: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let plan = pipeline::plan_run(&RunOptions {
        config: cli.config,
        reference_dir: cli.reference,
        test_dir: cli.test,
        output_dir: cli.output,
        align: cli.align || !cli.no_align,
    })?;

    let rasters = TiffBackend::new();
    let align3d = align::from_config(&plan.config.executables);
    let engines = ProcessEngines::resolve(&plan.config.executables);
    let plotter = PngPlotter::from_config(&plan.config.plots, &plan.output_dir, &plan.base_name);

    let collab = Collaborators {
        rasters: &rasters,
        aligner: align3d.as_ref().map(|a| a as &dyn Aligner),
        engines: &engines,
        plotter: plotter.as_ref().map(|p| p as &dyn Plotter),
    };
    pipeline::evaluate(&plan, &collab, &mut output::print_event)?;

    Ok(())
}

/// Diagnostics go to stderr; stdout carries the banners and the report.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
