//! Evaluation orchestration.
//!
//! Turns the configured rasters into one co-registered, masked dataset and
//! runs the metric engines over it:
//!
//! ```text
//! plan_run   config file + CLI overrides → RunPlan (validated, no raster I/O)
//! evaluate   RunPlan + collaborators     → RunSummary
//!
//!   1. register   copy test DSM to output dir, align → (dx, dy, dz)
//!   2. reference  load CLS grid; warp DSM/DTM (fill -9999), NDX/MTL (nearest)
//!   3. test       warp CLS/MTL (nearest) and DSM/DTM (fill -9999), shifted by (dx, dy)
//!   4. offset     add dz to valid test DSM/DTM pixels
//!   5. masks      evaluation masks (ref, test) + reference ignore mask
//!   6. quantize   optional, every elevation grid and the sentinel
//!   7. metrics    plots, then threshold → terrain → relative → material
//!   8. report     <output>/<test DSM name>_metrics.json
//! ```
//!
//! Every external concern (rasters, alignment, engines, plots) comes in
//! through [`Collaborators`]. Progress is reported as [`RunEvent`]s; the
//! binary prints them, tests collect them.

use crate::align::{AlignError, Aligner, FixedAligner};
use crate::config::{self, ConfigError, EvalConfig};
use crate::elevation::{ElevationSet, apply_offset};
use crate::masks::{build_ignore_mask, build_mask};
use crate::metrics::{
    MetricEngines, MetricsError, MetricsReport, MetricsSettings, PreparedInputs, run_material,
    run_report,
};
use crate::plot::Plotter;
use crate::raster::{RasterBackend, RasterError, WarpParams, ensure_shape};
use crate::report::{self, ReportError};
use crate::types::{Grid, RegistrationOffset, WARP_NO_DATA};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Command-line level inputs to a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub config: PathBuf,
    pub reference_dir: Option<PathBuf>,
    pub test_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub align: bool,
}

/// A validated run, ready for [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub config: EvalConfig,
    pub output_dir: PathBuf,
    /// Test DSM file name; prefixes every output artifact.
    pub base_name: String,
    pub align: bool,
}

/// External collaborators for [`evaluate`].
///
/// `aligner: None` means no alignment executable is configured: the run
/// registers with the identity offset and says so.
pub struct Collaborators<'a> {
    pub rasters: &'a dyn RasterBackend,
    pub aligner: Option<&'a dyn Aligner>,
    pub engines: &'a dyn MetricEngines,
    pub plotter: Option<&'a dyn Plotter>,
}

/// Progress and warnings, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Registration,
    SkippingRegistration,
    /// Alignment requested but no executable configured.
    IdentityAlignment,
    ReadingReference,
    ReadingTest,
    NoTestDtm,
    /// `ShowPlots` without `SavePlots`: plots are saved as files regardless.
    PlotDisplayUnavailable,
    ReportWritten { path: PathBuf, json: String },
    MaterialMetrics(Value),
    NoTestMtl,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub offset: RegistrationOffset,
    pub report: MetricsReport,
    pub report_path: PathBuf,
    pub material: Option<Value>,
}

/// Load the configuration and settle the output directory.
///
/// Everything here happens before any raster is touched: a missing config
/// file or unusable output directory fails fast.
pub fn plan_run(options: &RunOptions) -> Result<RunPlan, PipelineError> {
    if !options.config.is_file() {
        return Err(ConfigError::NotFound(options.config.clone()).into());
    }
    if let Some(dir) = &options.output_dir {
        config::check_output_dir(dir)?;
    }

    let config = config::parse_config(
        &options.config,
        options.reference_dir.as_deref(),
        options.test_dir.as_deref(),
    )?;

    let output_dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => {
            let dir = default_output_dir(&config.test.dsm);
            config::check_output_dir(&dir)?;
            dir
        }
    };
    let base_name = config.test_dsm_base_name();

    tracing::debug!(
        config = %options.config.display(),
        output = %output_dir.display(),
        base_name,
        align = options.align,
        "planned run"
    );
    Ok(RunPlan {
        config,
        output_dir,
        base_name,
        align: options.align,
    })
}

fn default_output_dir(test_dsm: &Path) -> PathBuf {
    match test_dsm.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Run the evaluation described by `plan`.
pub fn evaluate(
    plan: &RunPlan,
    collab: &Collaborators<'_>,
    on_event: &mut dyn FnMut(&RunEvent),
) -> Result<RunSummary, PipelineError> {
    let cfg = &plan.config;
    let rasters = collab.rasters;

    let offset = register(plan, collab.aligner, on_event)?;
    let xy = offset.xy();

    // Reference rasters, all on the reference classification grid.
    on_event(&RunEvent::ReadingReference);
    let r = &cfg.reference;
    let ref_cls_raster = rasters.load(&r.cls)?;
    let transform = ref_cls_raster.transform;
    let ref_cls = ref_cls_raster.data;
    let shape = ref_cls.dim();

    let ref_dsm = rasters.warp(&WarpParams::onto(&r.dsm, &r.cls).no_data(WARP_NO_DATA))?;
    let ref_dtm = rasters.warp(&WarpParams::onto(&r.dtm, &r.cls).no_data(WARP_NO_DATA))?;
    let ref_ndx = rasters.warp(&WarpParams::onto(&r.ndx, &r.cls).nearest())?;
    let ref_mtl = rasters.warp(&WarpParams::onto(&r.mtl, &r.cls).nearest())?;

    // Test rasters, shifted horizontally by the registration offset.
    on_event(&RunEvent::ReadingTest);
    let t = &cfg.test;
    let test_cls = rasters.warp(&WarpParams::onto(&t.cls, &r.cls).offset(xy).nearest())?;
    let test_dsm =
        rasters.warp(&WarpParams::onto(&t.dsm, &r.cls).offset(xy).no_data(WARP_NO_DATA))?;
    let test_dtm = match &t.dtm {
        Some(path) => Some(
            rasters.warp(&WarpParams::onto(path, &r.cls).offset(xy).no_data(WARP_NO_DATA))?,
        ),
        None => {
            on_event(&RunEvent::NoTestDtm);
            None
        }
    };
    let test_mtl = t
        .mtl
        .as_ref()
        .map(|path| rasters.warp(&WarpParams::onto(path, &r.cls).offset(xy).nearest()))
        .transpose()?;

    let named: [(&str, Option<&Grid>); 8] = [
        ("refDSM", Some(&ref_dsm)),
        ("refDTM", Some(&ref_dtm)),
        ("refNDX", Some(&ref_ndx)),
        ("refMTL", Some(&ref_mtl)),
        ("testCLS", Some(&test_cls)),
        ("testDSM", Some(&test_dsm)),
        ("testDTM", test_dtm.as_ref()),
        ("testMTL", test_mtl.as_ref()),
    ];
    for (name, grid) in named {
        if let Some(grid) = grid {
            ensure_shape(name, grid, shape)?;
        }
    }

    // Vertical registration. A substituted reference DTM is never shifted.
    let test_dsm = apply_offset(test_dsm, &offset, WARP_NO_DATA);
    let test_dtm = match test_dtm {
        Some(grid) => apply_offset(grid, &offset, WARP_NO_DATA),
        None => ref_dtm.clone(),
    };

    let ref_mask = build_mask(&ref_cls, &r.cls_match);
    let test_mask = build_mask(&test_cls, &t.cls_match);
    // Warped elevations carry WARP_NO_DATA wherever the file declared no-data;
    // the classification grid is read as-is and keeps its own sentinel.
    let warped_sentinel = |path: &Path| -> Result<Option<f64>, RasterError> {
        Ok(rasters.no_data_value(path)?.map(|_| WARP_NO_DATA))
    };
    let ignore_mask = build_ignore_mask(
        &ref_dsm,
        warped_sentinel(&r.dsm)?,
        &ref_dtm,
        warped_sentinel(&r.dtm)?,
        &ref_cls,
        rasters.no_data_value(&r.cls)?,
    );

    let mut elevations = ElevationSet {
        ref_dsm,
        ref_dtm,
        test_dsm,
        test_dtm,
        no_data: WARP_NO_DATA,
    };
    if cfg.options.quantize_height {
        let unit_height = transform.unit_height();
        tracing::debug!(unit_height, "quantizing elevations");
        elevations = elevations.quantized(unit_height);
    }

    let inputs = PreparedInputs {
        elevations,
        ref_cls,
        test_cls,
        ref_mask,
        test_mask,
        ignore_mask,
        transform,
        ref_ndx: ref_ndx.mapv(|v| v as u16),
        ref_mtl: ref_mtl.mapv(|v| v as u8),
        test_mtl: test_mtl.map(|grid| grid.mapv(|v| v as u8)),
    };
    let settings = MetricsSettings {
        terrain_z_threshold: cfg.options.terrain_z_threshold,
        material_names: &cfg.materials.names,
        material_indices_to_ignore: &cfg.materials.indices_to_ignore,
    };
    if collab.plotter.is_some() && cfg.plots.show && !cfg.plots.save {
        on_event(&RunEvent::PlotDisplayUnavailable);
    }
    let report = run_report(collab.engines, &inputs, &settings, offset, collab.plotter)?;

    // Written before the material engine runs, so a material failure keeps it.
    let persisted = report::persist(&report, &plan.output_dir, &plan.base_name)?;
    on_event(&RunEvent::ReportWritten {
        path: persisted.path.clone(),
        json: persisted.json,
    });

    let material = run_material(collab.engines, &inputs, &settings)?;
    match &material {
        Some(material) => on_event(&RunEvent::MaterialMetrics(material.clone())),
        None => on_event(&RunEvent::NoTestMtl),
    }

    Ok(RunSummary {
        offset,
        report,
        report_path: persisted.path,
        material,
    })
}

/// Registration stage: zero offset when disabled, identity when no aligner.
fn register(
    plan: &RunPlan,
    aligner: Option<&dyn Aligner>,
    on_event: &mut dyn FnMut(&RunEvent),
) -> Result<RegistrationOffset, PipelineError> {
    if !plan.align {
        on_event(&RunEvent::SkippingRegistration);
        return Ok(RegistrationOffset::zero());
    }

    on_event(&RunEvent::Registration);
    // align3d writes its outputs next to the DSM it is given.
    let test_dsm = stage_test_dsm(&plan.config.test.dsm, &plan.output_dir, &plan.base_name)?;
    let identity = FixedAligner::identity();
    let aligner: &dyn Aligner = match aligner {
        Some(aligner) => aligner,
        None => {
            on_event(&RunEvent::IdentityAlignment);
            &identity
        }
    };
    let offset = aligner.align(&plan.config.reference.dsm, &test_dsm)?;
    tracing::info!(dx = offset.dx, dy = offset.dy, dz = offset.dz, "registration offset");
    Ok(offset)
}

/// Copy the test DSM into the output directory unless a file of that name is
/// already there. Returns the copy's path.
fn stage_test_dsm(
    test_dsm: &Path,
    output_dir: &Path,
    base_name: &str,
) -> Result<PathBuf, std::io::Error> {
    let staged = output_dir.join(base_name);
    if !staged.is_file() {
        fs::copy(test_dsm, &staged)?;
        tracing::debug!(from = %test_dsm.display(), to = %staged.display(), "copied test DSM");
    }
    Ok(staged)
}
