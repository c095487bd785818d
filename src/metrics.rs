//! Metric engine interface and the metrics orchestrator.
//!
//! No statistic is computed here. The four engines (threshold geometry,
//! terrain accuracy, relative accuracy, material) sit behind the
//! [`MetricEngines`] trait; [`run_metrics`] feeds them the prepared grids in a
//! fixed order and assembles the [`MetricsReport`].
//!
//! ## Engine requests
//!
//! Each engine receives one borrowed request struct. Requests are
//! `Serialize` so process-backed engines can ship them as JSON; grids use
//! `ndarray`'s serde layout (`{"v": 1, "dim": [rows, cols], "data": [...]}`).
//!
//! | Engine | Request | Report key |
//! |---|---|---|
//! | threshold geometry | [`ThresholdGeometryInput`] | `threshold_geometry` |
//! | terrain accuracy | [`TerrainAccuracyInput`] | `terrain_accuracy` |
//! | relative accuracy | [`RelativeAccuracyInput`] | `relative_accuracy` |
//! | material | [`MaterialInput`] | not in the report |

use crate::elevation::ElevationSet;
use crate::plot::{PlotError, Plotter};
use crate::raster::GeoTransform;
use crate::types::{Grid, Mask, RegistrationOffset};
use ndarray::Array2;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{engine} engine failed: {message}")]
    Failed {
        engine: &'static str,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    ThresholdGeometry,
    TerrainAccuracy,
    RelativeAccuracy,
    Material,
}

impl EngineKind {
    /// Command-line name of the engine.
    pub fn name(self) -> &'static str {
        match self {
            Self::ThresholdGeometry => "threshold-geometry",
            Self::TerrainAccuracy => "terrain-accuracy",
            Self::RelativeAccuracy => "relative-accuracy",
            Self::Material => "material",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ThresholdGeometryInput<'a> {
    pub ref_dsm: &'a Grid,
    pub ref_dtm: &'a Grid,
    pub ref_mask: &'a Mask,
    pub test_dsm: &'a Grid,
    pub test_dtm: &'a Grid,
    pub test_mask: &'a Mask,
    pub transform: &'a GeoTransform,
    pub ignore_mask: &'a Mask,
}

#[derive(Debug, Serialize)]
pub struct TerrainAccuracyInput<'a> {
    pub ref_dsm: &'a Grid,
    pub ref_dtm: &'a Grid,
    pub ref_mask: &'a Mask,
    pub test_dsm: &'a Grid,
    pub test_dtm: &'a Grid,
    pub test_mask: &'a Mask,
    pub z_threshold: f64,
    pub unit_area: f64,
}

#[derive(Debug, Serialize)]
pub struct RelativeAccuracyInput<'a> {
    pub ref_dsm: &'a Grid,
    pub test_dsm: &'a Grid,
    pub ref_mask: &'a Mask,
    pub test_mask: &'a Mask,
    pub unit_width: f64,
}

#[derive(Debug, Serialize)]
pub struct MaterialInput<'a> {
    pub ref_ndx: &'a Array2<u16>,
    pub ref_mtl: &'a Array2<u8>,
    pub test_mtl: &'a Array2<u8>,
    pub material_names: &'a [String],
    pub indices_to_ignore: &'a [u8],
}

/// The four metric engines.
pub trait MetricEngines {
    fn threshold_geometry(&self, input: &ThresholdGeometryInput<'_>) -> Result<Value, EngineError>;
    fn terrain_accuracy(&self, input: &TerrainAccuracyInput<'_>) -> Result<Value, EngineError>;
    fn relative_accuracy(&self, input: &RelativeAccuracyInput<'_>) -> Result<Value, EngineError>;
    fn material(&self, input: &MaterialInput<'_>) -> Result<Value, EngineError>;
}

/// Aggregated report. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub threshold_geometry: Value,
    pub registration_offset: RegistrationOffset,
    pub terrain_accuracy: Value,
    pub relative_accuracy: Value,
    pub offset: RegistrationOffset,
}

/// Co-registered, masked grids ready for the engines.
///
/// Every grid has the reference classification grid's shape.
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    pub elevations: ElevationSet,
    pub ref_cls: Grid,
    pub test_cls: Grid,
    pub ref_mask: Mask,
    pub test_mask: Mask,
    pub ignore_mask: Mask,
    pub transform: GeoTransform,
    pub ref_ndx: Array2<u16>,
    pub ref_mtl: Array2<u8>,
    pub test_mtl: Option<Array2<u8>>,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSettings<'a> {
    pub terrain_z_threshold: f64,
    pub material_names: &'a [String],
    pub material_indices_to_ignore: &'a [u8],
}

/// Result of [`run_metrics`]: the report plus the material engine's output,
/// `None` when material metrics were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRun {
    pub report: MetricsReport,
    pub material: Option<Value>,
}

/// Plot the inputs (when a plotter is given), then run the engines in order.
pub fn run_metrics(
    engines: &dyn MetricEngines,
    inputs: &PreparedInputs,
    settings: &MetricsSettings<'_>,
    offset: RegistrationOffset,
    plotter: Option<&dyn Plotter>,
) -> Result<MetricsRun, MetricsError> {
    let report = run_report(engines, inputs, settings, offset, plotter)?;
    let material = run_material(engines, inputs, settings)?;
    Ok(MetricsRun { report, material })
}

/// Plots plus the three engines behind the five-key report.
pub fn run_report(
    engines: &dyn MetricEngines,
    inputs: &PreparedInputs,
    settings: &MetricsSettings<'_>,
    offset: RegistrationOffset,
    plotter: Option<&dyn Plotter>,
) -> Result<MetricsReport, MetricsError> {
    if let Some(plotter) = plotter {
        plot_inputs(plotter, inputs)?;
    }

    let elev = &inputs.elevations;

    tracing::debug!(engine = EngineKind::ThresholdGeometry.name(), "running metric engine");
    let threshold_geometry = engines.threshold_geometry(&ThresholdGeometryInput {
        ref_dsm: &elev.ref_dsm,
        ref_dtm: &elev.ref_dtm,
        ref_mask: &inputs.ref_mask,
        test_dsm: &elev.test_dsm,
        test_dtm: &elev.test_dtm,
        test_mask: &inputs.test_mask,
        transform: &inputs.transform,
        ignore_mask: &inputs.ignore_mask,
    })?;

    tracing::debug!(engine = EngineKind::TerrainAccuracy.name(), "running metric engine");
    let terrain_accuracy = engines.terrain_accuracy(&TerrainAccuracyInput {
        ref_dsm: &elev.ref_dsm,
        ref_dtm: &elev.ref_dtm,
        ref_mask: &inputs.ref_mask,
        test_dsm: &elev.test_dsm,
        test_dtm: &elev.test_dtm,
        test_mask: &inputs.test_mask,
        z_threshold: settings.terrain_z_threshold,
        unit_area: inputs.transform.unit_area(),
    })?;

    tracing::debug!(engine = EngineKind::RelativeAccuracy.name(), "running metric engine");
    let relative_accuracy = engines.relative_accuracy(&RelativeAccuracyInput {
        ref_dsm: &elev.ref_dsm,
        test_dsm: &elev.test_dsm,
        ref_mask: &inputs.ref_mask,
        test_mask: &inputs.test_mask,
        unit_width: inputs.transform.unit_width(),
    })?;

    Ok(MetricsReport {
        threshold_geometry,
        registration_offset: offset,
        terrain_accuracy,
        relative_accuracy,
        offset,
    })
}

/// Material engine, or `None` without a test material raster.
pub fn run_material(
    engines: &dyn MetricEngines,
    inputs: &PreparedInputs,
    settings: &MetricsSettings<'_>,
) -> Result<Option<Value>, MetricsError> {
    let Some(test_mtl) = &inputs.test_mtl else {
        return Ok(None);
    };
    tracing::debug!(engine = EngineKind::Material.name(), "running metric engine");
    let material = engines.material(&MaterialInput {
        ref_ndx: &inputs.ref_ndx,
        ref_mtl: &inputs.ref_mtl,
        test_mtl,
        material_names: settings.material_names,
        indices_to_ignore: settings.material_indices_to_ignore,
    })?;
    Ok(Some(material))
}

fn plot_inputs(plotter: &dyn Plotter, inputs: &PreparedInputs) -> Result<(), PlotError> {
    let elev = &inputs.elevations;
    let sentinel = Some(elev.no_data);
    let as_grid = |mask: &Mask| mask.mapv(|m| if m { 1.0 } else { 0.0 });

    plotter.make(elev.ref_dsm.view(), "Reference DSM", "input_refDSM", sentinel)?;
    plotter.make(elev.ref_dtm.view(), "Reference DTM", "input_refDTM", sentinel)?;
    plotter.make(inputs.ref_cls.view(), "Reference Class", "input_refClass", None)?;
    plotter.make(as_grid(&inputs.ref_mask).view(), "Reference Mask", "input_refMask", None)?;
    plotter.make(elev.test_dsm.view(), "Test DSM", "input_testDSM", sentinel)?;
    plotter.make(elev.test_dtm.view(), "Test DTM", "input_testDTM", sentinel)?;
    plotter.make(inputs.test_cls.view(), "Test Class", "input_testClass", None)?;
    plotter.make(as_grid(&inputs.test_mask).view(), "Test Mask", "input_testMask", None)?;
    plotter.make(as_grid(&inputs.ignore_mask).view(), "Ignore Mask", "input_ignoreMask", None)?;
    Ok(())
}
