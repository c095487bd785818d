//! Shared test doubles for the evaluation pipeline.
//!
//! | Double | Stands in for | Records |
//! |---|---|---|
//! | [`MemoryRasters`] | [`RasterBackend`] | loads, warps, no-data lookups |
//! | [`RecordingEngines`] | [`MetricEngines`] | each engine request as JSON |
//! | [`RecordingPlotter`] | [`Plotter`] | each plotted grid |
//!
//! All three use `Mutex` so they can be shared by reference like the
//! production collaborators.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let rasters = MemoryRasters::new()
//!     .with("ref_cls.tif", array![[6.0, 0.0]], GeoTransform::north_up(0.0, 1.0, 1.0), None)
//!     .with("ref_dsm.tif", array![[10.0, 11.0]], GeoTransform::north_up(0.0, 1.0, 1.0), Some(-9999.0));
//!
//! let engines = RecordingEngines::new();
//! // ... run the pipeline ...
//! let request = engines.request(EngineKind::TerrainAccuracy);
//! assert_eq!(request["z_threshold"], 1.0);
//! ```

use crate::metrics::{
    EngineError, EngineKind, MaterialInput, MetricEngines, RelativeAccuracyInput,
    TerrainAccuracyInput, ThresholdGeometryInput,
};
use crate::plot::{PlotError, Plotter};
use crate::raster::backend::warp_loaded;
use crate::raster::{GeoTransform, Raster, RasterBackend, RasterError, WarpParams};
use crate::types::{Grid, Mask};
use ndarray::{ArrayView2, Zip};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// =========================================================================
// Raster backend
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRasterOp {
    Load(PathBuf),
    Warp(WarpParams),
    NoData(PathBuf),
}

/// In-memory rasters keyed by path. Missing paths fail like missing files.
#[derive(Default)]
pub struct MemoryRasters {
    rasters: HashMap<PathBuf, Raster>,
    operations: Mutex<Vec<RecordedRasterOp>>,
}

impl MemoryRasters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        path: impl AsRef<Path>,
        data: Grid,
        transform: GeoTransform,
        no_data: Option<f64>,
    ) -> Self {
        self.rasters.insert(
            path.as_ref().to_path_buf(),
            Raster {
                data,
                transform,
                no_data,
            },
        );
        self
    }

    pub fn get_operations(&self) -> Vec<RecordedRasterOp> {
        self.operations.lock().unwrap().clone()
    }

    /// Every recorded warp, in call order.
    pub fn warps(&self) -> Vec<WarpParams> {
        self.get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedRasterOp::Warp(params) => Some(params),
                _ => None,
            })
            .collect()
    }

    /// The recorded warp whose source is `path`. Panics if there is none.
    pub fn warp_of(&self, path: impl AsRef<Path>) -> WarpParams {
        let path = path.as_ref();
        self.warps()
            .into_iter()
            .find(|w| w.source == path)
            .unwrap_or_else(|| panic!("no warp recorded for {}", path.display()))
    }

    fn lookup(&self, path: &Path) -> Result<Raster, RasterError> {
        self.rasters.get(path).cloned().ok_or_else(|| {
            RasterError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no in-memory raster at {}", path.display()),
            ))
        })
    }
}

impl RasterBackend for MemoryRasters {
    fn load(&self, path: &Path) -> Result<Raster, RasterError> {
        self.operations
            .lock()
            .unwrap()
            .push(RecordedRasterOp::Load(path.to_path_buf()));
        self.lookup(path)
    }

    fn no_data_value(&self, path: &Path) -> Result<Option<f64>, RasterError> {
        self.operations
            .lock()
            .unwrap()
            .push(RecordedRasterOp::NoData(path.to_path_buf()));
        Ok(self.lookup(path)?.no_data)
    }

    fn warp(&self, params: &WarpParams) -> Result<Grid, RasterError> {
        self.operations
            .lock()
            .unwrap()
            .push(RecordedRasterOp::Warp(params.clone()));
        let source = self.lookup(&params.source)?;
        let reference = self.lookup(&params.reference)?;
        warp_loaded(&source, &reference, params)
    }
}

// =========================================================================
// Metric engines
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub engine: EngineKind,
    pub request: Value,
}

/// Records every engine request and answers with canned results.
///
/// The threshold geometry answer carries the largest absolute DSM and DTM
/// differences over pixels in both masks and outside the ignore mask, so
/// tests can see what the engine was handed.
#[derive(Default)]
pub struct RecordingEngines {
    calls: Mutex<Vec<RecordedCall>>,
    fail_on: Option<EngineKind>,
}

impl RecordingEngines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines that fail when `kind` is invoked (after recording the call).
    pub fn failing(kind: EngineKind) -> Self {
        Self {
            fail_on: Some(kind),
            ..Self::default()
        }
    }

    pub fn get_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The request sent to `kind`. Panics if it was never invoked.
    pub fn request(&self, kind: EngineKind) -> Value {
        self.get_calls()
            .into_iter()
            .find(|c| c.engine == kind)
            .map(|c| c.request)
            .unwrap_or_else(|| panic!("{} engine was never invoked", kind.name()))
    }

    fn record<T: Serialize>(&self, kind: EngineKind, input: &T) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            engine: kind,
            request: serde_json::to_value(input)?,
        });
        match self.fail_on {
            Some(fail) if fail == kind => Err(EngineError::Failed {
                engine: kind.name(),
                message: "forced failure".into(),
            }),
            _ => Ok(()),
        }
    }
}

/// Largest `|a - b|` where both masks are set and `ignore` is not.
pub fn max_abs_error(a: &Grid, b: &Grid, ref_mask: &Mask, test_mask: &Mask, ignore: &Mask) -> f64 {
    let mut max: f64 = 0.0;
    Zip::from(a)
        .and(b)
        .and(ref_mask)
        .and(test_mask)
        .and(ignore)
        .for_each(|&a, &b, &r, &t, &i| {
            if r && t && !i {
                max = max.max((a - b).abs());
            }
        });
    max
}

impl MetricEngines for RecordingEngines {
    fn threshold_geometry(&self, input: &ThresholdGeometryInput<'_>) -> Result<Value, EngineError> {
        self.record(EngineKind::ThresholdGeometry, input)?;
        Ok(json!({
            "max_abs_dsm_error": max_abs_error(
                input.ref_dsm, input.test_dsm, input.ref_mask, input.test_mask, input.ignore_mask
            ),
            "max_abs_dtm_error": max_abs_error(
                input.ref_dtm, input.test_dtm, input.ref_mask, input.test_mask, input.ignore_mask
            ),
        }))
    }

    fn terrain_accuracy(&self, input: &TerrainAccuracyInput<'_>) -> Result<Value, EngineError> {
        self.record(EngineKind::TerrainAccuracy, input)?;
        Ok(json!({"engine": EngineKind::TerrainAccuracy.name()}))
    }

    fn relative_accuracy(&self, input: &RelativeAccuracyInput<'_>) -> Result<Value, EngineError> {
        self.record(EngineKind::RelativeAccuracy, input)?;
        Ok(json!({"engine": EngineKind::RelativeAccuracy.name()}))
    }

    fn material(&self, input: &MaterialInput<'_>) -> Result<Value, EngineError> {
        self.record(EngineKind::Material, input)?;
        Ok(json!({"engine": EngineKind::Material.name()}))
    }
}

// =========================================================================
// Plotter
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPlot {
    pub grid: Grid,
    pub title: String,
    pub save_name: String,
    pub bad_value: Option<f64>,
}

#[derive(Default)]
pub struct RecordingPlotter {
    plots: Mutex<Vec<RecordedPlot>>,
}

impl RecordingPlotter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_plots(&self) -> Vec<RecordedPlot> {
        self.plots.lock().unwrap().clone()
    }
}

impl Plotter for RecordingPlotter {
    fn make(
        &self,
        grid: ArrayView2<'_, f64>,
        title: &str,
        save_name: &str,
        bad_value: Option<f64>,
    ) -> Result<(), PlotError> {
        self.plots.lock().unwrap().push(RecordedPlot {
            grid: grid.to_owned(),
            title: title.to_string(),
            save_name: save_name.to_string(),
            bad_value,
        });
        Ok(())
    }
}
