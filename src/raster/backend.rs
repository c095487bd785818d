//! Raster access trait and shared types.
//!
//! The [`RasterBackend`] trait covers the three operations the evaluation
//! pipeline needs from raster storage: load a grid with its transform, warp a
//! grid onto a reference grid, and report a file's declared no-data sentinel.
//!
//! The production implementation is
//! [`TiffBackend`](super::tiff_backend::TiffBackend). Tests substitute an
//! in-memory backend; warping is shared through the trait's provided method so
//! every backend resamples the same way.

use super::transform::GeoTransform;
use super::warp::{Resampling, TargetGrid, default_fill, resample};
use crate::types::Grid;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("Unsupported raster {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
    #[error("Raster {0} has a non-invertible geotransform")]
    SingularTransform(PathBuf),
    #[error("Grid shape mismatch: {name} is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        actual: (usize, usize),
        expected: (usize, usize),
    },
}

/// A single-band raster: values, pixel → world transform, declared sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub data: Grid,
    pub transform: GeoTransform,
    pub no_data: Option<f64>,
}

impl Raster {
    pub fn target(&self) -> TargetGrid {
        let (rows, cols) = self.data.dim();
        TargetGrid {
            rows,
            cols,
            transform: self.transform,
        }
    }
}

/// Everything needed to warp one raster onto another's grid.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpParams {
    pub source: PathBuf,
    /// Raster whose grid (shape + transform) the output adopts.
    pub reference: PathBuf,
    pub xy_offset: (f64, f64),
    pub method: Resampling,
    /// Sentinel written into filled pixels. `None` keeps the source sentinel.
    pub no_data: Option<f64>,
}

impl WarpParams {
    pub fn onto(source: &Path, reference: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            reference: reference.to_path_buf(),
            xy_offset: (0.0, 0.0),
            method: Resampling::default(),
            no_data: None,
        }
    }

    pub fn offset(mut self, xy: (f64, f64)) -> Self {
        self.xy_offset = xy;
        self
    }

    pub fn nearest(mut self) -> Self {
        self.method = Resampling::Nearest;
        self
    }

    pub fn no_data(mut self, sentinel: f64) -> Self {
        self.no_data = Some(sentinel);
        self
    }
}

/// Trait for raster storage backends.
pub trait RasterBackend {
    /// Read the first band of a raster with its transform and sentinel.
    fn load(&self, path: &Path) -> Result<Raster, RasterError>;

    /// The raster's declared no-data sentinel, if any.
    fn no_data_value(&self, path: &Path) -> Result<Option<f64>, RasterError> {
        Ok(self.load(path)?.no_data)
    }

    /// Resample `params.source` onto the grid of `params.reference`.
    fn warp(&self, params: &WarpParams) -> Result<Grid, RasterError> {
        let source = self.load(&params.source)?;
        let reference = self.load(&params.reference)?;
        warp_loaded(&source, &reference, params)
    }
}

/// Warp already-loaded rasters. Shared by every backend's `warp`.
pub fn warp_loaded(
    source: &Raster,
    reference: &Raster,
    params: &WarpParams,
) -> Result<Grid, RasterError> {
    let fill = default_fill(source, params.no_data);
    tracing::debug!(
        source = %params.source.display(),
        reference = %params.reference.display(),
        method = ?params.method,
        dx = params.xy_offset.0,
        dy = params.xy_offset.1,
        fill,
        "warping raster"
    );
    resample(source, &reference.target(), params.xy_offset, params.method, fill)
        .ok_or_else(|| RasterError::SingularTransform(params.source.clone()))
}

/// Fail unless `grid` has the `expected` shape.
pub fn ensure_shape(name: &str, grid: &Grid, expected: (usize, usize)) -> Result<(), RasterError> {
    let actual = grid.dim();
    if actual == expected {
        Ok(())
    } else {
        Err(RasterError::ShapeMismatch {
            name: name.to_string(),
            actual,
            expected,
        })
    }
}
