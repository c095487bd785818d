//! Resampling a raster onto another raster's grid.
//!
//! Pure functions, no I/O. Both grids are assumed to be in the same
//! coordinate reference system; only their affine transforms differ. Each
//! destination pixel centre is mapped to world coordinates, shifted back by the
//! requested horizontal offset, and sampled from the source.

use super::backend::Raster;
use super::transform::GeoTransform;
use crate::types::{Grid, is_no_data};
use serde::{Deserialize, Serialize};

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    /// Value of the source pixel containing the sample point. Required for labels.
    Nearest,
    /// Distance-weighted mean of the four surrounding pixel centres.
    #[default]
    Bilinear,
}

/// Target grid geometry for a warp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
}

/// Resample `source` onto `target`.
///
/// `xy_offset` moves the source by `(dx, dy)` world units before sampling.
/// Pixels outside the source, or whose contributing source pixels are all
/// no-data, receive `fill`. Bilinear sampling drops no-data neighbours and
/// renormalizes the remaining weights.
///
/// Returns `None` if the source transform cannot be inverted.
pub fn resample(
    source: &Raster,
    target: &TargetGrid,
    xy_offset: (f64, f64),
    method: Resampling,
    fill: f64,
) -> Option<Grid> {
    let inverse = source.transform.inverse()?;
    let sampler = Sampler { source };

    let grid = Grid::from_shape_fn((target.rows, target.cols), |(row, col)| {
        let (x, y) = target
            .transform
            .pixel_to_world(col as f64 + 0.5, row as f64 + 0.5);
        let (u, v) = inverse.world_to_pixel(x - xy_offset.0, y - xy_offset.1);
        let sample = match method {
            Resampling::Nearest => sampler.nearest(u, v),
            Resampling::Bilinear => sampler.bilinear(u, v),
        };
        sample.unwrap_or(fill)
    });
    Some(grid)
}

/// Fill value used when the caller does not request one: the source's own
/// sentinel, else zero.
pub fn default_fill(source: &Raster, requested: Option<f64>) -> f64 {
    requested.or(source.no_data).unwrap_or(0.0)
}

struct Sampler<'a> {
    source: &'a Raster,
}

impl Sampler<'_> {
    fn value(&self, row: isize, col: isize) -> Option<f64> {
        let (rows, cols) = self.source.data.dim();
        if row < 0 || col < 0 || row as usize >= rows || col as usize >= cols {
            return None;
        }
        let value = self.source.data[[row as usize, col as usize]];
        match self.source.no_data {
            Some(sentinel) if is_no_data(value, sentinel) => None,
            _ => Some(value),
        }
    }

    fn nearest(&self, u: f64, v: f64) -> Option<f64> {
        if !u.is_finite() || !v.is_finite() {
            return None;
        }
        self.value(v.floor() as isize, u.floor() as isize)
    }

    fn bilinear(&self, u: f64, v: f64) -> Option<f64> {
        if !u.is_finite() || !v.is_finite() {
            return None;
        }
        let (rows, cols) = self.source.data.dim();
        if u < 0.0 || v < 0.0 || u >= cols as f64 || v >= rows as f64 {
            return None;
        }

        // Offsets relative to pixel centres.
        let fu = u - 0.5;
        let fv = v - 0.5;
        let c0 = fu.floor();
        let r0 = fv.floor();
        let wu = fu - c0;
        let wv = fv - r0;

        let mut sum = 0.0;
        let mut weight = 0.0;
        for (dr, wr) in [(0, 1.0 - wv), (1, wv)] {
            for (dc, wc) in [(0, 1.0 - wu), (1, wu)] {
                let w = wr * wc;
                if w <= 0.0 {
                    continue;
                }
                if let Some(value) = self.value(r0 as isize + dr, c0 as isize + dc) {
                    sum += w * value;
                    weight += w;
                }
            }
        }

        (weight > 0.0).then(|| sum / weight)
    }
}
