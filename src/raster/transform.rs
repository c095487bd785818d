//! Affine pixel ↔ world transforms in GDAL coefficient order.
//!
//! ```text
//! x = t[0] + col * t[1] + row * t[2]
//! y = t[3] + col * t[4] + row * t[5]
//! ```
//!
//! `col`/`row` are continuous pixel coordinates: pixel `(r, c)` covers
//! `[c, c + 1) × [r, r + 1)`, so its centre is `(c + 0.5, r + 0.5)`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl Default for GeoTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl GeoTransform {
    /// Pixel coordinates are world coordinates. Used for rasters without geo tags.
    pub fn identity() -> Self {
        Self([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// North-up transform from an upper-left corner and pixel size.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_size: f64) -> Self {
        Self([origin_x, pixel_size, 0.0, origin_y, 0.0, -pixel_size])
    }

    /// Build from GeoTIFF `ModelTiepoint` + `ModelPixelScale` tags.
    ///
    /// The tiepoint maps raster point `(i, j)` to model point `(x, y)`; the
    /// scale is `(sx, sy)` with `sy` positive for north-up images.
    pub fn from_tiepoint(tiepoint: &[f64], scale: &[f64]) -> Option<Self> {
        let [i, j, _k, x, y, ..] = *tiepoint else {
            return None;
        };
        let [sx, sy, ..] = *scale else {
            return None;
        };
        Some(Self([x - i * sx, sx, 0.0, y + j * sy, 0.0, -sy]))
    }

    /// Build from a GeoTIFF `ModelTransformation` tag (4×4, row-major).
    pub fn from_model_transformation(matrix: &[f64]) -> Option<Self> {
        if matrix.len() < 8 {
            return None;
        }
        Some(Self([
            matrix[3], matrix[0], matrix[1], matrix[7], matrix[4], matrix[5],
        ]))
    }

    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let t = &self.0;
        (
            t[0] + col * t[1] + row * t[2],
            t[3] + col * t[4] + row * t[5],
        )
    }

    /// The world → pixel mapping, or `None` when the transform is degenerate.
    pub fn inverse(&self) -> Option<InverseTransform> {
        let t = &self.0;
        let det = t[1] * t[5] - t[2] * t[4];
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(InverseTransform {
            origin: (t[0], t[3]),
            m: [t[5] / det, -t[2] / det, -t[4] / det, t[1] / det],
        })
    }

    /// Horizontal ground size of one pixel.
    pub fn unit_width(&self) -> f64 {
        self.0[1].abs()
    }

    /// Vertical voxel size matching the horizontal resolution.
    pub fn unit_height(&self) -> f64 {
        (self.0[1].abs() + self.0[5].abs()) / 2.0
    }

    /// Ground area covered by one pixel.
    pub fn unit_area(&self) -> f64 {
        (self.0[1] * self.0[5]).abs()
    }
}

/// Precomputed inverse of a [`GeoTransform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseTransform {
    origin: (f64, f64),
    m: [f64; 4],
}

impl InverseTransform {
    /// World point → continuous `(col, row)`.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.origin.0;
        let dy = y - self.origin.1;
        (
            self.m[0] * dx + self.m[1] * dy,
            self.m[2] * dx + self.m[3] * dy,
        )
    }
}
