//! Shared types passed between pipeline stages.
//!
//! Grids are plain `ndarray` arrays. Everything that travels together through
//! the pipeline has already been warped onto the reference classification
//! grid, so shapes always agree by the time these aliases meet.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Elevation (DSM/DTM) or raw label values, one `f64` per pixel.
pub type Grid = Array2<f64>;

/// Boolean per-pixel mask (evaluation masks and the ignore mask).
pub type Mask = Array2<bool>;

/// Sentinel assigned to pixels filled during warping, so they can be told
/// apart from measured elevations afterwards.
pub const WARP_NO_DATA: f64 = -9999.0;

/// Translation registering the test model onto the reference model.
///
/// `dx`/`dy` are consumed while warping test rasters; `dz` is added to test
/// elevations. Serializes as `[dx, dy, dz]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct RegistrationOffset {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl RegistrationOffset {
    pub fn new(dx: f64, dy: f64, dz: f64) -> Self {
        Self { dx, dy, dz }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Horizontal component, in world units.
    pub fn xy(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }
}

impl From<[f64; 3]> for RegistrationOffset {
    fn from([dx, dy, dz]: [f64; 3]) -> Self {
        Self { dx, dy, dz }
    }
}

impl From<RegistrationOffset> for [f64; 3] {
    fn from(offset: RegistrationOffset) -> Self {
        [offset.dx, offset.dy, offset.dz]
    }
}

/// True when `value` is the no-data `sentinel`.
///
/// A NaN sentinel matches NaN pixels; plain `==` would never match.
pub fn is_no_data(value: f64, sentinel: f64) -> bool {
    value == sentinel || (sentinel.is_nan() && value.is_nan())
}
