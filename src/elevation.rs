//! Elevation stages: registration offset, then optional height quantization.
//!
//! Each stage takes ownership of its grid and hands back the transformed one,
//! so the offset → quantize order is visible in the call chain.

use crate::types::{Grid, RegistrationOffset, is_no_data};

/// Add the offset's vertical component to every valid pixel.
///
/// Pixels equal to `no_data` are left untouched; shifting them would make the
/// sentinel indistinguishable from measured data.
pub fn apply_offset(mut grid: Grid, offset: &RegistrationOffset, no_data: f64) -> Grid {
    let dz = offset.dz;
    grid.mapv_inplace(|value| {
        if is_no_data(value, no_data) {
            value
        } else {
            value + dz
        }
    });
    grid
}

/// Snap one value to the vertical voxel grid.
///
/// Ties round to even, the same rule numpy's `round` uses.
pub fn quantize_value(value: f64, unit_height: f64) -> f64 {
    (value / unit_height).round_ties_even() * unit_height
}

/// Snap every value in `grid` to multiples of `unit_height`.
pub fn quantize(mut grid: Grid, unit_height: f64) -> Grid {
    grid.mapv_inplace(|value| quantize_value(value, unit_height));
    grid
}

/// The four elevation grids plus the sentinel they share.
///
/// Quantization goes through [`ElevationSet::quantized`] so every grid and the
/// sentinel are snapped with the same unit height, keeping later sentinel
/// comparisons meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationSet {
    pub ref_dsm: Grid,
    pub ref_dtm: Grid,
    pub test_dsm: Grid,
    pub test_dtm: Grid,
    pub no_data: f64,
}

impl ElevationSet {
    pub fn quantized(self, unit_height: f64) -> Self {
        Self {
            ref_dsm: quantize(self.ref_dsm, unit_height),
            ref_dtm: quantize(self.ref_dtm, unit_height),
            test_dsm: quantize(self.test_dsm, unit_height),
            test_dtm: quantize(self.test_dtm, unit_height),
            no_data: quantize_value(self.no_data, unit_height),
        }
    }
}
