//! Snapshot plots of the prepared inputs.
//!
//! Plotting is a side channel: the pipeline hands each intermediate grid to a
//! [`Plotter`] before metrics run, and nothing downstream depends on the
//! result. [`PngPlotter`] writes one grayscale PNG per grid.

use crate::config::PlotsConfig;
use image::{GrayImage, Luma};
use ndarray::ArrayView2;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Renders one grid.
pub trait Plotter {
    /// `save_name` identifies the plot (`input_refDSM`); pixels equal to
    /// `bad_value` are drawn as missing.
    fn make(
        &self,
        grid: ArrayView2<'_, f64>,
        title: &str,
        save_name: &str,
        bad_value: Option<f64>,
    ) -> Result<(), PlotError>;
}

/// Writes `<dir>/<base_name>_<save_name>.png`.
#[derive(Debug, Clone)]
pub struct PngPlotter {
    pub dir: PathBuf,
    pub base_name: String,
}

impl PngPlotter {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
        }
    }

    /// Plotter for the configured `PLOTS` section, or `None` when disabled.
    pub fn from_config(plots: &PlotsConfig, dir: &Path, base_name: &str) -> Option<Self> {
        if !plots.enabled() {
            return None;
        }
        Some(Self::new(dir, base_name))
    }

    pub fn path_for(&self, save_name: &str) -> PathBuf {
        self.dir.join(format!("{}_{save_name}.png", self.base_name))
    }
}

impl Plotter for PngPlotter {
    fn make(
        &self,
        grid: ArrayView2<'_, f64>,
        title: &str,
        save_name: &str,
        bad_value: Option<f64>,
    ) -> Result<(), PlotError> {
        let path = self.path_for(save_name);
        to_gray(grid, bad_value).save(&path)?;
        tracing::debug!(title, path = %path.display(), "saved plot");
        Ok(())
    }
}

/// Min-max stretch of the valid pixels into `1..=255`.
///
/// Non-finite pixels and pixels equal to `bad_value` are black (0), so they
/// stay distinguishable from the lowest valid value. A constant grid renders
/// every valid pixel white.
pub fn to_gray(grid: ArrayView2<'_, f64>, bad_value: Option<f64>) -> GrayImage {
    let is_valid = |v: f64| v.is_finite() && bad_value.is_none_or(|bad| v != bad);

    let (min, max) = grid
        .iter()
        .copied()
        .filter(|&v| is_valid(v))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;

    let (rows, cols) = grid.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        let v = grid[[y as usize, x as usize]];
        let level = if !is_valid(v) {
            0
        } else if span > 0.0 {
            1 + ((v - min) / span * 254.0).round() as u8
        } else {
            255
        };
        Luma([level])
    })
}
