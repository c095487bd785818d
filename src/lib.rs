//! # core3dmetrics
//!
//! Evaluates a reconstructed 3D terrain/building model (the "test" model)
//! against a ground-truth reference model. Inputs are rasters: surface and
//! terrain elevation (DSM, DTM), surface classification (CLS), and material
//! labels (MTL, NDX). The output is one JSON accuracy report.
//!
//! # Architecture: Orchestration Core, Pluggable Collaborators
//!
//! The crate owns the sequence that turns heterogeneous rasters, each with its
//! own no-data convention and possibly offset from the reference, into one
//! consistent dataset:
//!
//! ```text
//! config → register → read & warp → offset → masks → quantize → engines → report
//! ```
//!
//! Everything outside that sequence sits behind a trait, with one production
//! implementation and one test double each:
//!
//! | Concern | Trait | Production | Tests |
//! |---------|-------|------------|-------|
//! | Raster I/O and warping | [`raster::RasterBackend`] | [`raster::TiffBackend`] | in-memory rasters |
//! | Registration | [`align::Aligner`] | [`align::Align3dProcess`] | [`align::FixedAligner`] |
//! | Accuracy statistics | [`metrics::MetricEngines`] | [`engines::ProcessEngines`] | recording engines |
//! | Plots | [`plot::Plotter`] | [`plot::PngPlotter`] | recording plotter |
//!
//! The crate computes no accuracy statistic itself. Engines receive masks and
//! grids and return opaque JSON, which is placed in the report as-is.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Run planning and the evaluation sequence; emits progress events |
//! | [`config`] | TOML/JSON config loading, path resolution, validation |
//! | [`raster`] | GeoTIFF loading, affine transforms, resampling onto the reference grid |
//! | [`align`] | Registration offset: `align3d` process or a fixed offset |
//! | [`masks`] | Evaluation masks from classification values; reference ignore mask |
//! | [`elevation`] | Vertical offset and height quantization stages |
//! | [`metrics`] | Engine requests, engine trait, report assembly |
//! | [`engines`] | Metric engines as an external JSON-over-stdio process |
//! | [`plot`] | Grayscale PNG snapshots of the prepared inputs |
//! | [`report`] | `<test DSM>_metrics.json` writer |
//! | [`output`] | CLI output formatting for progress events |
//! | [`types`] | Grid aliases, the registration offset, no-data comparison |
//!
//! # Design Decisions
//!
//! ## Everything on the Reference Classification Grid
//!
//! Every raster, reference or test, is resampled onto the reference CLS grid
//! before anything else happens. From then on all grids share one shape and
//! one transform, so masks combine pixel-for-pixel and unit sizes come from a
//! single transform.
//!
//! ## Filled Pixels Stay Visible
//!
//! Elevation warps fill uncovered pixels with `-9999`. The vertical offset
//! skips those pixels and quantization snaps the sentinel along with the
//! grids, so engines can still tell filled pixels from measured ones.
//!
//! ## Stages Own Their Grids
//!
//! Offset and quantization take a grid by value and return the transformed
//! grid. The order of operations is the order of the calls; there is no
//! shared mutable state between stages.

pub mod align;
pub mod config;
pub mod elevation;
pub mod engines;
pub mod masks;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod plot;
pub mod raster;
pub mod report;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
