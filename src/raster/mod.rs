//! Raster access: loading, warping and no-data lookup.
//!
//! | Operation | Where |
//! |---|---|
//! | **Load** grid + transform + sentinel | [`RasterBackend::load`] |
//! | **Warp** onto a reference grid | [`RasterBackend::warp`] → [`warp::resample`] |
//! | **No-data** sentinel | [`RasterBackend::no_data_value`] |
//! | **Unit** width / height / area | [`GeoTransform`] |
//!
//! The module is split into:
//! - **Transform**: affine pixel ↔ world math (unit testable)
//! - **Warp**: pure resampling onto a target grid
//! - **Backend**: [`RasterBackend`] trait + shared types
//! - **TIFF backend**: GeoTIFF decoding via the `tiff` crate

pub mod backend;
pub mod tiff_backend;
pub mod transform;
pub mod warp;

pub use backend::{Raster, RasterBackend, RasterError, WarpParams, ensure_shape};
pub use tiff_backend::TiffBackend;
pub use transform::GeoTransform;
pub use warp::Resampling;
