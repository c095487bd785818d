//! GeoTIFF raster backend built on the `tiff` crate.
//!
//! ## Tag mapping
//!
//! | Tag | Code | Use |
//! |---|---|---|
//! | `ModelPixelScale` | 33550 | pixel size (with tiepoint) |
//! | `ModelTiepoint` | 33922 | raster → model anchor |
//! | `ModelTransformation` | 34264 | full affine, preferred when present |
//! | `GDAL_NODATA` | 42113 | ASCII no-data sentinel |
//!
//! Only the first sample of each pixel is read. Rasters without geo tags get
//! an identity transform, which keeps plain TIFFs usable when every input
//! shares the same pixel grid.

use super::backend::{Raster, RasterBackend, RasterError};
use super::transform::GeoTransform;
use crate::types::Grid;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

pub const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
pub const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
pub const MODEL_TRANSFORMATION: Tag = Tag::ModelTransformationTag;
pub const GDAL_NODATA: Tag = Tag::GdalNodata;

/// Reads single-band GeoTIFFs (DSM, DTM, CLS, NDX, MTL).
#[derive(Debug, Default)]
pub struct TiffBackend;

impl TiffBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RasterBackend for TiffBackend {
    fn load(&self, path: &Path) -> Result<Raster, RasterError> {
        let mut decoder = open(path)?;
        let transform = read_transform(&mut decoder)?;
        let no_data = read_no_data(&mut decoder)?;
        let (width, height) = decoder.dimensions()?;
        let samples = samples_to_f64(decoder.read_image()?)
            .ok_or_else(|| unsupported(path, "sample format"))?;

        let pixels = width as usize * height as usize;
        if pixels == 0 || samples.len() % pixels != 0 {
            return Err(unsupported(path, "sample count does not match dimensions"));
        }
        let per_pixel = samples.len() / pixels;
        let band: Vec<f64> = samples.into_iter().step_by(per_pixel).collect();
        let data = Grid::from_shape_vec((height as usize, width as usize), band)
            .map_err(|e| unsupported(path, &e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            rows = height,
            cols = width,
            bands = per_pixel,
            ?no_data,
            "loaded raster"
        );
        Ok(Raster {
            data,
            transform,
            no_data,
        })
    }

    fn no_data_value(&self, path: &Path) -> Result<Option<f64>, RasterError> {
        read_no_data(&mut open(path)?)
    }
}

fn open(path: &Path) -> Result<Decoder<BufReader<File>>, RasterError> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited()))
}

fn unsupported(path: &Path, reason: &str) -> RasterError {
    RasterError::Unsupported {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn find_f64s<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<f64>>, RasterError> {
    Ok(decoder.find_tag(tag)?.map(|v| v.into_f64_vec()).transpose()?)
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform, RasterError> {
    if let Some(transform) = find_f64s(decoder, MODEL_TRANSFORMATION)?
        .and_then(|m| GeoTransform::from_model_transformation(&m))
    {
        return Ok(transform);
    }
    let tiepoint = find_f64s(decoder, MODEL_TIEPOINT)?;
    let scale = find_f64s(decoder, MODEL_PIXEL_SCALE)?;
    Ok(match (tiepoint, scale) {
        (Some(tiepoint), Some(scale)) => {
            GeoTransform::from_tiepoint(&tiepoint, &scale).unwrap_or_default()
        }
        _ => GeoTransform::identity(),
    })
}

fn read_no_data<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<f64>, RasterError> {
    let Some(value) = decoder.find_tag(GDAL_NODATA)? else {
        return Ok(None);
    };
    Ok(parse_no_data(&value.into_string()?))
}

/// Parse a `GDAL_NODATA` string. GDAL writes it NUL-terminated.
pub fn parse_no_data(raw: &str) -> Option<f64> {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse()
        .ok()
}

fn samples_to_f64(result: DecodingResult) -> Option<Vec<f64>> {
    Some(match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiff::encoder::{TiffEncoder, colortype};

    fn write_tiff(path: &Path, width: u32, height: u32, data: &[f32], nodata: Option<&str>) {
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(width, height)
            .unwrap();
        image
            .encoder()
            .write_tag(MODEL_PIXEL_SCALE, &[0.5f64, 0.5, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(MODEL_TIEPOINT, &[0.0f64, 0.0, 0.0, 1000.0, 2000.0, 0.0][..])
            .unwrap();
        if let Some(nodata) = nodata {
            image.encoder().write_tag(GDAL_NODATA, nodata).unwrap();
        }
        image.write_data(data).unwrap();
    }

    #[test]
    fn parse_no_data_strips_nul_and_whitespace() {
        assert_eq!(parse_no_data("-9999\0"), Some(-9999.0));
        assert_eq!(parse_no_data(" -3.4e38 "), Some(-3.4e38));
        assert!(parse_no_data("nan").unwrap().is_nan());
        assert_eq!(parse_no_data(""), None);
        assert_eq!(parse_no_data("none"), None);
    }

    #[test]
    fn load_reads_values_transform_and_sentinel() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dsm.tif");
        write_tiff(&path, 3, 2, &[1.0, 2.0, 3.0, 4.0, -9999.0, 6.0], Some("-9999"));

        let raster = TiffBackend::new().load(&path).unwrap();
        assert_eq!(raster.data.dim(), (2, 3));
        assert_eq!(raster.data[[0, 2]], 3.0);
        assert_eq!(raster.data[[1, 1]], -9999.0);
        assert_eq!(raster.transform, GeoTransform([1000.0, 0.5, 0.0, 2000.0, 0.0, -0.5]));
        assert_eq!(raster.no_data, Some(-9999.0));
    }

    #[test]
    fn no_data_value_is_none_without_tag() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cls.tif");
        write_tiff(&path, 1, 1, &[6.0], None);
        assert_eq!(TiffBackend::new().no_data_value(&path).unwrap(), None);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = TiffBackend::new().load(Path::new("/nonexistent/dsm.tif")).unwrap_err();
        assert!(matches!(err, RasterError::Io(_)));
    }
}
