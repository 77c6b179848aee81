//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate. Single-band rasters are written as 32-bit float
//! with ModelPixelScale/ModelTiepoint geo tags; the multi-band SCL image is
//! written as one TIFF directory per band, geo-tagged on every directory.
//! For full GeoTIFF support (projections, compression), enable the `gdal`
//! feature.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

/// ModelPixelScaleTag
const TAG_PIXEL_SCALE: u16 = 33550;
/// ModelTiepointTag
const TAG_TIEPOINT: u16 = 33922;
/// GeoKeyDirectoryTag
const TAG_GEO_KEYS: u16 = 34735;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression (not supported in native mode, accepted for API parity)
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "NONE".to_string(),
        }
    }
}

/// Read a GeoTIFF file into a Raster.
///
/// Native reader with limited GeoTIFF metadata support; reads the first
/// image directory.
pub fn read_geotiff<T, P>(path: P, _band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    let mut decoder =
        Decoder::new(file).map_err(|e| Error::Tiff(format!("decode error: {}", e)))?;
    decode_directory(&mut decoder)
}

/// Read every directory of a GeoTIFF into a band list.
///
/// Inverse of [`write_multiband_geotiff`]; mainly used by tests reading
/// back the SCL image.
pub fn read_multiband_geotiff<P: AsRef<Path>>(path: P) -> Result<Vec<Raster<f64>>> {
    let file = File::open(path.as_ref())?;
    let mut decoder =
        Decoder::new(file).map_err(|e| Error::Tiff(format!("decode error: {}", e)))?;

    let mut bands: Vec<Raster<f64>> = vec![decode_directory(&mut decoder)?];
    while decoder.more_images() {
        decoder
            .next_image()
            .map_err(|e| Error::Tiff(format!("cannot advance directory: {}", e)))?;
        bands.push(decode_directory(&mut decoder)?);
    }
    Ok(bands)
}

/// Decode the current TIFF directory into a Raster
fn decode_directory<T, R>(decoder: &mut Decoder<R>) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Tiff(format!("cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Tiff(format!("cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_buffer(&buf),
        DecodingResult::F64(buf) => cast_buffer(&buf),
        DecodingResult::U8(buf) => cast_buffer(&buf),
        DecodingResult::U16(buf) => cast_buffer(&buf),
        DecodingResult::U32(buf) => cast_buffer(&buf),
        DecodingResult::I8(buf) => cast_buffer(&buf),
        DecodingResult::I16(buf) => cast_buffer(&buf),
        DecodingResult::I32(buf) => cast_buffer(&buf),
        _ => {
            return Err(Error::UnsupportedDataType(
                "unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(transform) = read_geotransform(decoder) {
        raster.set_transform(transform);
    }

    Ok(raster)
}

fn cast_buffer<T: RasterElement, S: Copy + num_traits::NumCast>(buf: &[S]) -> Vec<T> {
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// Attempt to read a GeoTransform from TIFF tags
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(TAG_PIXEL_SCALE))
        .map_err(|_| Error::Tiff("no pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::Unknown(TAG_TIEPOINT))
        .map_err(|_| Error::Tiff("no tiepoint tag".into()))?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }

    Err(Error::Tiff("cannot determine geotransform".into()))
}

/// Write a Raster to a single-band GeoTIFF file (32-bit float)
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    _options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    let mut encoder =
        TiffEncoder::new(file).map_err(|e| Error::Tiff(format!("encoder error: {}", e)))?;
    encode_band(&mut encoder, raster)
}

/// Write a band stack to a multi-directory GeoTIFF file.
///
/// Bands must share one shape and geotransform; band order is the caller's
/// contract with downstream readers (the SCL image documents its order).
pub fn write_multiband_geotiff<T, P>(bands: &[&Raster<T>], path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let first = bands
        .first()
        .ok_or_else(|| Error::Tiff("no bands to write".into()))?;
    for band in &bands[1..] {
        first.ensure_same_shape(band)?;
    }

    let file = File::create(path.as_ref())?;
    let mut encoder =
        TiffEncoder::new(file).map_err(|e| Error::Tiff(format!("encoder error: {}", e)))?;
    for band in bands {
        encode_band(&mut encoder, band)?;
    }
    Ok(())
}

/// Encode one raster as the next TIFF directory
fn encode_band<T, W>(encoder: &mut TiffEncoder<W>, raster: &Raster<T>) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Tiff(format!("cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_PIXEL_SCALE), scale.as_slice())
        .map_err(|e| Error::Tiff(format!("cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_TIEPOINT), tiepoint.as_slice())
        .map_err(|e| Error::Tiff(format!("cannot write tiepoint tag: {}", e)))?;

    // Minimal GeoKey directory: GTModelTypeGeoKey=Projected,
    // GTRasterTypeGeoKey=RasterPixelIsArea.
    let geokeys: Vec<u16> = vec![
        1, 1, 0, 2, //
        1024, 0, 1, 1, //
        1025, 0, 1, 1, //
    ];
    image
        .encoder()
        .write_tag(Tag::Unknown(TAG_GEO_KEYS), geokeys.as_slice())
        .map_err(|e| Error::Tiff(format!("cannot write geokey tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Tiff(format!("cannot write image data: {}", e)))?;

    Ok(())
}
