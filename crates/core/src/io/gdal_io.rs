//! GeoTIFF reading and writing using GDAL

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use gdal::raster::GdalType;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use std::path::Path;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression type: "DEFLATE", "LZW", "ZSTD", "NONE"
    pub compression: String,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
        }
    }
}

/// Read a GeoTIFF file into a Raster
///
/// # Arguments
/// * `path` - Path to the GeoTIFF file
/// * `band` - Band number (1-indexed), defaults to 1
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement + GdalType,
    P: AsRef<Path>,
{
    let dataset = Dataset::open(path.as_ref())?;
    let rasterband = dataset.rasterband(band.unwrap_or(1))?;

    let (cols, rows) = dataset.raster_size();
    let buffer = rasterband.read_as::<T>((0, 0), (cols, rows), (cols, rows), None)?;

    let mut raster = Raster::from_vec(buffer.data().to_vec(), rows, cols)?;

    if let Ok(gt) = dataset.geo_transform() {
        raster.set_transform(GeoTransform::from_gdal(gt));
    }

    if let Ok(srs) = dataset.spatial_ref() {
        if let Ok(code) = srs.auth_code() {
            raster.set_epsg(Some(code as u32));
        }
    }

    if let Ok(nodata) = rasterband.no_data_value() {
        if let Some(nd) = num_traits::cast(nodata) {
            raster.set_nodata(Some(nd));
        }
    }

    Ok(raster)
}

/// Write a Raster to a single-band GeoTIFF file
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement + GdalType,
    P: AsRef<Path>,
{
    write_bands(&[raster], path, options)
}

/// Write a band stack to a multi-band GeoTIFF file.
///
/// Bands must share one shape and geotransform.
pub fn write_multiband_geotiff<T, P>(bands: &[&Raster<T>], path: P) -> Result<()>
where
    T: RasterElement + GdalType,
    P: AsRef<Path>,
{
    write_bands(bands, path, None)
}

fn write_bands<T, P>(bands: &[&Raster<T>], path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement + GdalType,
    P: AsRef<Path>,
{
    let first = *bands
        .first()
        .ok_or_else(|| Error::Other("no bands to write".into()))?;
    for band in &bands[1..] {
        first.ensure_same_shape(band)?;
    }

    let opts = options.unwrap_or_default();
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let (rows, cols) = first.shape();
    let create_options = vec![format!("COMPRESS={}", opts.compression)];
    let create_options_refs: Vec<&str> = create_options.iter().map(|s| s.as_str()).collect();

    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path.as_ref(),
        cols as isize,
        rows as isize,
        bands.len() as isize,
        &create_options_refs,
    )?;

    dataset.set_geo_transform(&first.transform().to_gdal())?;

    if let Some(epsg) = first.epsg() {
        let srs = SpatialRef::from_epsg(epsg)?;
        dataset.set_spatial_ref(&srs)?;
    }

    for (idx, raster) in bands.iter().enumerate() {
        let mut band = dataset.rasterband(idx + 1)?;

        if let Some(nodata) = raster.nodata() {
            if let Some(nd) = num_traits::cast(nodata) {
                band.set_no_data_value(Some(nd))?;
            }
        }

        let data: Vec<T> = raster.data().iter().copied().collect();
        band.write((0, 0), (cols, rows), &data)?;
    }

    Ok(())
}
