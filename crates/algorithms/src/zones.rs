//! Zone threshold surfaces
//!
//! The zone raster assigns every pixel to a biome zone. Species parameters
//! carry a per-(zone, year) HII threshold table and per-zone densities;
//! this module turns those tables into per-pixel surfaces.

use ndarray::Array2;
use rayon::prelude::*;
use scl_core::params::SpeciesParams;
use scl_core::raster::{Raster, RasterElement};
use scl_core::{Error, Result};
use std::collections::HashMap;

/// Remap integer zone IDs to values; unmapped zones and zone IDs <= 0
/// become NaN.
pub fn remap_zones(zones: &Raster<i32>, mapping: &HashMap<i32, f64>) -> Result<Raster<f64>> {
    let (rows, cols) = zones.shape();
    let nodata = zones.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let zone = unsafe { zones.get_unchecked(row, col) };
                if zone <= 0 || zone.is_nodata(nodata) {
                    continue;
                }
                if let Some(&value) = mapping.get(&zone) {
                    *out = value;
                }
            }
            row_data
        })
        .collect();

    let mut output = zones.with_same_meta::<f64>();
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Per-pixel HII threshold for a task year.
///
/// Each zone's threshold is the table row applicable to `year` (most
/// recent at or before, else the earliest). Pixels in zones without a
/// table row are NaN and end up excluded from habitat.
pub fn hii_threshold_surface(
    zones: &Raster<i32>,
    params: &SpeciesParams,
    year: i32,
) -> Result<Raster<f64>> {
    let mapping: HashMap<i32, f64> = params
        .zone_ids()
        .into_iter()
        .filter_map(|zone| params.hii_threshold(zone, year).map(|t| (zone, t)))
        .collect();

    remap_zones(zones, &mapping)
}

/// Per-pixel minimum core patch area, km²
pub fn min_core_surface(zones: &Raster<i32>, params: &SpeciesParams) -> Result<Raster<f64>> {
    let mapping: HashMap<i32, f64> = params
        .zone_ids()
        .into_iter()
        .map(|zone| (zone, params.min_core_km2(zone)))
        .collect();
    remap_zones(zones, &mapping)
}

/// Per-pixel minimum stepping-stone area, km²
pub fn min_step_surface(zones: &Raster<i32>, params: &SpeciesParams) -> Result<Raster<f64>> {
    let mapping: HashMap<i32, f64> = params
        .zone_ids()
        .into_iter()
        .map(|zone| (zone, params.min_step_km2(zone)))
        .collect();
    remap_zones(zones, &mapping)
}

/// Zone IDs as f64 with NaN background, for the SCL image zone band
pub fn zones_as_band(zones: &Raster<i32>) -> Result<Raster<f64>> {
    let mapping: HashMap<i32, f64> = collect_zone_ids(zones)
        .into_iter()
        .map(|z| (z, z as f64))
        .collect();
    remap_zones(zones, &mapping)
}

fn collect_zone_ids(zones: &Raster<i32>) -> Vec<i32> {
    let mut ids: Vec<i32> = zones.data().iter().copied().filter(|&z| z > 0).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
