//! Output composition
//!
//! Wires the masking, zone and patch stages into the effective potential
//! habitat pair and assembles the multi-band SCL image consumed by the
//! vectorizer and written as the classification-ready raster.

use crate::connectivity::km2_to_cells;
use crate::masking;
use crate::patches;
use crate::zones;
use scl_core::params::SpeciesParams;
use scl_core::raster::{Connectivity, Raster};
use scl_core::Result;

/// Habitat split by the HII threshold
#[derive(Debug, Clone)]
pub struct EffPotHab {
    /// Structural habitat under the zone HII threshold
    pub potential: Raster<f64>,
    /// Structural habitat at or over the threshold (excluded by impact)
    pub excluded: Raster<f64>,
}

/// Run the masking chain for one task year.
///
/// Structural habitat is thresholded, pruned to patches of at least the
/// structural patch area, then split against the per-zone HII threshold
/// surface. HII values are stored ×100 and rescaled before comparison.
pub fn effective_potential_habitat(
    structural: &Raster<f64>,
    hii: &Raster<f64>,
    zone_raster: &Raster<i32>,
    params: &SpeciesParams,
    year: i32,
) -> Result<EffPotHab> {
    structural.ensure_same_shape(hii)?;
    structural.ensure_same_shape(zone_raster)?;

    let suitable = masking::gte_mask(structural, params.thresholds.structural_habitat)?;

    let min_pixels = km2_to_cells(
        params.thresholds.structural_patch_km2,
        structural.cell_size(),
    );
    let connected = patches::filter_min_size(&suitable, min_pixels, Connectivity::Eight)?;

    let thresholds = zones::hii_threshold_surface(zone_raster, params, year)?;
    let impact = masking::scale(hii, 0.01)?;

    let low_impact = masking::lte_surface_mask(&impact, &thresholds)?;
    let high_impact = masking::gt_surface_mask(&impact, &thresholds)?;

    Ok(EffPotHab {
        potential: masking::update_mask(&connected, &low_impact)?,
        excluded: masking::update_mask(&connected, &high_impact)?,
    })
}

/// Range reclassification: 1 = extirpated, 2 = historic, NaN = neither.
///
/// Extirpated takes precedence where both rasters flag a cell.
pub fn range_class(
    historic: Option<&Raster<f64>>,
    extirpated: Option<&Raster<f64>>,
    template: &Raster<f64>,
) -> Result<Raster<f64>> {
    let mut class = template.like(f64::NAN);
    class.set_nodata(Some(f64::NAN));

    let mut paint = |source: &Raster<f64>, value: f64| -> Result<()> {
        template.ensure_same_shape(source)?;
        let mask = masking::gte_mask(source, 1.0)?;
        let (rows, cols) = class.shape();
        for row in 0..rows {
            for col in 0..cols {
                if unsafe { mask.get_unchecked(row, col) } == 1.0 {
                    unsafe { class.set_unchecked(row, col, value) };
                }
            }
        }
        Ok(())
    };

    if let Some(historic) = historic {
        paint(historic, 2.0)?;
    }
    if let Some(extirpated) = extirpated {
        paint(extirpated, 1.0)?;
    }

    Ok(class)
}

/// The multi-band SCL image.
///
/// Every band is masked to the class footprint; the band order here is
/// the band order of the written GeoTIFF.
#[derive(Debug, Clone)]
pub struct SclImage {
    /// SCL class: 3 = core, 1 = stepping stone, 4 = both
    pub class: Raster<f64>,
    /// Range class: 1 = extirpated, 2 = historic, 0 = neither
    pub range: Raster<f64>,
    /// Biome zone ID
    pub zone: Raster<f64>,
    /// Minimum core patch area, km²
    pub min_patch_km2: Raster<f64>,
    /// Minimum stepping-stone area, km²
    pub min_step_km2: Raster<f64>,
    /// Pixel area, km²
    pub area_km2: Raster<f64>,
    /// Pixel area where potential habitat is present, else 0, km²
    pub habitat_area_km2: Raster<f64>,
}

impl SclImage {
    pub const BAND_NAMES: [&'static str; 7] = [
        "scl_class",
        "range",
        "zone",
        "min_patch_km2",
        "min_step_km2",
        "area_km2",
        "habitat_area_km2",
    ];

    /// Bands in write order
    pub fn bands(&self) -> [&Raster<f64>; 7] {
        [
            &self.class,
            &self.range,
            &self.zone,
            &self.min_patch_km2,
            &self.min_step_km2,
            &self.area_km2,
            &self.habitat_area_km2,
        ]
    }
}

/// Assemble the SCL image from the class raster and its source layers.
///
/// `potential` is the effective potential habitat mask; it feeds the
/// habitat-area band that the vectorizer sums per polygon.
pub fn scl_image(
    class: &Raster<f64>,
    range: &Raster<f64>,
    zone_raster: &Raster<i32>,
    params: &SpeciesParams,
    potential: &Raster<f64>,
) -> Result<SclImage> {
    class.ensure_same_shape(range)?;
    class.ensure_same_shape(zone_raster)?;
    class.ensure_same_shape(potential)?;

    let pixel_area = class.pixel_area_km2();

    let zone_band = masking::update_mask(&zones::zones_as_band(zone_raster)?, class)?;
    let min_patch = masking::update_mask(&zones::min_core_surface(zone_raster, params)?, class)?;
    let min_step = masking::update_mask(&zones::min_step_surface(zone_raster, params)?, class)?;
    let range_band = masking::update_mask(&masking::unmask(range, 0.0)?, class)?;

    // Constant pixel-area band over the class footprint
    let area = masking::update_mask(&class.like(pixel_area), class)?;

    // Pixel area where habitat is present, 0 elsewhere in the footprint
    let habitat_area = masking::update_mask(
        &masking::unmask(&masking::scale(potential, pixel_area)?, 0.0)?,
        class,
    )?;

    Ok(SclImage {
        class: class.clone(),
        range: range_band,
        zone: zone_band,
        min_patch_km2: min_patch,
        min_step_km2: min_step,
        area_km2: area,
        habitat_area_km2: habitat_area,
    })
}
