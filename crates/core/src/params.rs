//! Species parameter files
//!
//! Per-species thresholds, densities and dispersal distance, loaded from
//! `params.toml` in the species catalog directory:
//!
//! ```toml
//! [species]
//! name = "panthera_tigris"
//! dispersal_distance_km = 4.0
//!
//! [thresholds]
//! structural_habitat = 0.5
//! structural_patch_km2 = 5.0
//!
//! [[thresholds.hii]]
//! year = 2015
//! zone = 1
//! value = 14.4
//!
//! [density]
//! n_core_animals = 5.0
//! core_to_step_ratio = 0.1
//! core_size_limits = { min = 30.0, max = 625.0 }
//! step_size_limits = { min = 3.0, max = 63.0 }
//!
//! [[density.zones]]
//! zone = 1
//! density = 2.2
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Per-species pipeline parameters
#[derive(Debug, Clone, Deserialize)]
pub struct SpeciesParams {
    pub species: SpeciesInfo,
    pub thresholds: Thresholds,
    pub density: DensityParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeciesInfo {
    pub name: String,
    /// Dispersal distance in kilometers; patches grown by half this
    /// distance that touch are considered connected.
    pub dispersal_distance_km: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Minimum structural habitat suitability, in [0, 1]
    pub structural_habitat: f64,
    /// Minimum structural patch area before HII masking, in km²
    pub structural_patch_km2: f64,
    /// HII thresholds per (zone, year)
    pub hii: Vec<HiiThreshold>,
}

/// One row of the (zone, year) → HII threshold table
#[derive(Debug, Clone, Deserialize)]
pub struct HiiThreshold {
    pub year: i32,
    pub zone: i32,
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DensityParams {
    /// Animals a core patch must be able to hold
    pub n_core_animals: f64,
    /// Minimum stepping-stone area as a fraction of minimum core area
    pub core_to_step_ratio: f64,
    /// Clamp for derived minimum core area, km²
    pub core_size_limits: SizeLimits,
    /// Clamp for derived minimum stepping-stone area, km²
    pub step_size_limits: SizeLimits,
    /// Median animal density per zone, animals / 100 km²
    pub zones: Vec<ZoneDensity>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SizeLimits {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneDensity {
    pub zone: i32,
    pub density: f64,
}

impl SpeciesParams {
    /// Load and validate parameters from a TOML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Params(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate parameters from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let params: SpeciesParams =
            toml::from_str(text).map_err(|e| Error::Params(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        if self.species.dispersal_distance_km <= 0.0 {
            return Err(Error::Params(
                "dispersal_distance_km must be positive".into(),
            ));
        }
        if self.thresholds.hii.is_empty() {
            return Err(Error::Params("thresholds.hii table is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.thresholds.structural_habitat) {
            return Err(Error::Params(
                "thresholds.structural_habitat must be in [0, 1]".into(),
            ));
        }
        if self.density.core_to_step_ratio <= 0.0 || self.density.core_to_step_ratio > 1.0 {
            return Err(Error::Params(
                "density.core_to_step_ratio must be in (0, 1]".into(),
            ));
        }
        for limits in [
            &self.density.core_size_limits,
            &self.density.step_size_limits,
        ] {
            if limits.min <= 0.0 || limits.min > limits.max {
                return Err(Error::Params(
                    "size limits must satisfy 0 < min <= max".into(),
                ));
            }
        }
        for zd in &self.density.zones {
            if zd.density <= 0.0 {
                return Err(Error::Params(format!(
                    "density for zone {} must be positive",
                    zd.zone
                )));
            }
        }
        Ok(())
    }

    /// HII threshold applicable to `zone` in `year`.
    ///
    /// Picks the most recent table row for the zone whose year is at or
    /// before `year`, falling back to the zone's earliest row. `None` for
    /// zones without any row.
    pub fn hii_threshold(&self, zone: i32, year: i32) -> Option<f64> {
        let rows: Vec<&HiiThreshold> = self
            .thresholds
            .hii
            .iter()
            .filter(|t| t.zone == zone)
            .collect();

        rows.iter()
            .filter(|t| t.year <= year)
            .max_by_key(|t| t.year)
            .or_else(|| rows.iter().min_by_key(|t| t.year))
            .map(|t| t.value)
    }

    /// Zone IDs present in the HII threshold table
    pub fn zone_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.thresholds.hii.iter().map(|t| t.zone).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Minimum core patch area for a zone, km².
    ///
    /// Derived as `n_core_animals / density × 100`, clamped to the core
    /// size limits. Zones without a density row use a density of 1.
    pub fn min_core_km2(&self, zone: i32) -> f64 {
        let density = self
            .density
            .zones
            .iter()
            .find(|zd| zd.zone == zone)
            .map(|zd| zd.density)
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0);

        let raw = self.density.n_core_animals / density * 100.0;
        raw.clamp(
            self.density.core_size_limits.min,
            self.density.core_size_limits.max,
        )
    }

    /// Minimum stepping-stone area for a zone, km²
    pub fn min_step_km2(&self, zone: i32) -> f64 {
        let raw = self.min_core_km2(zone) * self.density.core_to_step_ratio;
        raw.clamp(
            self.density.step_size_limits.min,
            self.density.step_size_limits.max,
        )
    }

    /// Growth radius for the stepping-stone rule, km
    pub fn connectivity_radius_km(&self) -> f64 {
        self.species.dispersal_distance_km / 2.0
    }
}
