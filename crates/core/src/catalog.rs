//! Input catalog and output versioning
//!
//! The pipeline reads from a filesystem catalog laid out as:
//!
//! ```text
//! <root>/structural_habitat/<YYYY-MM-DD>.tif   (dated collection)
//! <root>/hii/<YYYY-MM-DD>.tif                  (dated collection)
//! <root>/species/<species>/params.toml
//! <root>/species/<species>/zones.tif
//! <root>/species/<species>/water_mask.tif        (optional)
//! <root>/species/<species>/historic_range.tif    (optional)
//! <root>/species/<species>/extirpated_range.tif  (optional)
//! <root>/outputs/<species>/<scenario>/<taskdate>/...
//! ```
//!
//! Collections hold date-stamped images; resolution picks the most recent
//! image at or before the task date within the collection's maximum age.

use crate::error::{Error, Result};
use chrono::{Months, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};

/// Filename date format for collection images
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Root of the input/output catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Catalog root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A dated image collection under the catalog root
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            dir: self.root.join(name),
            name: name.to_string(),
        }
    }

    /// Directory holding per-species inputs
    pub fn species_dir(&self, species: &str) -> PathBuf {
        self.root.join("species").join(species)
    }

    /// Path to the species parameter file
    pub fn params_path(&self, species: &str) -> PathBuf {
        self.species_dir(species).join("params.toml")
    }

    /// Path to a required static species input, erroring when absent
    pub fn static_input(&self, species: &str, name: &str) -> Result<PathBuf> {
        let path = self.species_dir(species).join(format!("{}.tif", name));
        if !path.is_file() {
            return Err(Error::Catalog(format!(
                "missing static input {} for species {}",
                path.display(),
                species
            )));
        }
        Ok(path)
    }

    /// Path to an optional static species input, `None` when absent
    pub fn optional_input(&self, species: &str, name: &str) -> Option<PathBuf> {
        let path = self.species_dir(species).join(format!("{}.tif", name));
        path.is_file().then_some(path)
    }

    /// Output directory for one task run
    pub fn output_dir(&self, species: &str, scenario: &str, taskdate: NaiveDate) -> PathBuf {
        self.root
            .join("outputs")
            .join(species)
            .join(scenario)
            .join(taskdate.format(DATE_FORMAT).to_string())
    }
}

/// A directory of date-stamped GeoTIFFs
#[derive(Debug, Clone)]
pub struct Collection {
    dir: PathBuf,
    name: String,
}

/// One image of a collection, resolved for a task date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedImage {
    pub path: PathBuf,
    pub date: NaiveDate,
}

impl Collection {
    /// Collection name (directory name under the catalog root)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// List all images with a parseable date stem, unsorted
    pub fn images(&self) -> Result<Vec<DatedImage>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            Error::Catalog(format!(
                "cannot read collection {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut images = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tif") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, DATE_FORMAT) {
                images.push(DatedImage { path, date });
            }
        }
        Ok(images)
    }

    /// The most recent image at or before `taskdate`, no older than
    /// `maxage_years` years before it.
    pub fn most_recent(&self, taskdate: NaiveDate, maxage_years: i32) -> Result<DatedImage> {
        let earliest = taskdate
            .checked_sub_months(Months::new(12 * maxage_years.max(0) as u32))
            .unwrap_or(NaiveDate::MIN);

        self.images()?
            .into_iter()
            .filter(|img| img.date <= taskdate && img.date >= earliest)
            .max_by_key(|img| img.date)
            .ok_or_else(|| Error::NoImageInWindow {
                collection: self.name.clone(),
                taskdate: taskdate.format(DATE_FORMAT).to_string(),
                maxage: maxage_years,
            })
    }
}

/// A named output file with version-increment semantics.
///
/// Without overwrite, an existing `stem.ext` is never clobbered; the slot
/// resolves to the first free `stem_N.ext` (N >= 1) instead.
#[derive(Debug, Clone)]
pub struct OutputSlot {
    dir: PathBuf,
    stem: String,
    ext: String,
}

impl OutputSlot {
    pub fn new<P: Into<PathBuf>>(dir: P, stem: &str, ext: &str) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.to_string(),
            ext: ext.to_string(),
        }
    }

    /// Unversioned path for this slot
    pub fn base_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, self.ext))
    }

    /// Resolve the path to write, creating the output directory.
    pub fn resolve(&self, overwrite: bool) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let base = self.base_path();
        if overwrite || !base.exists() {
            return Ok(base);
        }

        for n in 1.. {
            let candidate = self.dir.join(format!("{}_{}.{}", self.stem, n, self.ext));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        unreachable!()
    }
}
