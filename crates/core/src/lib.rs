//! # SCL Core
//!
//! Core types and I/O for the Species Conservation Landscape (SCL)
//! habitat pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `Connectivity`: Neighbor patterns for patch operations
//! - GeoTIFF I/O (native `tiff` backend, optional GDAL backend)
//! - `Catalog`: date-resolved input collections and versioned output slots
//! - `SpeciesParams`: per-species thresholds and dispersal parameters

pub mod catalog;
pub mod error;
pub mod io;
pub mod params;
pub mod raster;

pub use catalog::{Catalog, Collection, DatedImage, OutputSlot};
pub use error::{Error, Result};
pub use params::SpeciesParams;
pub use raster::{Connectivity, GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::catalog::{Catalog, OutputSlot};
    pub use crate::error::{Error, Result};
    pub use crate::params::SpeciesParams;
    pub use crate::raster::{Connectivity, GeoTransform, Raster, RasterElement};
}
