//! # SCL Algorithms
//!
//! Processing stages of the SCL effective potential habitat pipeline:
//!
//! - **masking**: threshold and combinator masks over suitability/impact rasters
//! - **zones**: per-(zone, year) HII threshold surfaces and zone remaps
//! - **patches**: connected-component labeling and minimum-size filtering
//! - **connectivity**: euclidean distance growth and core/stepping-stone classes
//! - **composite**: the masking chain and the multi-band SCL image
//! - **vectorize**: class regions to attributed polygons (GeoJSON)
//!
//! All stages are pure raster-in/raster-out functions; orchestration and
//! file I/O live in the task binary.

pub mod composite;
pub mod connectivity;
pub mod masking;
pub mod patches;
pub mod vectorize;
pub mod zones;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::composite::{effective_potential_habitat, range_class, scl_image, EffPotHab, SclImage};
    pub use crate::connectivity::{
        distance_dilate, euclidean_distance, km2_to_cells, km_to_cells, scl_class,
    };
    pub use crate::masking::{gt_mask, gte_mask, lt_mask, lte_mask, unmask, update_mask};
    pub use crate::patches::{filter_min_size, label_patches, patch_sizes};
    pub use crate::vectorize::{vectorize, write_geojson, SclPolygon};
    pub use crate::zones::hii_threshold_surface;
    pub use scl_core::prelude::*;
}
