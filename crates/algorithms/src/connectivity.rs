//! Dispersal growth and core/stepping-stone classification
//!
//! The stepping-stone rule: habitat patches at or above the minimum core
//! area are cores; smaller patches down to the minimum stepping-stone area
//! are stepping stones. Both are grown by half the species dispersal
//! distance, so two patches whose grown footprints touch are connected.
//! Grown cores carry class value 3, grown stepping stones 1; overlap sums
//! to 4.

use crate::masking::{self, is_nodata_val};
use crate::patches::{label_patches, patch_sizes};
use ndarray::Array2;
use scl_core::raster::{Connectivity, Raster};
use scl_core::{Error, Result};
use std::collections::HashMap;

/// Convert a distance in km to whole cells, truncating
pub fn km_to_cells(km: f64, cell_size_m: f64) -> usize {
    (km * 1000.0 / cell_size_m) as usize
}

/// Convert an area in km² to whole cells, truncating
pub fn km2_to_cells(km2: f64, cell_size_m: f64) -> usize {
    let cell_km = cell_size_m / 1000.0;
    (km2 / (cell_km * cell_km)) as usize
}

/// Exact euclidean distance, in cells, to the nearest valid cell.
///
/// Valid cells have distance 0. Two-pass transform: per-column nearest
/// valid cell, then a row-wise lower envelope over squared distances
/// (Felzenszwalb & Huttenlocher).
pub fn euclidean_distance(mask: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = mask.shape();
    let nodata = mask.nodata();

    // Distances can never exceed the grid diagonal; stands in for infinity
    // so the envelope stays finite.
    let far = (rows + cols) as f64;

    // Pass 1: vertical distance to the nearest valid cell in each column
    let mut vert = vec![far; rows * cols];
    for col in 0..cols {
        let mut dist = far;
        for row in 0..rows {
            let v = unsafe { mask.get_unchecked(row, col) };
            if !is_nodata_val(v, nodata) {
                dist = 0.0;
            } else if dist < far {
                dist += 1.0;
            }
            vert[row * cols + col] = dist.min(far);
        }
        let mut dist = far;
        for row in (0..rows).rev() {
            let v = unsafe { mask.get_unchecked(row, col) };
            if !is_nodata_val(v, nodata) {
                dist = 0.0;
            } else if dist < far {
                dist += 1.0;
            }
            let idx = row * cols + col;
            if dist < vert[idx] {
                vert[idx] = dist;
            }
        }
    }

    // Pass 2: 1D squared-distance envelope along each row
    let mut data = vec![f64::NAN; rows * cols];
    let mut f = vec![0.0; cols];
    for row in 0..rows {
        for col in 0..cols {
            let d = vert[row * cols + col];
            f[col] = d * d;
        }
        let d_row = distance_envelope_1d(&f);
        for col in 0..cols {
            data[row * cols + col] = d_row[col].sqrt();
        }
    }

    let mut output = mask.with_same_meta::<f64>();
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// 1D squared euclidean distance transform via the lower envelope of
/// parabolas rooted at `f[i] + (j - i)²`.
fn distance_envelope_1d(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    let mut d = vec![0.0; n];
    if n == 0 {
        return d;
    }

    let mut v = vec![0usize; n]; // parabola roots
    let mut z = vec![0.0f64; n + 1]; // envelope boundaries
    let mut k = 0usize;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    let intersect = |p: usize, q: usize| -> f64 {
        ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2 * q - 2 * p) as f64
    };

    for q in 1..n {
        let mut s = intersect(v[k], q);
        while s <= z[k] {
            k -= 1;
            s = intersect(v[k], q);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let diff = q as f64 - p as f64;
        *out = diff * diff + f[p];
    }
    d
}

/// Grow a validity mask to all cells within `radius_cells` of it
pub fn distance_dilate(mask: &Raster<f64>, radius_cells: f64) -> Result<Raster<f64>> {
    let dist = euclidean_distance(mask)?;
    masking::lte_mask(&dist, radius_cells)
}

/// Habitat split into cores and stepping stones
#[derive(Debug, Clone)]
pub struct PatchClasses {
    /// Patches at or above the minimum core area (mask of the patch cells)
    pub cores: Raster<f64>,
    /// Patches between the stepping-stone and core minima
    pub stepping_stones: Raster<f64>,
}

/// Classify habitat patches against per-pixel minimum-size surfaces.
///
/// Each patch's minimum core/stepping-stone pixel counts are the patch
/// mode of the corresponding surface (patches can straddle zone borders).
/// Patches below the stepping-stone minimum are dropped.
pub fn classify_patches(
    habitat: &Raster<f64>,
    min_core_px: &Raster<f64>,
    min_step_px: &Raster<f64>,
    connectivity: Connectivity,
) -> Result<PatchClasses> {
    habitat.ensure_same_shape(min_core_px)?;
    habitat.ensure_same_shape(min_step_px)?;

    let labels = label_patches(habitat, connectivity);
    let sizes = patch_sizes(&labels);

    let core_minima = patch_mode(&labels, min_core_px);
    let step_minima = patch_mode(&labels, min_step_px);

    let (rows, cols) = habitat.shape();
    let mut cores = habitat.like(f64::NAN);
    cores.set_nodata(Some(f64::NAN));
    let mut steps = cores.clone();

    for row in 0..rows {
        for col in 0..cols {
            let label = unsafe { labels.get_unchecked(row, col) };
            if label == 0 {
                continue;
            }
            let size = sizes[&label] as f64;
            let (Some(&core_min), Some(&step_min)) =
                (core_minima.get(&label), step_minima.get(&label))
            else {
                // Patch entirely outside known zones
                continue;
            };

            if size >= core_min {
                unsafe { cores.set_unchecked(row, col, 1.0) };
            } else if size >= step_min {
                unsafe { steps.set_unchecked(row, col, 1.0) };
            }
        }
    }

    Ok(PatchClasses {
        cores,
        stepping_stones: steps,
    })
}

/// Most frequent (rounded) valid surface value per patch
fn patch_mode(labels: &Raster<i32>, surface: &Raster<f64>) -> HashMap<i32, f64> {
    let (rows, cols) = labels.shape();
    let nodata = surface.nodata();

    let mut counts: HashMap<i32, HashMap<i64, usize>> = HashMap::new();
    for row in 0..rows {
        for col in 0..cols {
            let label = unsafe { labels.get_unchecked(row, col) };
            if label == 0 {
                continue;
            }
            let v = unsafe { surface.get_unchecked(row, col) };
            if is_nodata_val(v, nodata) {
                continue;
            }
            *counts
                .entry(label)
                .or_default()
                .entry(v.round() as i64)
                .or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .map(|(label, values)| {
            let mode = values
                .into_iter()
                .max_by_key(|&(value, count)| (count, value))
                .map(|(value, _)| value as f64)
                .unwrap_or(f64::NAN);
            (label, mode)
        })
        .collect()
}

/// Build the SCL class raster from potential habitat.
///
/// Grown cores contribute 3, grown stepping stones 1; the cell-wise sum
/// (4 where both) is self-masked and clipped to the water mask when one
/// is provided.
pub fn scl_class(
    potential: &Raster<f64>,
    min_core_px: &Raster<f64>,
    min_step_px: &Raster<f64>,
    radius_cells: f64,
    watermask: Option<&Raster<f64>>,
) -> Result<Raster<f64>> {
    if radius_cells < 0.0 {
        return Err(Error::InvalidParameter {
            name: "radius_cells",
            value: radius_cells.to_string(),
            reason: "growth radius must be non-negative".to_string(),
        });
    }

    let classes = classify_patches(potential, min_core_px, min_step_px, Connectivity::Eight)?;

    let core_grown = distance_dilate(&classes.cores, radius_cells)?;
    let step_grown = distance_dilate(&classes.stepping_stones, radius_cells)?;

    let core_score = masking::unmask(&masking::scale(&core_grown, 3.0)?, 0.0)?;
    let step_score = masking::unmask(&step_grown, 0.0)?;

    let (rows, cols) = potential.shape();
    let mut class = potential.like(f64::NAN);
    class.set_nodata(Some(f64::NAN));
    for row in 0..rows {
        for col in 0..cols {
            let sum = unsafe { core_score.get_unchecked(row, col) }
                + unsafe { step_score.get_unchecked(row, col) };
            if sum > 0.0 {
                unsafe { class.set_unchecked(row, col, sum) };
            }
        }
    }

    match watermask {
        Some(water) => masking::update_mask(&class, water),
        None => Ok(class),
    }
}
