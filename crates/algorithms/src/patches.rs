//! Patch labeling and minimum-size filtering
//!
//! Habitat masks are decomposed into connected patches; patches below a
//! pixel-count minimum are pruned.

use crate::masking::is_nodata_val;
use ndarray::Array2;
use scl_core::raster::{Connectivity, Raster};
use scl_core::Result;
use std::collections::{HashMap, VecDeque};

/// Label connected components of a validity mask.
///
/// Valid cells (non-NaN, non-nodata) receive 1-based patch labels;
/// background is 0.
pub fn label_patches(mask: &Raster<f64>, connectivity: Connectivity) -> Raster<i32> {
    let (rows, cols) = mask.shape();
    let nodata = mask.nodata();
    let offsets = connectivity.offsets();

    let mut labels = Array2::<i32>::zeros((rows, cols));
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    let mut next_label: i32 = 0;

    for row in 0..rows {
        for col in 0..cols {
            if labels[(row, col)] != 0 {
                continue;
            }
            let v = unsafe { mask.get_unchecked(row, col) };
            if is_nodata_val(v, nodata) {
                continue;
            }

            next_label += 1;
            labels[(row, col)] = next_label;
            queue.push_back((row, col));

            while let Some((r, c)) = queue.pop_front() {
                for &(dr, dc) in offsets {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if labels[(nr, nc)] != 0 {
                        continue;
                    }
                    let nv = unsafe { mask.get_unchecked(nr, nc) };
                    if is_nodata_val(nv, nodata) {
                        continue;
                    }
                    labels[(nr, nc)] = next_label;
                    queue.push_back((nr, nc));
                }
            }
        }
    }

    let mut output = mask.with_same_meta::<i32>();
    *output.data_mut() = labels;
    output
}

/// Pixel count per patch label (label 0 excluded)
pub fn patch_sizes(labels: &Raster<i32>) -> HashMap<i32, usize> {
    let mut sizes: HashMap<i32, usize> = HashMap::new();
    for &label in labels.data().iter() {
        if label > 0 {
            *sizes.entry(label).or_insert(0) += 1;
        }
    }
    sizes
}

/// Drop patches smaller than `min_pixels` from a validity mask.
///
/// With `min_pixels <= 1` the mask passes through unchanged.
pub fn filter_min_size(
    mask: &Raster<f64>,
    min_pixels: usize,
    connectivity: Connectivity,
) -> Result<Raster<f64>> {
    let labels = label_patches(mask, connectivity);
    let sizes = patch_sizes(&labels);

    let (rows, cols) = mask.shape();
    let mut output = mask.with_same_meta::<f64>();
    output.set_nodata(Some(f64::NAN));

    for row in 0..rows {
        for col in 0..cols {
            let label = unsafe { labels.get_unchecked(row, col) };
            let keep = label > 0 && sizes.get(&label).copied().unwrap_or(0) >= min_pixels;
            let value = if keep {
                unsafe { mask.get_unchecked(row, col) }
            } else {
                f64::NAN
            };
            unsafe { output.set_unchecked(row, col, value) };
        }
    }

    Ok(output)
}
