//! Threshold and combinator masks
//!
//! Masks are `Raster<f64>` with `1.0` for valid cells and NaN elsewhere.
//! `update_mask` keeps a raster's values where a mask is valid; a mask can
//! only remove cells, never reintroduce them.

use ndarray::Array2;
use rayon::prelude::*;
use scl_core::raster::Raster;
use scl_core::{Error, Result};

/// Cells strictly greater than `threshold` become 1.0, others NaN
pub fn gt_mask(raster: &Raster<f64>, threshold: f64) -> Result<Raster<f64>> {
    compare_mask(raster, move |v| v > threshold)
}

/// Cells at or above `threshold` become 1.0, others NaN
pub fn gte_mask(raster: &Raster<f64>, threshold: f64) -> Result<Raster<f64>> {
    compare_mask(raster, move |v| v >= threshold)
}

/// Cells strictly below `threshold` become 1.0, others NaN
pub fn lt_mask(raster: &Raster<f64>, threshold: f64) -> Result<Raster<f64>> {
    compare_mask(raster, move |v| v < threshold)
}

/// Cells at or below `threshold` become 1.0, others NaN
pub fn lte_mask(raster: &Raster<f64>, threshold: f64) -> Result<Raster<f64>> {
    compare_mask(raster, move |v| v <= threshold)
}

/// Non-zero valid cells keep their value, zeros become NaN
pub fn self_mask(raster: &Raster<f64>) -> Result<Raster<f64>> {
    map_valid(raster, |v| if v == 0.0 { f64::NAN } else { v })
}

/// Multiply every valid cell by `factor`
pub fn scale(raster: &Raster<f64>, factor: f64) -> Result<Raster<f64>> {
    map_valid(raster, move |v| v * factor)
}

/// Cells at or below the per-pixel threshold surface become 1.0, others NaN.
///
/// NaN thresholds exclude the cell (an unknown zone has no threshold).
pub fn lte_surface_mask(values: &Raster<f64>, thresholds: &Raster<f64>) -> Result<Raster<f64>> {
    values.ensure_same_shape(thresholds)?;
    zip_valid(values, thresholds, |v, t| {
        if v <= t {
            1.0
        } else {
            f64::NAN
        }
    })
}

/// Cells strictly above the per-pixel threshold surface become 1.0, others NaN
pub fn gt_surface_mask(values: &Raster<f64>, thresholds: &Raster<f64>) -> Result<Raster<f64>> {
    values.ensure_same_shape(thresholds)?;
    zip_valid(values, thresholds, |v, t| {
        if v > t {
            1.0
        } else {
            f64::NAN
        }
    })
}

/// Keep `raster`'s values where `mask` is valid; NaN elsewhere
pub fn update_mask(raster: &Raster<f64>, mask: &Raster<f64>) -> Result<Raster<f64>> {
    raster.ensure_same_shape(mask)?;
    zip_valid(raster, mask, |v, _| v)
}

/// Replace NaN/nodata cells with `fill`
pub fn unmask(raster: &Raster<f64>, fill: f64) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![fill; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = unsafe { raster.get_unchecked(row, col) };
                if !is_nodata_val(v, nodata) {
                    *out = v;
                }
            }
            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<f64>();
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Apply `f` to valid cells, NaN everywhere else
fn map_valid<F>(raster: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> f64 + Sync,
{
    let (rows, cols) = raster.shape();
    let nodata = raster.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let v = unsafe { raster.get_unchecked(row, col) };
                if is_nodata_val(v, nodata) {
                    continue;
                }
                *out = f(v);
            }
            row_data
        })
        .collect();

    build_output(raster, rows, cols, data)
}

fn compare_mask<F>(raster: &Raster<f64>, keep: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> bool + Sync,
{
    map_valid(raster, move |v| if keep(v) { 1.0 } else { f64::NAN })
}

/// Combine two rasters cell-wise; NaN wherever either input is invalid
fn zip_valid<F>(a: &Raster<f64>, b: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    let (rows, cols) = a.shape();
    let nodata_a = a.nodata();
    let nodata_b = b.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if is_nodata_val(va, nodata_a) || is_nodata_val(vb, nodata_b) {
                    continue;
                }
                *out = f(va, vb);
            }
            row_data
        })
        .collect();

    build_output(a, rows, cols, data)
}

fn build_output(
    template: &Raster<f64>,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
) -> Result<Raster<f64>> {
    let mut output = template.with_same_meta::<f64>();
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

pub(crate) fn is_nodata_val(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) => (value - nd).abs() < f64::EPSILON,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scl_core::GeoTransform;

    fn make_raster(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 1000.0, 1000.0, -1000.0));
        r
    }

    #[test]
    fn test_gte_mask() {
        let r = make_raster(vec![0.2, 0.5, 0.8, f64::NAN], 2, 2);
        let m = gte_mask(&r, 0.5).unwrap();

        assert!(m.get(0, 0).unwrap().is_nan());
        assert_eq!(m.get(0, 1).unwrap(), 1.0);
        assert_eq!(m.get(1, 0).unwrap(), 1.0);
        assert!(m.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_lt_mask_respects_nodata() {
        let mut r = make_raster(vec![-9999.0, 10.0, 20.0, 30.0], 2, 2);
        r.set_nodata(Some(-9999.0));
        let m = lt_mask(&r, 25.0).unwrap();

        // nodata never valid, even though -9999 < 25
        assert!(m.get(0, 0).unwrap().is_nan());
        assert_eq!(m.get(0, 1).unwrap(), 1.0);
        assert!(m.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_update_mask() {
        let values = make_raster(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let mask = make_raster(vec![1.0, f64::NAN, 1.0, f64::NAN], 2, 2);

        let out = update_mask(&values, &mask).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 1.0);
        assert!(out.get(0, 1).unwrap().is_nan());
        assert_eq!(out.get(1, 0).unwrap(), 3.0);
        assert!(out.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_update_mask_shape_mismatch() {
        let a = make_raster(vec![1.0; 4], 2, 2);
        let b = make_raster(vec![1.0; 6], 2, 3);
        assert!(update_mask(&a, &b).is_err());
    }

    #[test]
    fn test_lte_surface_mask() {
        let values = make_raster(vec![5.0, 10.0, 15.0, 20.0], 2, 2);
        let thresholds = make_raster(vec![7.2, 7.2, f64::NAN, 30.0], 2, 2);

        let m = lte_surface_mask(&values, &thresholds).unwrap();
        assert_eq!(m.get(0, 0).unwrap(), 1.0);
        assert!(m.get(0, 1).unwrap().is_nan()); // above threshold
        assert!(m.get(1, 0).unwrap().is_nan()); // unknown zone
        assert_eq!(m.get(1, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_unmask_and_self_mask() {
        let r = make_raster(vec![f64::NAN, 2.0, 0.0, 3.0], 2, 2);

        let filled = unmask(&r, 0.0).unwrap();
        assert_eq!(filled.get(0, 0).unwrap(), 0.0);
        assert_eq!(filled.get(0, 1).unwrap(), 2.0);

        let masked = self_mask(&filled).unwrap();
        assert!(masked.get(0, 0).unwrap().is_nan());
        assert!(masked.get(1, 0).unwrap().is_nan());
        assert_eq!(masked.get(1, 1).unwrap(), 3.0);
    }

    #[test]
    fn test_scale() {
        let r = make_raster(vec![100.0, 250.0, f64::NAN, 0.0], 2, 2);
        let s = scale(&r, 0.01).unwrap();
        assert_eq!(s.get(0, 0).unwrap(), 1.0);
        assert_eq!(s.get(0, 1).unwrap(), 2.5);
        assert!(s.get(1, 0).unwrap().is_nan());
    }
}
