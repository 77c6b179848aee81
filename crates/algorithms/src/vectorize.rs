//! Vectorization of the SCL class raster
//!
//! Connected regions of equal class value become polygons. Boundary edges
//! between region and non-region pixels are chained into closed rings on
//! the cell-corner lattice; ring orientation distinguishes exterior rings
//! from holes. Attributes are reduced per region: categorical bands by
//! mode, area bands by sum.

use crate::composite::SclImage;
use crate::masking::is_nodata_val;
use geo::{Coord, LineString, MultiPolygon, Polygon};
use scl_core::raster::{Connectivity, Raster};
use scl_core::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

/// One vectorized SCL region with reduced attributes
#[derive(Debug, Clone)]
pub struct SclPolygon {
    /// 1-based polygon ID, assigned in scan order
    pub poly_id: u32,
    /// SCL class of the region (3 core, 1 stepping stone, 4 both)
    pub class: i32,
    pub geometry: MultiPolygon<f64>,
    /// Mode of the zone band
    pub zone: i32,
    /// Mode of the range band
    pub range: i32,
    /// Mode of the minimum core area band, km²
    pub min_patch_km2: f64,
    /// Mode of the minimum stepping-stone area band, km²
    pub min_step_km2: f64,
    /// Summed pixel area, km²
    pub area_km2: f64,
    /// Summed habitat area, km²
    pub habitat_area_km2: f64,
}

/// Vectorize the SCL image into attributed polygons.
///
/// Regions are connected components of equal (rounded) class value;
/// `connectivity` controls whether diagonal cells join a region.
pub fn vectorize(image: &SclImage, connectivity: Connectivity) -> Result<Vec<SclPolygon>> {
    let class = &image.class;
    let (rows, cols) = class.shape();
    let nodata = class.nodata();

    // Rounded class grid, 0 = background
    let mut grid = vec![0i32; rows * cols];
    for row in 0..rows {
        for col in 0..cols {
            let v = unsafe { class.get_unchecked(row, col) };
            if !is_nodata_val(v, nodata) {
                grid[row * cols + col] = v.round() as i32;
            }
        }
    }

    // Label connected regions of equal class
    let mut labels = vec![0u32; rows * cols];
    let mut regions: Vec<(i32, Vec<(usize, usize)>)> = Vec::new();
    let offsets = connectivity.offsets();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();

    for row in 0..rows {
        for col in 0..cols {
            let idx = row * cols + col;
            if grid[idx] == 0 || labels[idx] != 0 {
                continue;
            }
            let value = grid[idx];
            let label = regions.len() as u32 + 1;
            labels[idx] = label;
            queue.push_back((row, col));
            let mut cells = Vec::new();

            while let Some((r, c)) = queue.pop_front() {
                cells.push((r, c));
                for &(dr, dc) in offsets {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }
                    let nidx = nr as usize * cols + nc as usize;
                    if labels[nidx] == 0 && grid[nidx] == value {
                        labels[nidx] = label;
                        queue.push_back((nr as usize, nc as usize));
                    }
                }
            }
            regions.push((value, cells));
        }
    }

    let mut polygons = Vec::with_capacity(regions.len());
    for (region_idx, (value, cells)) in regions.iter().enumerate() {
        let label = region_idx as u32 + 1;
        let geometry = trace_region(&labels, label, rows, cols, class)?;

        let poly = SclPolygon {
            poly_id: label,
            class: *value,
            geometry,
            zone: band_mode(&image.zone, cells).round() as i32,
            range: band_mode(&image.range, cells).round() as i32,
            min_patch_km2: band_mode(&image.min_patch_km2, cells),
            min_step_km2: band_mode(&image.min_step_km2, cells),
            area_km2: band_sum(&image.area_km2, cells),
            habitat_area_km2: band_sum(&image.habitat_area_km2, cells),
        };
        polygons.push(poly);
    }

    Ok(polygons)
}

/// Most frequent band value over the region cells, at 0.01 resolution
fn band_mode(band: &Raster<f64>, cells: &[(usize, usize)]) -> f64 {
    let nodata = band.nodata();
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &(row, col) in cells {
        let v = unsafe { band.get_unchecked(row, col) };
        if is_nodata_val(v, nodata) {
            continue;
        }
        *counts.entry((v * 100.0).round() as i64).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(key, count)| (count, key))
        .map(|(key, _)| key as f64 / 100.0)
        .unwrap_or(f64::NAN)
}

/// Sum of valid band values over the region cells
fn band_sum(band: &Raster<f64>, cells: &[(usize, usize)]) -> f64 {
    let nodata = band.nodata();
    cells
        .iter()
        .map(|&(row, col)| {
            let v = unsafe { band.get_unchecked(row, col) };
            if is_nodata_val(v, nodata) {
                0.0
            } else {
                v
            }
        })
        .sum()
}

/// Corner-lattice point (x = col, y = row)
type Corner = (i64, i64);

/// Trace one labeled region into a MultiPolygon in geographic coordinates
fn trace_region(
    labels: &[u32],
    label: u32,
    rows: usize,
    cols: usize,
    template: &Raster<f64>,
) -> Result<MultiPolygon<f64>> {
    let in_region = |r: isize, c: isize| -> bool {
        r >= 0
            && c >= 0
            && r < rows as isize
            && c < cols as isize
            && labels[r as usize * cols + c as usize] == label
    };

    // Directed boundary edges, region kept on the inside of a
    // clockwise-on-screen traversal.
    let mut edges: Vec<(Corner, Corner)> = Vec::new();
    for row in 0..rows as isize {
        for col in 0..cols as isize {
            if !in_region(row, col) {
                continue;
            }
            let (x, y) = (col as i64, row as i64);
            if !in_region(row - 1, col) {
                edges.push(((x, y), (x + 1, y)));
            }
            if !in_region(row, col + 1) {
                edges.push(((x + 1, y), (x + 1, y + 1)));
            }
            if !in_region(row + 1, col) {
                edges.push(((x + 1, y + 1), (x, y + 1)));
            }
            if !in_region(row, col - 1) {
                edges.push(((x, y + 1), (x, y)));
            }
        }
    }

    let rings = chain_rings(edges)?;

    // Positive shoelace area in corner coordinates marks exterior rings
    let mut exteriors: Vec<(Vec<Corner>, f64)> = Vec::new();
    let mut holes: Vec<Vec<Corner>> = Vec::new();
    for ring in rings {
        let area = shoelace(&ring);
        if area > 0.0 {
            exteriors.push((ring, area));
        } else {
            holes.push(ring);
        }
    }

    if exteriors.is_empty() {
        return Err(Error::Algorithm(format!(
            "region {} produced no exterior ring",
            label
        )));
    }

    // Assign each hole to the smallest exterior ring containing it
    let mut hole_groups: Vec<Vec<Vec<Corner>>> = vec![Vec::new(); exteriors.len()];
    for hole in holes {
        let probe = hole_interior_point(&hole);
        let owner = exteriors
            .iter()
            .enumerate()
            .filter(|(_, (ring, _))| point_in_ring(probe, ring))
            .min_by(|(_, (_, a)), (_, (_, b))| {
                a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i);
        if let Some(i) = owner {
            hole_groups[i].push(hole);
        }
    }

    // Reversing vertex order while flipping the y axis keeps exteriors
    // counter-clockwise in geographic space (GeoJSON winding).
    let gt = template.transform();
    let to_geo = |ring: &[Corner]| -> LineString<f64> {
        LineString::from(
            ring.iter()
                .rev()
                .map(|&(x, y)| {
                    let (gx, gy) = gt.corner_to_geo(x as f64, y as f64);
                    Coord { x: gx, y: gy }
                })
                .collect::<Vec<_>>(),
        )
    };

    let polys: Vec<Polygon<f64>> = exteriors
        .iter()
        .zip(hole_groups.iter())
        .map(|((exterior, _), ring_holes)| {
            Polygon::new(
                to_geo(exterior),
                ring_holes.iter().map(|h| to_geo(h)).collect(),
            )
        })
        .collect();

    Ok(MultiPolygon(polys))
}

/// Chain directed unit edges into closed rings.
///
/// At pinch corners (diagonally touching cells) two outgoing edges exist;
/// preferring the sharpest right turn keeps rings separated there.
fn chain_rings(edges: Vec<(Corner, Corner)>) -> Result<Vec<Vec<Corner>>> {
    let mut by_start: HashMap<Corner, Vec<usize>> = HashMap::new();
    for (idx, (start, _)) in edges.iter().enumerate() {
        by_start.entry(*start).or_default().push(idx);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        used[first] = true;
        let ring_start = edges[first].0;
        let mut ring = vec![ring_start, edges[first].1];
        let mut dir = direction(edges[first].0, edges[first].1);

        while *ring.last().expect("ring is non-empty") != ring_start {
            let corner = *ring.last().expect("ring is non-empty");
            let candidates = by_start.get(&corner).map(Vec::as_slice).unwrap_or(&[]);

            // Right turn first, then straight, then left
            let preference = [(-dir.1, dir.0), dir, (dir.1, -dir.0)];
            let next = preference.iter().find_map(|&want| {
                candidates.iter().copied().find(|&i| {
                    !used[i] && direction(edges[i].0, edges[i].1) == want
                })
            });

            let Some(next) = next else {
                return Err(Error::Algorithm("unclosed boundary ring".to_string()));
            };
            used[next] = true;
            dir = direction(edges[next].0, edges[next].1);
            ring.push(edges[next].1);
        }

        rings.push(simplify_collinear(ring));
    }

    Ok(rings)
}

fn direction(from: Corner, to: Corner) -> (i64, i64) {
    ((to.0 - from.0).signum(), (to.1 - from.1).signum())
}

/// Drop vertices where the ring continues straight. Input is a closed
/// ring (first == last); output stays closed.
fn simplify_collinear(ring: Vec<Corner>) -> Vec<Corner> {
    let n = ring.len() - 1; // distinct vertices
    if n < 4 {
        return ring;
    }
    let mut kept: Vec<Corner> = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let here = ring[i];
        let next = ring[(i + 1) % n];
        if direction(prev, here) != direction(here, next) {
            kept.push(here);
        }
    }
    if let Some(&first) = kept.first() {
        kept.push(first);
    }
    kept
}

/// Signed shoelace area of a closed ring in corner coordinates
fn shoelace(ring: &[Corner]) -> f64 {
    let mut sum = 0i64;
    for pair in ring.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        sum += x0 * y1 - x1 * y0;
    }
    sum as f64 / 2.0
}

/// A point strictly inside the area a hole ring encloses.
///
/// Holes are traversed with their interior on the left, so stepping half
/// a cell left of the first segment's midpoint lands inside.
fn hole_interior_point(ring: &[Corner]) -> (f64, f64) {
    let (x0, y0) = ring[0];
    let (x1, y1) = ring[1];
    let (dx, dy) = ((x1 - x0).signum() as f64, (y1 - y0).signum() as f64);
    let mid = (
        (x0 as f64 + x1 as f64) / 2.0,
        (y0 as f64 + y1 as f64) / 2.0,
    );
    (mid.0 + dy * 0.5, mid.1 - dx * 0.5)
}

/// Even-odd ray casting in corner coordinates
fn point_in_ring(point: (f64, f64), ring: &[Corner]) -> bool {
    let (px, py) = point;
    let mut inside = false;
    for pair in ring.windows(2) {
        let (x0, y0) = (pair[0].0 as f64, pair[0].1 as f64);
        let (x1, y1) = (pair[1].0 as f64, pair[1].1 as f64);
        if (y0 > py) != (y1 > py) {
            let x_cross = x0 + (py - y0) / (y1 - y0) * (x1 - x0);
            if px < x_cross {
                inside = !inside;
            }
        }
    }
    inside
}

/// Serialize polygons as a GeoJSON FeatureCollection
pub fn to_geojson(polygons: &[SclPolygon]) -> Value {
    let features: Vec<Value> = polygons
        .iter()
        .map(|poly| {
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": multipolygon_coords(&poly.geometry),
                },
                "properties": {
                    "poly_id": poly.poly_id,
                    "class": poly.class,
                    "zone": poly.zone,
                    "range": poly.range,
                    "min_patch_km2": poly.min_patch_km2,
                    "min_step_km2": poly.min_step_km2,
                    "area_km2": poly.area_km2,
                    "habitat_area_km2": poly.habitat_area_km2,
                },
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn multipolygon_coords(geometry: &MultiPolygon<f64>) -> Value {
    let polys: Vec<Value> = geometry
        .0
        .iter()
        .map(|poly| {
            let mut rings = vec![ring_coords(poly.exterior())];
            rings.extend(poly.interiors().iter().map(ring_coords));
            Value::Array(rings)
        })
        .collect();
    Value::Array(polys)
}

fn ring_coords(ring: &LineString<f64>) -> Value {
    Value::Array(
        ring.coords()
            .map(|c| json!([c.x, c.y]))
            .collect::<Vec<_>>(),
    )
}

/// Write polygons to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(polygons: &[SclPolygon], path: P) -> Result<()> {
    let text = serde_json::to_string_pretty(&to_geojson(polygons))
        .map_err(|e| Error::Other(format!("GeoJSON serialization: {}", e)))?;
    fs::write(path.as_ref(), text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite;
    use geo::Area;
    use scl_core::{GeoTransform, SpeciesParams};

    const PARAMS: &str = r#"
[species]
name = "panthera_tigris"
dispersal_distance_km = 4.0

[thresholds]
structural_habitat = 0.5
structural_patch_km2 = 3.0

[[thresholds.hii]]
year = 2010
zone = 1
value = 10.0

[density]
n_core_animals = 5.0
core_to_step_ratio = 0.1
core_size_limits = { min = 30.0, max = 625.0 }
step_size_limits = { min = 3.0, max = 63.0 }

[[density.zones]]
zone = 1
density = 2.0
"#;

    fn class_raster(cells: &[(usize, usize, f64)], rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, f64::NAN);
        r.set_nodata(Some(f64::NAN));
        r.set_transform(GeoTransform::new(0.0, rows as f64 * 1000.0, 1000.0, -1000.0));
        for &(row, col, v) in cells {
            r.set(row, col, v).unwrap();
        }
        r
    }

    fn image_for(class: Raster<f64>) -> SclImage {
        let params = SpeciesParams::from_toml_str(PARAMS).unwrap();
        let (rows, cols) = class.shape();
        let mut zones_r = Raster::<i32>::filled(rows, cols, 1);
        zones_r.set_transform(*class.transform());
        let range = class.like(f64::NAN);
        let potential = crate::masking::gt_mask(&class, 0.0).unwrap();
        composite::scl_image(&class, &range, &zones_r, &params, &potential).unwrap()
    }

    #[test]
    fn test_single_square_region() {
        // 2x2 block of class 3 at rows 1-2, cols 1-2 (1 km cells)
        let class = class_raster(
            &[(1, 1, 3.0), (1, 2, 3.0), (2, 1, 3.0), (2, 2, 3.0)],
            5,
            5,
        );
        let polys = vectorize(&image_for(class), Connectivity::Eight).unwrap();

        assert_eq!(polys.len(), 1);
        let poly = &polys[0];
        assert_eq!(poly.class, 3);
        assert_eq!(poly.zone, 1);
        assert_eq!(poly.geometry.0.len(), 1);

        // 4 corners + closing vertex after collinear simplification
        assert_eq!(poly.geometry.0[0].exterior().0.len(), 5);

        // 4 cells of 1 km² each
        assert!((poly.area_km2 - 4.0).abs() < 1e-10);
        assert!((poly.geometry.unsigned_area() - 4.0e6).abs() < 1.0);
    }

    #[test]
    fn test_region_with_hole() {
        // 3x3 ring of class 3 with an empty center
        let mut cells = Vec::new();
        for row in 1..4 {
            for col in 1..4 {
                if (row, col) != (2, 2) {
                    cells.push((row, col, 3.0));
                }
            }
        }
        let class = class_raster(&cells, 6, 6);
        let polys = vectorize(&image_for(class), Connectivity::Eight).unwrap();

        assert_eq!(polys.len(), 1);
        let poly = &polys[0];
        assert_eq!(poly.geometry.0.len(), 1);
        assert_eq!(poly.geometry.0[0].interiors().len(), 1);

        // 8 cells, and geometric area = 9 - 1 km²
        assert!((poly.area_km2 - 8.0).abs() < 1e-10);
        assert!((poly.geometry.unsigned_area() - 8.0e6).abs() < 1.0);
    }

    #[test]
    fn test_diagonal_region_is_multipolygon() {
        let class = class_raster(&[(1, 1, 3.0), (2, 2, 3.0)], 5, 5);
        let polys = vectorize(&image_for(class), Connectivity::Eight).unwrap();

        // One eight-connected region, two square parts
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].geometry.0.len(), 2);
        assert!((polys[0].area_km2 - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_distinct_classes_make_distinct_polygons() {
        let class = class_raster(&[(1, 1, 3.0), (1, 2, 1.0)], 4, 4);
        let polys = vectorize(&image_for(class), Connectivity::Eight).unwrap();

        assert_eq!(polys.len(), 2);
        let classes: Vec<i32> = polys.iter().map(|p| p.class).collect();
        assert!(classes.contains(&3));
        assert!(classes.contains(&1));
    }

    #[test]
    fn test_geojson_output() {
        let class = class_raster(&[(1, 1, 3.0)], 3, 3);
        let polys = vectorize(&image_for(class), Connectivity::Eight).unwrap();
        let geojson = to_geojson(&polys);

        assert_eq!(geojson["type"], "FeatureCollection");
        let features = geojson["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["class"], 3);
        assert_eq!(features[0]["geometry"]["type"], "MultiPolygon");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scl_polys.geojson");
        write_geojson(&polys, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("FeatureCollection"));
    }

    #[test]
    fn test_attribute_modes() {
        let class = class_raster(&[(1, 1, 3.0), (1, 2, 3.0)], 4, 4);
        let polys = vectorize(&image_for(class), Connectivity::Eight).unwrap();

        let poly = &polys[0];
        assert_eq!(poly.zone, 1);
        assert_eq!(poly.range, 0);
        assert!((poly.min_patch_km2 - 250.0).abs() < 1e-10);
        assert!((poly.min_step_km2 - 25.0).abs() < 1e-10);
        // potential == class footprint in image_for
        assert!((poly.habitat_area_km2 - 2.0).abs() < 1e-10);
    }
}
