//! End-to-end pipeline test on a synthetic landscape
//!
//! Builds a 30x40 scene at 1 km resolution with a core-sized habitat
//! block, a stepping-stone patch within dispersal range, a too-small
//! fragment and a high-impact strip, then runs the full chain:
//! masking -> patch classes -> growth -> SCL image -> polygons -> files.

use scl_algorithms::composite::{effective_potential_habitat, range_class, scl_image};
use scl_algorithms::connectivity::{km_to_cells, scl_class};
use scl_algorithms::masking::scale;
use scl_algorithms::vectorize::{vectorize, write_geojson};
use scl_algorithms::zones::{min_core_surface, min_step_surface};
use scl_core::io::{read_multiband_geotiff, write_geotiff, write_multiband_geotiff};
use scl_core::raster::{Connectivity, GeoTransform, Raster};
use scl_core::SpeciesParams;

const ROWS: usize = 30;
const COLS: usize = 40;

/// Zone 1 density of 62.5 gives an 8 km² core minimum; the stepping-stone
/// minimum clamps up to 2 km².
const PARAMS: &str = r#"
[species]
name = "panthera_tigris"
dispersal_distance_km = 4.0

[thresholds]
structural_habitat = 0.5
structural_patch_km2 = 2.0

[[thresholds.hii]]
year = 2015
zone = 1
value = 10.0

[density]
n_core_animals = 5.0
core_to_step_ratio = 0.1
core_size_limits = { min = 8.0, max = 625.0 }
step_size_limits = { min = 2.0, max = 63.0 }

[[density.zones]]
zone = 1
density = 62.5
"#;

fn geo<T: scl_core::RasterElement>(mut r: Raster<T>) -> Raster<T> {
    r.set_transform(GeoTransform::new(
        400_000.0,
        9_500_000.0,
        1000.0,
        -1000.0,
    ));
    r
}

/// Core block: rows 10..14, cols 5..11 (24 cells).
/// Stepping stone: rows 11..13, cols 14..16 (4 cells), gap of 3 columns.
/// Fragment: single cell at (25, 30).
/// Excluded strip: suitable habitat under high HII, rows 2..6, cols 25..31.
fn build_scene() -> (Raster<f64>, Raster<f64>, Raster<i32>) {
    let mut structural = geo(Raster::<f64>::filled(ROWS, COLS, 0.1));
    let mut hii = geo(Raster::<f64>::filled(ROWS, COLS, 300.0)); // 3.0 after scaling

    for row in 10..14 {
        for col in 5..11 {
            structural.set(row, col, 0.9).unwrap();
        }
    }
    for row in 11..13 {
        for col in 14..16 {
            structural.set(row, col, 0.8).unwrap();
        }
    }
    structural.set(25, 30, 0.9).unwrap();

    for row in 2..6 {
        for col in 25..31 {
            structural.set(row, col, 0.9).unwrap();
            hii.set(row, col, 2500.0).unwrap(); // 25.0, over the threshold
        }
    }

    let zones = geo(Raster::<i32>::filled(ROWS, COLS, 1));
    (structural, hii, zones)
}

#[test]
fn test_full_pipeline() {
    let params = SpeciesParams::from_toml_str(PARAMS).unwrap();
    let (structural, hii, zones) = build_scene();

    let eff = effective_potential_habitat(&structural, &hii, &zones, &params, 2020).unwrap();

    // Potential habitat: both real patches, not the fragment (under the
    // 2 km² structural patch floor) and not the high-impact strip
    assert_eq!(eff.potential.get(10, 5).unwrap(), 1.0);
    assert_eq!(eff.potential.get(11, 14).unwrap(), 1.0);
    assert!(eff.potential.get(25, 30).unwrap().is_nan());
    assert!(eff.potential.get(3, 27).unwrap().is_nan());
    assert_eq!(eff.excluded.get(3, 27).unwrap(), 1.0);

    // Patch classification in pixel units
    let pixel_area = structural.pixel_area_km2();
    let min_core_px = scale(&min_core_surface(&zones, &params).unwrap(), 1.0 / pixel_area).unwrap();
    let min_step_px = scale(&min_step_surface(&zones, &params).unwrap(), 1.0 / pixel_area).unwrap();

    let radius = km_to_cells(params.connectivity_radius_km(), structural.cell_size()) as f64;
    assert_eq!(radius, 2.0);

    let class = scl_class(&eff.potential, &min_core_px, &min_step_px, radius, None).unwrap();

    // Core block (24 px >= 8) carries 3, stepping stone (4 px, 2..8) carries 1
    assert_eq!(class.get(12, 8).unwrap(), 3.0);
    assert_eq!(class.get(11, 15).unwrap(), 1.0);

    // The 3-column gap: grown core reaches 2 cells right of col 10, grown
    // stone reaches 2 cells left of col 14; they overlap at col 12
    assert_eq!(class.get(11, 11).unwrap(), 3.0);
    assert_eq!(class.get(11, 12).unwrap(), 4.0);
    assert_eq!(class.get(11, 13).unwrap(), 1.0);

    // Far background stays empty
    assert!(class.get(25, 30).unwrap().is_nan());
    assert!(class.get(0, 0).unwrap().is_nan());

    // Compose and vectorize
    let range = range_class(None, None, &class).unwrap();
    let image = scl_image(&class, &range, &zones, &params, &eff.potential).unwrap();
    let polygons = vectorize(&image, Connectivity::Eight).unwrap();

    // Three class regions: grown core (3), overlap (4), grown stone (1)
    assert_eq!(polygons.len(), 3);
    let mut classes: Vec<i32> = polygons.iter().map(|p| p.class).collect();
    classes.sort_unstable();
    assert_eq!(classes, vec![1, 3, 4]);

    for poly in &polygons {
        assert_eq!(poly.zone, 1);
        assert!((poly.min_patch_km2 - 8.0).abs() < 1e-9);
        assert!((poly.min_step_km2 - 2.0).abs() < 1e-9);
        assert!(poly.area_km2 > 0.0);
    }

    // The core polygon contains the original 24 habitat cells
    let core_poly = polygons.iter().find(|p| p.class == 3).unwrap();
    assert!(core_poly.habitat_area_km2 >= 24.0 - 1e-9);
    assert!(core_poly.area_km2 > core_poly.habitat_area_km2);

    // Write all three artifacts
    let dir = tempfile::tempdir().unwrap();

    let habitat_path = dir.path().join("potential_habitat.tif");
    write_geotiff(&eff.potential, &habitat_path, None).unwrap();

    let image_path = dir.path().join("scl_image.tif");
    write_multiband_geotiff(&image.bands(), &image_path).unwrap();

    let polys_path = dir.path().join("scl_polys.geojson");
    write_geojson(&polygons, &polys_path).unwrap();

    // Read the SCL image back; band stack and footprint survive the trip
    let bands = read_multiband_geotiff(&image_path).unwrap();
    assert_eq!(bands.len(), 7);
    assert_eq!(bands[0].get(12, 8).unwrap(), 3.0);
    assert!(bands[0].get(0, 0).unwrap().is_nan());

    let text = std::fs::read_to_string(&polys_path).unwrap();
    assert!(text.contains("\"FeatureCollection\""));
    assert!(text.contains("habitat_area_km2"));
}

#[test]
fn test_pipeline_is_deterministic() {
    let params = SpeciesParams::from_toml_str(PARAMS).unwrap();
    let (structural, hii, zones) = build_scene();

    let run = || {
        let eff =
            effective_potential_habitat(&structural, &hii, &zones, &params, 2020).unwrap();
        let pixel_area = structural.pixel_area_km2();
        let min_core_px =
            scale(&min_core_surface(&zones, &params).unwrap(), 1.0 / pixel_area).unwrap();
        let min_step_px =
            scale(&min_step_surface(&zones, &params).unwrap(), 1.0 / pixel_area).unwrap();
        let class = scl_class(&eff.potential, &min_core_px, &min_step_px, 2.0, None).unwrap();
        let range = range_class(None, None, &class).unwrap();
        let image = scl_image(&class, &range, &zones, &params, &eff.potential).unwrap();
        vectorize(&image, Connectivity::Eight).unwrap()
    };

    let a = run();
    let b = run();
    assert_eq!(a.len(), b.len());
    for (pa, pb) in a.iter().zip(b.iter()) {
        assert_eq!(pa.poly_id, pb.poly_id);
        assert_eq!(pa.class, pb.class);
        assert_eq!(pa.area_km2, pb.area_km2);
        assert_eq!(pa.geometry, pb.geometry);
    }
}
