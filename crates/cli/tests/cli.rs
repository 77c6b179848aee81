//! CLI contract tests against a synthetic catalog

use scl_core::raster::{GeoTransform, Raster};
use std::fs;
use std::path::Path;
use std::process::Command;

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

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scl-task"))
}

fn geo(mut r: Raster<f64>) -> Raster<f64> {
    r.set_transform(GeoTransform::new(400_000.0, 9_500_000.0, 1000.0, -1000.0));
    r
}

/// Minimal catalog: one dated structural/HII pair, zone 1 everywhere,
/// one core-sized habitat block.
fn build_catalog(root: &Path) {
    let mut structural = geo(Raster::filled(20, 20, 0.1));
    for row in 5..9 {
        for col in 5..11 {
            structural.set(row, col, 0.9).unwrap();
        }
    }
    let hii = geo(Raster::filled(20, 20, 300.0));
    let zones = geo(Raster::filled(20, 20, 1.0));

    let sh_dir = root.join("structural_habitat");
    let hii_dir = root.join("hii");
    let species_dir = root.join("species").join("panthera_tigris");
    fs::create_dir_all(&sh_dir).unwrap();
    fs::create_dir_all(&hii_dir).unwrap();
    fs::create_dir_all(&species_dir).unwrap();

    scl_core::io::write_geotiff(&structural, sh_dir.join("2020-01-01.tif"), None).unwrap();
    scl_core::io::write_geotiff(&hii, hii_dir.join("2020-02-01.tif"), None).unwrap();
    scl_core::io::write_geotiff(&zones, species_dir.join("zones.tif"), None).unwrap();
    fs::write(species_dir.join("params.toml"), PARAMS).unwrap();
}

#[test]
fn test_help_lists_documented_flags() {
    let out = bin().arg("--help").output().unwrap();
    assert!(out.status.success());

    let text = String::from_utf8_lossy(&out.stdout);
    for flag in ["--taskdate", "--species", "--scenario", "--overwrite"] {
        assert!(text.contains(flag), "--help must document {}", flag);
    }
}

#[test]
fn test_run_writes_versioned_outputs() {
    let dir = tempfile::tempdir().unwrap();
    build_catalog(dir.path());

    let run = |overwrite: bool| {
        let mut cmd = bin();
        cmd.arg("-d")
            .arg("2020-06-01")
            .arg("-s")
            .arg("panthera_tigris")
            .arg("--data-root")
            .arg(dir.path());
        if overwrite {
            cmd.arg("--overwrite");
        }
        let out = cmd.output().unwrap();
        assert!(
            out.status.success(),
            "scl-task failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
    };

    run(false);

    let out_dir = dir
        .path()
        .join("outputs/panthera_tigris/canonical/2020-06-01");
    assert!(out_dir.join("potential_habitat.tif").is_file());
    assert!(out_dir.join("scl_image.tif").is_file());
    assert!(out_dir.join("scl_polys.geojson").is_file());

    // Second run without --overwrite must not clobber, it versions
    let first_habitat = fs::read(out_dir.join("potential_habitat.tif")).unwrap();
    run(false);
    assert!(out_dir.join("potential_habitat_1.tif").is_file());
    assert!(out_dir.join("scl_polys_1.geojson").is_file());
    assert_eq!(
        first_habitat,
        fs::read(out_dir.join("potential_habitat.tif")).unwrap(),
        "original output must be untouched"
    );

    // Overwrite run replaces the base files and adds no new version
    run(true);
    assert!(!out_dir.join("potential_habitat_2.tif").exists());

    // The polygon layer contains the core class
    let geojson = fs::read_to_string(out_dir.join("scl_polys.geojson")).unwrap();
    assert!(geojson.contains("\"class\": 3"));
}

#[test]
fn test_missing_inputs_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    build_catalog(dir.path());

    // Task date far past the input window
    let out = bin()
        .arg("-d")
        .arg("2025-06-01")
        .arg("--data-root")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(!out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("structural habitat"));
}

#[test]
fn test_species_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    build_catalog(dir.path());

    let out = bin()
        .env("SCL_SPECIES", "panthera_tigris")
        .env("SCL_TASKDATE", "2020-06-01")
        .env("SCL_DATA_ROOT", dir.path())
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "env-driven run failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}
