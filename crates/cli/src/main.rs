//! SCL task runner - effective potential habitat for a species and date
//!
//! Resolves date-stamped structural habitat and human impact rasters from
//! the catalog, runs the masking / patch / stepping-stone chain and writes
//! the habitat raster, the multi-band SCL image and the polygon layer.
//! Every flag can also be supplied through its environment variable.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use scl_algorithms::composite::{effective_potential_habitat, range_class, scl_image};
use scl_algorithms::connectivity::{km_to_cells, scl_class};
use scl_algorithms::masking::scale;
use scl_algorithms::vectorize::{vectorize, write_geojson};
use scl_algorithms::zones::{min_core_surface, min_step_surface};
use scl_core::io::{read_geotiff, write_geotiff, write_multiband_geotiff};
use scl_core::raster::{Connectivity, Raster};
use scl_core::{Catalog, OutputSlot, SpeciesParams};

/// Collection of structural habitat rasters under the catalog root
const STRUCTURAL_HABITAT: &str = "structural_habitat";
/// Collection of human impact index rasters under the catalog root
const HII: &str = "hii";
/// Maximum age (years) of a usable collection image
const INPUT_MAXAGE_YEARS: i32 = 1;

#[derive(Parser)]
#[command(name = "scl-task")]
#[command(author, version, about = "Compute effective potential habitat and SCL polygons", long_about = None)]
struct Cli {
    /// Task date (YYYY-MM-DD); defaults to today (UTC)
    #[arg(short = 'd', long, env = "SCL_TASKDATE")]
    taskdate: Option<NaiveDate>,

    /// Species name (directory under <data-root>/species)
    #[arg(short = 's', long, env = "SCL_SPECIES", default_value = "panthera_tigris")]
    species: String,

    /// Scenario name, used in the output path
    #[arg(long, env = "SCL_SCENARIO", default_value = "canonical")]
    scenario: String,

    /// Overwrite existing outputs instead of incrementing versions
    #[arg(long, env = "SCL_OVERWRITE")]
    overwrite: bool,

    /// Catalog root directory
    #[arg(long, env = "SCL_DATA_ROOT", default_value = "data")]
    data_root: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_f64(path: &PathBuf) -> Result<Raster<f64>> {
    let pb = spinner(&format!("Reading {}...", path.display()));
    let raster: Raster<f64> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!(
        "{}: {} x {} cells, {} m resolution",
        path.display(),
        raster.cols(),
        raster.rows(),
        raster.cell_size()
    );
    Ok(raster)
}

fn read_i32(path: &PathBuf) -> Result<Raster<i32>> {
    let pb = spinner(&format!("Reading {}...", path.display()));
    let raster: Raster<i32> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn read_optional(catalog: &Catalog, species: &str, name: &str) -> Result<Option<Raster<f64>>> {
    match catalog.optional_input(species, name) {
        Some(path) => Ok(Some(read_f64(&path)?)),
        None => {
            info!("no {} raster for {}, skipping", name, species);
            Ok(None)
        }
    }
}

fn done(name: &str, path: &std::path::Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let taskdate = cli.taskdate.unwrap_or_else(|| Utc::now().date_naive());
    info!("task date {} species {}", taskdate, cli.species);

    let catalog = Catalog::new(&cli.data_root);
    let params = SpeciesParams::from_path(catalog.params_path(&cli.species))
        .with_context(|| format!("Failed to load parameters for {}", cli.species))?;

    // ── Resolve and read inputs ──────────────────────────────────────
    let structural_img = catalog
        .collection(STRUCTURAL_HABITAT)
        .most_recent(taskdate, INPUT_MAXAGE_YEARS)
        .context("No structural habitat image for the task date")?;
    let hii_img = catalog
        .collection(HII)
        .most_recent(taskdate, INPUT_MAXAGE_YEARS)
        .context("No HII image for the task date")?;
    info!(
        "structural habitat from {}, HII from {}",
        structural_img.date, hii_img.date
    );

    let structural = read_f64(&structural_img.path)?;
    let hii = read_f64(&hii_img.path)?;
    let zones = read_i32(&catalog.static_input(&cli.species, "zones")?)?;

    let watermask = read_optional(&catalog, &cli.species, "water_mask")?;
    let historic = read_optional(&catalog, &cli.species, "historic_range")?;
    let extirpated = read_optional(&catalog, &cli.species, "extirpated_range")?;

    // ── Masking chain ────────────────────────────────────────────────
    let start = Instant::now();
    let pb = spinner("Masking structural habitat...");
    let year = taskdate.year();
    let eff = effective_potential_habitat(&structural, &hii, &zones, &params, year)
        .context("Failed to compute effective potential habitat")?;
    pb.finish_and_clear();
    info!(
        "potential habitat {:.1} km², excluded {:.1} km²",
        eff.potential.valid_area_km2(),
        eff.excluded.valid_area_km2()
    );

    // ── Patch classes and stepping-stone growth ──────────────────────
    let pb = spinner("Growing habitat patches...");
    let pixel_area = structural.pixel_area_km2();
    let min_core_px = scale(&min_core_surface(&zones, &params)?, 1.0 / pixel_area)?;
    let min_step_px = scale(&min_step_surface(&zones, &params)?, 1.0 / pixel_area)?;
    let radius_cells =
        km_to_cells(params.connectivity_radius_km(), structural.cell_size()) as f64;

    let class = scl_class(
        &eff.potential,
        &min_core_px,
        &min_step_px,
        radius_cells,
        watermask.as_ref(),
    )
    .context("Failed to classify habitat patches")?;
    pb.finish_and_clear();
    info!(
        "SCL class footprint {:.1} km² (growth radius {} cells)",
        class.valid_area_km2(),
        radius_cells
    );

    // ── Compose and vectorize ────────────────────────────────────────
    let pb = spinner("Composing SCL image...");
    let range = range_class(historic.as_ref(), extirpated.as_ref(), &class)
        .context("Failed to build range class band")?;
    let image = scl_image(&class, &range, &zones, &params, &eff.potential)
        .context("Failed to compose SCL image")?;
    pb.finish_and_clear();

    let pb = spinner("Vectorizing...");
    let polygons = vectorize(&image, Connectivity::Eight).context("Failed to vectorize")?;
    pb.finish_and_clear();
    info!("{} polygons", polygons.len());

    // ── Write outputs ────────────────────────────────────────────────
    let out_dir = catalog.output_dir(&cli.species, &cli.scenario, taskdate);

    let habitat_path = OutputSlot::new(&out_dir, "potential_habitat", "tif")
        .resolve(cli.overwrite)
        .context("Cannot resolve habitat raster output")?;
    write_geotiff(&eff.potential, &habitat_path, None)
        .context("Failed to write habitat raster")?;
    done("Potential habitat", &habitat_path, start.elapsed());

    let image_path = OutputSlot::new(&out_dir, "scl_image", "tif")
        .resolve(cli.overwrite)
        .context("Cannot resolve SCL image output")?;
    write_multiband_geotiff(&image.bands(), &image_path)
        .context("Failed to write SCL image")?;
    done("SCL image", &image_path, start.elapsed());

    let polys_path = OutputSlot::new(&out_dir, "scl_polys", "geojson")
        .resolve(cli.overwrite)
        .context("Cannot resolve polygon output")?;
    write_geojson(&polygons, &polys_path).context("Failed to write polygons")?;
    done("SCL polygons", &polys_path, start.elapsed());

    Ok(())
}
