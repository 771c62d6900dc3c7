//! GeoPath scenario driver.
//!
//! Reads a scenario file, loads each referenced mesh once, runs the search
//! per scenario and writes one output file (or JSON line) per scenario.
//! An empty output file means no path was found. A failed scenario is
//! logged and skipped; the remaining scenarios still run.

mod scenario;

use anyhow::{Context, Result};
use clap::Parser;
use geopath_core::{load_mesh, shortest_path, Mesh, PathResult};
use scenario::{load_scenarios, Scenario};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Shortest surface paths over spherical polygon meshes"
)]
struct Args {
    /// Scenario file to run
    scenario_file: PathBuf,

    /// Directory for per-scenario path output
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Name output files by scenario index instead of map and label
    #[arg(long)]
    indexed: bool,

    /// Emit one JSON object per scenario on stdout instead of text files
    #[arg(long)]
    json: bool,

    /// Skip building the latitude-band index when loading meshes
    #[arg(long)]
    no_band_index: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let scenarios = load_scenarios(&args.scenario_file)
        .with_context(|| format!("load scenarios from {}", args.scenario_file.display()))?;
    tracing::info!(
        "running {} scenarios from {}",
        scenarios.len(),
        args.scenario_file.display()
    );

    if !args.json {
        fs::create_dir_all(&args.out_dir)
            .with_context(|| format!("create {}", args.out_dir.display()))?;
    }

    // Mesh paths are resolved against the scenario file and each mesh is
    // loaded once, then shared read-only by every scenario that names it.
    let base_dir = args
        .scenario_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let mut meshes: HashMap<PathBuf, Arc<Mesh>> = HashMap::new();
    let mut io_failures = 0usize;

    for (idx, sc) in scenarios.iter().enumerate() {
        let mesh = match cached_mesh(&mut meshes, &base_dir, sc, !args.no_band_index) {
            Ok(mesh) => mesh,
            Err(err) => {
                tracing::error!("scenario {idx} ({}): {err:#}", sc.label);
                continue;
            }
        };

        let result = match shortest_path(&mesh, sc.start, sc.end) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!("scenario {idx} ({}): search failed: {err}", sc.label);
                continue;
            }
        };
        tracing::info!(
            "scenario {idx} ({}): found={} length={:.6} popped={}",
            sc.label,
            result.found(),
            result.length_deg,
            result.nodes_popped
        );

        if args.json {
            print_json(idx, sc, &result)?;
        } else {
            let path = output_path(&args, idx, sc);
            // A failed write still lets the remaining scenarios run, but
            // the process exits non-zero.
            if let Err(err) = write_path_file(&path, &result) {
                tracing::error!("scenario {idx} ({}): write {}: {err}", sc.label, path.display());
                io_failures += 1;
            }
        }
    }

    if io_failures > 0 {
        anyhow::bail!("{io_failures} scenario outputs could not be written");
    }
    Ok(())
}

fn cached_mesh(
    meshes: &mut HashMap<PathBuf, Arc<Mesh>>,
    base_dir: &Path,
    sc: &Scenario,
    band_index: bool,
) -> Result<Arc<Mesh>> {
    let resolved = if sc.map_path.is_absolute() {
        sc.map_path.clone()
    } else {
        base_dir.join(&sc.map_path)
    };
    if let Some(mesh) = meshes.get(&resolved) {
        return Ok(mesh.clone());
    }
    let mesh = load_mesh(&resolved, band_index)
        .with_context(|| format!("load mesh {}", resolved.display()))?;
    tracing::info!(
        "loaded mesh {} ({} vertices, {} polygons)",
        resolved.display(),
        mesh.vertices.len(),
        mesh.polygons.len()
    );
    let mesh = Arc::new(mesh);
    meshes.insert(resolved, mesh.clone());
    Ok(mesh)
}

fn output_path(args: &Args, idx: usize, sc: &Scenario) -> PathBuf {
    if args.indexed {
        args.out_dir.join(format!("{idx}.txt"))
    } else {
        let map_name = sc
            .map_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "map".to_owned());
        args.out_dir.join(format!("{map_name}_{}.txt", sc.label))
    }
}

/// One `lat lon` line per path point; an empty file means no path.
fn write_path_file(path: &Path, result: &PathResult) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for point in &result.path {
        writeln!(writer, "{} {}", point.lat, point.lon)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_json(idx: usize, sc: &Scenario, result: &PathResult) -> Result<()> {
    let line = serde_json::json!({
        "index": idx,
        "map": sc.map_path,
        "label": sc.label,
        "found": result.found(),
        "length_deg": result.length_deg,
        "path": result.path,
        "nodes_pushed": result.nodes_pushed,
        "nodes_popped": result.nodes_popped,
    });
    println!("{line}");
    Ok(())
}
