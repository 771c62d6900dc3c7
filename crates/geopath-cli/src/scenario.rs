//! Scenario file reading.
//!
//! Format:
//!
//! ```text
//! version 2
//! map_path label startLat startLon endLat endLon
//! ```

use anyhow::{bail, Context, Result};
use geopath_core::Point;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One query: which mesh to load and where to route.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub map_path: PathBuf,
    pub label: String,
    pub start: Point,
    pub end: Point,
}

/// Load every scenario from a file. Any malformed line is fatal for the
/// whole file; per-scenario failures are the driver's concern.
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut scenarios = Vec::new();
    let mut saw_header = false;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("read line {line_no}"))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if !saw_header {
            if fields.len() != 2
                || !fields[0].eq_ignore_ascii_case("version")
                || fields[1] != "2"
            {
                bail!("line {line_no}: expected 'version 2' header, got '{line}'");
            }
            saw_header = true;
            continue;
        }
        if fields.len() != 6 {
            bail!("line {line_no}: expected 6 fields, got {}", fields.len());
        }
        let label = fields[1].to_owned();
        let coords: Vec<f64> = fields[2..]
            .iter()
            .map(|f| {
                f.parse()
                    .with_context(|| format!("line {line_no}: invalid coordinate '{f}'"))
            })
            .collect::<Result<_>>()?;
        for (lat, lon) in [(coords[0], coords[1]), (coords[2], coords[3])] {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                bail!("line {line_no}: coordinates ({lat}, {lon}) out of range");
            }
        }
        scenarios.push(Scenario {
            map_path: PathBuf::from(fields[0]),
            label,
            start: Point::new(coords[0], coords[1]),
            end: Point::new(coords[2], coords[3]),
        });
    }

    if !saw_header {
        bail!("{}: missing 'version 2' header", path.display());
    }
    Ok(scenarios)
}
