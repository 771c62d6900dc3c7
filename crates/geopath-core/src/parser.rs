//! Reader for the `.sph` mesh text format.
//!
//! Layout (whitespace-separated tokens, one record per line):
//!
//! ```text
//! sph
//! V P
//! lat lon n p_0 ... p_{n-1}        (V vertex lines; -1 = obstacle sector)
//! n v_0 ... v_{n-1} nb_0 ... nb_{n-1}   (P polygon lines; -1 = border)
//! ```
//!
//! Lines are streamed from the reader, never slurped, and the parsed data
//! goes through [`Mesh::from_parts`] so file input and programmatic input
//! share one validation path.

use crate::geometry::Point;
use crate::mesh::{Mesh, MeshError, PolyRef};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// Open and parse a mesh file. The handle is scoped to this call.
pub fn load_mesh(path: &Path, band_index: bool) -> Result<Mesh, MeshError> {
    let file = File::open(path)?;
    parse_mesh(BufReader::new(file), band_index)
}

/// Parse a mesh from any buffered reader.
pub fn parse_mesh<R: BufRead>(reader: R, band_index: bool) -> Result<Mesh, MeshError> {
    let mut lines = TokenLines::new(reader);

    let (_, header) = lines.next_record()?;
    if header.len() != 1 || !header[0].eq_ignore_ascii_case("sph") {
        return Err(MeshError::BadHeader(header.join(" ")));
    }

    let (line, counts) = lines.next_record()?;
    if counts.len() != 2 {
        return Err(malformed(line, "expected vertex and polygon counts"));
    }
    let vertex_count: usize = parse_field(line, &counts[0], "vertex count")?;
    let polygon_count: usize = parse_field(line, &counts[1], "polygon count")?;

    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let (line, tokens) = lines.next_record()?;
        if tokens.len() < 3 {
            return Err(malformed(line, "vertex line needs lat, lon and sector count"));
        }
        let lat: f64 = parse_field(line, &tokens[0], "latitude")?;
        let lon: f64 = parse_field(line, &tokens[1], "longitude")?;
        let n: usize = parse_field(line, &tokens[2], "sector count")?;
        if tokens.len() != 3 + n {
            return Err(malformed(
                line,
                &format!("expected {} sector ids, got {}", n, tokens.len() - 3),
            ));
        }
        let mut sectors = Vec::with_capacity(n);
        for token in &tokens[3..] {
            sectors.push(parse_poly_ref(line, token)?);
        }
        vertices.push((Point::new(lat, lon), sectors));
    }

    let mut polygons = Vec::with_capacity(polygon_count);
    for _ in 0..polygon_count {
        let (line, tokens) = lines.next_record()?;
        if tokens.is_empty() {
            return Err(malformed(line, "empty polygon line"));
        }
        let n: usize = parse_field(line, &tokens[0], "polygon size")?;
        if tokens.len() != 1 + 2 * n {
            return Err(malformed(
                line,
                &format!("expected {} vertex and neighbour ids, got {}", 2 * n, tokens.len() - 1),
            ));
        }
        let mut ring = Vec::with_capacity(n);
        for token in &tokens[1..1 + n] {
            ring.push(parse_field(line, token, "vertex id")?);
        }
        let mut neighbours = Vec::with_capacity(n);
        for token in &tokens[1 + n..] {
            neighbours.push(parse_poly_ref(line, token)?);
        }
        polygons.push((ring, neighbours));
    }

    Mesh::from_parts(vertices, polygons, band_index)
}

/// Line source that tracks numbers and skips blank lines.
struct TokenLines<R: BufRead> {
    lines: Lines<R>,
    current: usize,
}

impl<R: BufRead> TokenLines<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            current: 0,
        }
    }

    fn next_record(&mut self) -> Result<(usize, Vec<String>), MeshError> {
        for line in self.lines.by_ref() {
            self.current += 1;
            let line = line?;
            let tokens: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
            if !tokens.is_empty() {
                return Ok((self.current, tokens));
            }
        }
        Err(malformed(self.current, "unexpected end of file"))
    }
}

fn malformed(line: usize, message: &str) -> MeshError {
    MeshError::Malformed {
        line,
        message: message.to_owned(),
    }
}

fn parse_field<T: std::str::FromStr>(line: usize, token: &str, what: &str) -> Result<T, MeshError> {
    token
        .parse()
        .map_err(|_| malformed(line, &format!("invalid {what} '{token}'")))
}

fn parse_poly_ref(line: usize, token: &str) -> Result<PolyRef, MeshError> {
    let id: i64 = parse_field(line, token, "polygon id")?;
    if id == -1 {
        Ok(PolyRef::Obstacle)
    } else if id >= 0 {
        Ok(PolyRef::Poly(id as usize))
    } else {
        Err(malformed(line, &format!("invalid polygon id {id}")))
    }
}
