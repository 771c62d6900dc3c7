//! Mesh data model: vertices, polygons and point location.
//!
//! Polygons list their vertices counter-clockwise as seen from outside the
//! sphere, so the interior lies to the left of every directed edge.
//! `neighbours[i]` is the polygon across the edge from `vertices[i]` to
//! `vertices[(i + 1) % n]`. A mesh is immutable once constructed.

use crate::geometry::{is_bounded, orientation, Orientation, Point};
use crate::EPSILON;
use thiserror::Error;

/// The far side of a polygon edge, or one sector around a vertex.
///
/// "No neighbour" is a first-class variant rather than a sentinel polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyRef {
    Poly(usize),
    Obstacle,
}

impl PolyRef {
    pub fn is_obstacle(&self) -> bool {
        matches!(self, PolyRef::Obstacle)
    }

    pub fn poly(&self) -> Option<usize> {
        match self {
            PolyRef::Poly(id) => Some(*id),
            PolyRef::Obstacle => None,
        }
    }
}

/// A mesh vertex: a point plus the ordered ring of incident sectors.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub point: Point,
    /// One entry per sector around the vertex, in ring order.
    pub sectors: Vec<PolyRef>,
    /// At least one incident sector is an obstacle.
    pub corner: bool,
    /// More than one incident sector is an obstacle.
    pub ambiguous: bool,
}

/// A convex polygon of the mesh with its derived metadata.
#[derive(Debug, Clone)]
pub struct Polygon {
    pub vertices: Vec<usize>,
    pub neighbours: Vec<PolyRef>,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    /// Longitude span exceeds 180 degrees (crosses the antimeridian);
    /// stored with min_lon > max_lon.
    pub wraps_lon: bool,
    /// Strictly contains a pole.
    pub is_polar: bool,
    /// At most one traversable neighbour; a dead end for search expansion.
    pub is_one_way: bool,
}

/// Where a point sits relative to one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Outside,
    Inside,
    /// On the edge between the two listed vertex ids; `neighbour` is the
    /// polygon on the far side of that edge.
    OnEdge {
        neighbour: PolyRef,
        verts: (usize, usize),
    },
    OnVertex(usize),
}

impl Polygon {
    /// Classify `p` against this polygon by walking the ring once.
    ///
    /// A colinear-and-bounded edge hit is only committed on the following
    /// iteration so that coincidence with the edge's far endpoint still
    /// reports the vertex.
    pub fn contains(&self, vertices: &[Vertex], p: &Point) -> Containment {
        let n = self.vertices.len();
        let mut on_edge: Option<usize> = None;
        for i in 0..n {
            let vi = &vertices[self.vertices[i]].point;
            if p.approx_eq(vi) {
                return Containment::OnVertex(self.vertices[i]);
            }
            if let Some(e) = on_edge {
                return Containment::OnEdge {
                    neighbour: self.neighbours[e],
                    verts: (self.vertices[e], self.vertices[(e + 1) % n]),
                };
            }
            let vj = &vertices[self.vertices[(i + 1) % n]].point;
            match orientation(vi, vj, p) {
                Orientation::Clockwise => return Containment::Outside,
                Orientation::Colinear => {
                    if is_bounded(p, vi, vj) {
                        on_edge = Some(i);
                    }
                }
                Orientation::Anticlockwise => {}
            }
        }
        if let Some(e) = on_edge {
            return Containment::OnEdge {
                neighbour: self.neighbours[e],
                verts: (self.vertices[e], self.vertices[(e + 1) % n]),
            };
        }
        Containment::Inside
    }
}

/// Where a point sits in the whole mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    /// No traversable polygon contains the point.
    InObstacle,
    InPolygon(usize),
    /// On an edge whose far side is an obstacle.
    OnMeshBorder { poly: usize, verts: (usize, usize) },
    /// On an edge shared by two traversable polygons.
    OnEdge {
        polys: (usize, usize),
        verts: (usize, usize),
    },
    OnAmbigCornerVertex(usize),
    OnUnambigCornerVertex(usize),
    OnNonCornerVertex(usize),
}

impl PointLocation {
    /// Traversable polygons incident to the location, in ring order for
    /// vertices. Empty means the point is unreachable.
    pub fn polygons(&self, mesh: &Mesh) -> Vec<usize> {
        match *self {
            PointLocation::InObstacle => Vec::new(),
            PointLocation::InPolygon(p) => vec![p],
            PointLocation::OnMeshBorder { poly, .. } => vec![poly],
            PointLocation::OnEdge { polys, .. } => vec![polys.0, polys.1],
            PointLocation::OnAmbigCornerVertex(v)
            | PointLocation::OnUnambigCornerVertex(v)
            | PointLocation::OnNonCornerVertex(v) => mesh.vertices[v]
                .sectors
                .iter()
                .filter_map(|s| s.poly())
                .collect(),
        }
    }
}

/// Errors raised while building or reading a mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("failed to read mesh: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad header: expected 'sph', got '{0}'")]
    BadHeader(String),
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("vertex {vertex} latitude/longitude out of range: ({lat}, {lon})")]
    CoordOutOfRange { vertex: usize, lat: f64, lon: f64 },
    #[error("vertex {vertex} has two adjacent obstacle sectors")]
    AdjacentObstacles { vertex: usize },
    #[error("vertex {vertex} references out-of-range polygon {polygon}")]
    SectorOutOfRange { vertex: usize, polygon: usize },
    #[error("polygon {polygon} has {count} vertices, need at least 3")]
    TooFewVertices { polygon: usize, count: usize },
    #[error("polygon {polygon} has {vertices} vertices but {neighbours} neighbours")]
    RingMismatch {
        polygon: usize,
        vertices: usize,
        neighbours: usize,
    },
    #[error("polygon {polygon} references out-of-range vertex {vertex}")]
    VertexOutOfRange { polygon: usize, vertex: usize },
    #[error("polygon {polygon} references out-of-range neighbour {neighbour}")]
    NeighbourOutOfRange { polygon: usize, neighbour: usize },
}

/// Latitude-band acceleration index for point location.
///
/// Purely advisory: a band can miss a polygon whose edges bulge poleward
/// past its vertex latitudes, so a failed band lookup always falls back to
/// the linear scan.
#[derive(Debug, Clone)]
struct BandIndex {
    lats: Vec<f64>,
    bands: Vec<Vec<usize>>,
}

impl BandIndex {
    fn build(vertices: &[Vertex], polygons: &[Polygon]) -> Self {
        let mut lats: Vec<f64> = vertices.iter().map(|v| v.point.lat).collect();
        lats.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        lats.dedup_by(|a, b| (*a - *b).abs() <= EPSILON);

        let nbands = lats.len() + 1;
        let mut bands: Vec<Vec<usize>> = vec![Vec::new(); nbands];
        let north = Point::new(90.0, 0.0);
        let south = Point::new(-90.0, 0.0);
        for (id, poly) in polygons.iter().enumerate() {
            let mut lo = lats.partition_point(|l| *l < poly.min_lat - EPSILON);
            let mut hi = lats.partition_point(|l| *l < poly.max_lat + EPSILON);
            if poly.is_polar {
                // A polar polygon reaches past every vertex latitude on the
                // pole side, so widen its bands up to the relevant extreme.
                if poly.contains(vertices, &north) != Containment::Outside {
                    hi = nbands - 1;
                }
                if poly.contains(vertices, &south) != Containment::Outside {
                    lo = 0;
                }
            }
            for band in bands.iter_mut().take(hi + 1).skip(lo) {
                band.push(id);
            }
        }
        Self { lats, bands }
    }

    fn candidates(&self, lat: f64) -> &[usize] {
        &self.bands[self.lats.partition_point(|l| *l < lat)]
    }
}

/// A collection of vertices and polygons over the unit sphere.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub polygons: Vec<Polygon>,
    bands: Option<BandIndex>,
}

impl Mesh {
    /// Build a mesh from raw vertex and polygon data, validating the
    /// structural invariants and computing all derived fields.
    ///
    /// # Arguments
    /// * `vertices` - point plus incident-sector ring per vertex
    /// * `polygons` - vertex-id ring plus parallel neighbour ring
    /// * `band_index` - whether to build the latitude-band index
    pub fn from_parts(
        vertices: Vec<(Point, Vec<PolyRef>)>,
        polygons: Vec<(Vec<usize>, Vec<PolyRef>)>,
        band_index: bool,
    ) -> Result<Self, MeshError> {
        let vertex_count = vertices.len();
        let polygon_count = polygons.len();

        let mut built_vertices = Vec::with_capacity(vertex_count);
        for (id, (point, sectors)) in vertices.into_iter().enumerate() {
            if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lon) {
                return Err(MeshError::CoordOutOfRange {
                    vertex: id,
                    lat: point.lat,
                    lon: point.lon,
                });
            }
            for sector in &sectors {
                if let PolyRef::Poly(p) = sector {
                    if *p >= polygon_count {
                        return Err(MeshError::SectorOutOfRange {
                            vertex: id,
                            polygon: *p,
                        });
                    }
                }
            }
            let k = sectors.len();
            if k > 1 {
                for i in 0..k {
                    if sectors[i].is_obstacle() && sectors[(i + 1) % k].is_obstacle() {
                        return Err(MeshError::AdjacentObstacles { vertex: id });
                    }
                }
            }
            let obstacles = sectors.iter().filter(|s| s.is_obstacle()).count();
            built_vertices.push(Vertex {
                point,
                sectors,
                corner: obstacles >= 1,
                ambiguous: obstacles > 1,
            });
        }

        let mut built_polygons = Vec::with_capacity(polygon_count);
        for (id, (ring, neighbours)) in polygons.into_iter().enumerate() {
            if ring.len() < 3 {
                return Err(MeshError::TooFewVertices {
                    polygon: id,
                    count: ring.len(),
                });
            }
            if neighbours.len() != ring.len() {
                return Err(MeshError::RingMismatch {
                    polygon: id,
                    vertices: ring.len(),
                    neighbours: neighbours.len(),
                });
            }
            for v in &ring {
                if *v >= vertex_count {
                    return Err(MeshError::VertexOutOfRange {
                        polygon: id,
                        vertex: *v,
                    });
                }
            }
            for nb in &neighbours {
                if let PolyRef::Poly(p) = nb {
                    if *p >= polygon_count {
                        return Err(MeshError::NeighbourOutOfRange {
                            polygon: id,
                            neighbour: *p,
                        });
                    }
                }
            }

            let (min_lat, max_lat, min_lon, max_lon, wraps_lon) =
                lat_lon_extent(&built_vertices, &ring);
            let traversable = neighbours.iter().filter(|n| !n.is_obstacle()).count();
            built_polygons.push(Polygon {
                vertices: ring,
                neighbours,
                min_lat,
                max_lat,
                min_lon,
                max_lon,
                wraps_lon,
                is_polar: false,
                is_one_way: traversable <= 1,
            });
        }

        // Polar flags need the finished rings.
        let north = Point::new(90.0, 0.0);
        let south = Point::new(-90.0, 0.0);
        let polar: Vec<bool> = built_polygons
            .iter()
            .map(|p| {
                p.contains(&built_vertices, &north) == Containment::Inside
                    || p.contains(&built_vertices, &south) == Containment::Inside
            })
            .collect();
        for (poly, is_polar) in built_polygons.iter_mut().zip(polar) {
            poly.is_polar = is_polar;
        }

        let bands = if band_index {
            Some(BandIndex::build(&built_vertices, &built_polygons))
        } else {
            None
        };

        Ok(Self {
            vertices: built_vertices,
            polygons: built_polygons,
            bands,
        })
    }

    pub fn vertex_point(&self, id: usize) -> &Point {
        &self.vertices[id].point
    }

    /// Locate a point in the mesh.
    ///
    /// Tries the latitude-band candidates first when the index was built;
    /// any miss falls back to scanning every polygon, so correctness never
    /// depends on the index.
    pub fn locate(&self, p: &Point) -> PointLocation {
        if let Some(bands) = &self.bands {
            for &id in bands.candidates(p.lat) {
                if let Some(loc) = self.classify(id, p) {
                    return loc;
                }
            }
        }
        for id in 0..self.polygons.len() {
            if let Some(loc) = self.classify(id, p) {
                return loc;
            }
        }
        PointLocation::InObstacle
    }

    fn classify(&self, poly: usize, p: &Point) -> Option<PointLocation> {
        match self.polygons[poly].contains(&self.vertices, p) {
            Containment::Outside => None,
            Containment::Inside => Some(PointLocation::InPolygon(poly)),
            Containment::OnVertex(v) => {
                let vertex = &self.vertices[v];
                Some(if vertex.ambiguous {
                    PointLocation::OnAmbigCornerVertex(v)
                } else if vertex.corner {
                    PointLocation::OnUnambigCornerVertex(v)
                } else {
                    PointLocation::OnNonCornerVertex(v)
                })
            }
            Containment::OnEdge { neighbour, verts } => Some(match neighbour {
                PolyRef::Obstacle => PointLocation::OnMeshBorder { poly, verts },
                PolyRef::Poly(other) => PointLocation::OnEdge {
                    polys: (poly, other),
                    verts,
                },
            }),
        }
    }
}

/// Vertex-derived latitude/longitude extent of a ring, detecting
/// antimeridian wrap by a naive span over 180 degrees.
fn lat_lon_extent(vertices: &[Vertex], ring: &[usize]) -> (f64, f64, f64, f64, bool) {
    let mut min_lat = f64::INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut min_lon = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;
    for &v in ring {
        let p = &vertices[v].point;
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lon = min_lon.min(p.lon);
        max_lon = max_lon.max(p.lon);
    }
    if max_lon - min_lon > 180.0 {
        // Re-measure with longitudes shifted into [0, 360).
        let mut min_s = f64::INFINITY;
        let mut max_s = f64::NEG_INFINITY;
        for &v in ring {
            let mut lon = vertices[v].point.lon;
            if lon < 0.0 {
                lon += 360.0;
            }
            min_s = min_s.min(lon);
            max_s = max_s.max(lon);
        }
        let unshift = |l: f64| if l > 180.0 { l - 360.0 } else { l };
        (min_lat, max_lat, unshift(min_s), unshift(max_s), true)
    } else {
        (min_lat, max_lat, min_lon, max_lon, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The upper-front face of the octahedron plus its eastern neighbour,
    /// everything else obstacle.
    fn two_faces() -> Mesh {
        let np = Point::new(90.0, 0.0);
        let e0 = Point::new(0.0, 0.0);
        let e90 = Point::new(0.0, 90.0);
        let e180 = Point::new(0.0, 180.0);
        Mesh::from_parts(
            vec![
                (np, vec![PolyRef::Obstacle, PolyRef::Poly(0), PolyRef::Poly(1)]),
                (e0, vec![PolyRef::Poly(0), PolyRef::Obstacle]),
                (e90, vec![PolyRef::Obstacle, PolyRef::Poly(0), PolyRef::Poly(1)]),
                (e180, vec![PolyRef::Poly(1), PolyRef::Obstacle]),
            ],
            vec![
                (
                    vec![0, 1, 2],
                    vec![PolyRef::Obstacle, PolyRef::Obstacle, PolyRef::Poly(1)],
                ),
                (
                    vec![0, 2, 3],
                    vec![PolyRef::Poly(0), PolyRef::Obstacle, PolyRef::Obstacle],
                ),
            ],
            true,
        )
        .expect("valid mesh")
    }

    #[test]
    fn test_containment_inside_outside() {
        let mesh = two_faces();
        let face = &mesh.polygons[0];
        assert_eq!(
            face.contains(&mesh.vertices, &Point::new(30.0, 45.0)),
            Containment::Inside
        );
        assert_eq!(
            face.contains(&mesh.vertices, &Point::new(-30.0, 45.0)),
            Containment::Outside
        );
        assert_eq!(
            face.contains(&mesh.vertices, &Point::new(30.0, 135.0)),
            Containment::Outside
        );
    }

    #[test]
    fn test_containment_vertex_round_trip() {
        let mesh = two_faces();
        for poly in &mesh.polygons {
            for &v in &poly.vertices {
                let p = *mesh.vertex_point(v);
                assert_eq!(
                    poly.contains(&mesh.vertices, &p),
                    Containment::OnVertex(v),
                    "vertex {v} not reported by its own polygon"
                );
            }
        }
    }

    #[test]
    fn test_containment_on_edge() {
        let mesh = two_faces();
        // Midpoint of the shared edge between faces 0 and 1.
        let on_shared = Point::new(45.0, 90.0);
        match mesh.polygons[0].contains(&mesh.vertices, &on_shared) {
            Containment::OnEdge { neighbour, verts } => {
                assert_eq!(neighbour, PolyRef::Poly(1));
                assert_eq!(verts, (2, 0));
            }
            other => panic!("expected OnEdge, got {other:?}"),
        }
    }

    #[test]
    fn test_locate_variants() {
        let mesh = two_faces();
        assert_eq!(
            mesh.locate(&Point::new(30.0, 45.0)),
            PointLocation::InPolygon(0)
        );
        assert_eq!(
            mesh.locate(&Point::new(30.0, -120.0)),
            PointLocation::InObstacle
        );
        assert_eq!(
            mesh.locate(&Point::new(45.0, 90.0)),
            PointLocation::OnEdge {
                polys: (0, 1),
                verts: (2, 0)
            }
        );
        // Equator edge of face 0 borders obstacle.
        assert_eq!(
            mesh.locate(&Point::new(0.0, 45.0)),
            PointLocation::OnMeshBorder {
                poly: 0,
                verts: (1, 2)
            }
        );
        // North pole touches both faces and an obstacle sector.
        assert_eq!(
            mesh.locate(&Point::new(90.0, 0.0)),
            PointLocation::OnUnambigCornerVertex(0)
        );
    }

    #[test]
    fn test_location_polygons() {
        let mesh = two_faces();
        let loc = mesh.locate(&Point::new(90.0, 0.0));
        assert_eq!(loc.polygons(&mesh), vec![0, 1]);
        assert!(mesh
            .locate(&Point::new(-45.0, 0.0))
            .polygons(&mesh)
            .is_empty());
    }

    #[test]
    fn test_corner_flags() {
        let mesh = two_faces();
        assert!(mesh.vertices[0].corner);
        assert!(!mesh.vertices[0].ambiguous);
        assert!(mesh.vertices[1].corner);
    }

    #[test]
    fn test_one_way_flag() {
        let mesh = two_faces();
        assert!(mesh.polygons[0].is_one_way);
        assert!(mesh.polygons[1].is_one_way);
    }

    #[test]
    fn test_adjacent_obstacle_sectors_rejected() {
        let err = Mesh::from_parts(
            vec![
                (
                    Point::new(90.0, 0.0),
                    vec![PolyRef::Obstacle, PolyRef::Obstacle, PolyRef::Poly(0)],
                ),
                (Point::new(0.0, 0.0), vec![PolyRef::Poly(0)]),
                (Point::new(0.0, 90.0), vec![PolyRef::Poly(0)]),
            ],
            vec![(
                vec![0, 1, 2],
                vec![PolyRef::Obstacle, PolyRef::Obstacle, PolyRef::Obstacle],
            )],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, MeshError::AdjacentObstacles { vertex: 0 }));
    }

    #[test]
    fn test_wrapping_extent() {
        let mesh = Mesh::from_parts(
            vec![
                (Point::new(30.0, 170.0), vec![PolyRef::Poly(0)]),
                (Point::new(-30.0, 170.0), vec![PolyRef::Poly(0)]),
                (Point::new(-30.0, -170.0), vec![PolyRef::Poly(0)]),
                (Point::new(30.0, -170.0), vec![PolyRef::Poly(0)]),
            ],
            vec![(
                vec![0, 1, 2, 3],
                vec![
                    PolyRef::Obstacle,
                    PolyRef::Obstacle,
                    PolyRef::Obstacle,
                    PolyRef::Obstacle,
                ],
            )],
            true,
        )
        .expect("valid mesh");
        let poly = &mesh.polygons[0];
        assert!(poly.wraps_lon);
        assert_eq!(poly.min_lon, 170.0);
        assert_eq!(poly.max_lon, -170.0);
        // Band index or not, the wrapped polygon is found.
        assert_eq!(
            mesh.locate(&Point::new(0.0, 180.0)),
            PointLocation::InPolygon(0)
        );
        assert_eq!(
            mesh.locate(&Point::new(0.0, 175.0)),
            PointLocation::InPolygon(0)
        );
    }

    #[test]
    fn test_polar_polygon_flag_and_lookup() {
        // Square cap around the north pole.
        let mesh = Mesh::from_parts(
            vec![
                (Point::new(60.0, 0.0), vec![PolyRef::Poly(0)]),
                (Point::new(60.0, 90.0), vec![PolyRef::Poly(0)]),
                (Point::new(60.0, 180.0), vec![PolyRef::Poly(0)]),
                (Point::new(60.0, -90.0), vec![PolyRef::Poly(0)]),
            ],
            vec![(
                vec![0, 1, 2, 3],
                vec![
                    PolyRef::Obstacle,
                    PolyRef::Obstacle,
                    PolyRef::Obstacle,
                    PolyRef::Obstacle,
                ],
            )],
            true,
        )
        .expect("valid mesh");
        assert!(mesh.polygons[0].is_polar);
        // Above every vertex latitude; only the polar force-add finds it
        // without the linear fallback.
        assert_eq!(
            mesh.locate(&Point::new(85.0, 20.0)),
            PointLocation::InPolygon(0)
        );
    }
}
