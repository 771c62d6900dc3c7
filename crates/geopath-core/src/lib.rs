//! GeoPath core - any-angle shortest paths on a spherical polygon mesh
//!
//! This crate contains the spherical geometry kernel, the mesh data model
//! and the interval search engine, with NO I/O or networking dependencies
//! beyond reading mesh files. A mesh is immutable once built and may be
//! shared read-only between searches; each search owns all of its state.

pub mod geometry;
pub mod mesh;
pub mod parser;
pub mod queue;
pub mod search_node;
pub mod search;

/// Process-wide geometric tolerance, in degrees of arc.
///
/// Every comparison against zero in the kernel uses this band, and the
/// search history quantises root coordinates to the same resolution.
pub const EPSILON: f64 = 1e-6;

pub use geometry::{distance, intersection, is_bounded, orientation, reflect};
pub use geometry::{CircleIntersection, Orientation, Point, Vec3};
pub use mesh::{Containment, Mesh, MeshError, PointLocation, PolyRef, Polygon, Vertex};
pub use parser::{load_mesh, parse_mesh};
pub use search::{shortest_path, PathResult, SearchInstance};
pub use search_node::{SearchError, SearchNode};
