//! Search nodes and the admissible interval heuristic.

use crate::geometry::{distance, orientation, reflect, Orientation, Point};
use thiserror::Error;

/// A violated contract inside the kernel or the search.
///
/// These are programming errors: the search aborts with the message rather
/// than trying to recover.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search node root ({lat}, {lon}) lies clockwise of its interval")]
    RootClockwise { lat: f64, lon: f64 },
    #[error("interval not found on any edge of polygon {polygon}")]
    EntryEdgeNotFound { polygon: usize },
    #[error("{side} ray never crossed the far boundary of polygon {polygon}")]
    ProjectionFailed {
        side: &'static str,
        polygon: usize,
    },
    #[error("no intersection of the {side} ray with an edge of polygon {polygon}")]
    NoRayCrossing {
        side: &'static str,
        polygon: usize,
    },
}

/// One immutable state of the interval search.
///
/// `root` is the last turning point; `(right, left)` delimit the portion of
/// an edge of `next_polygon` observable from the root, with the root never
/// clockwise of the directed arc right -> left. `right_vertex` and
/// `left_vertex` name the mesh vertices the endpoints coincide with, when
/// they do. Children reference their parent by arena index; parents never
/// point at children.
#[derive(Debug, Clone)]
pub struct SearchNode {
    pub parent: Option<usize>,
    pub root: Point,
    pub right: Point,
    pub left: Point,
    pub right_vertex: Option<usize>,
    pub left_vertex: Option<usize>,
    pub next_polygon: usize,
    /// Great-circle distance from the start to the root, in degrees.
    pub g: f64,
    /// Admissible estimate from the interval to the goal, in degrees.
    pub h: f64,
}

impl SearchNode {
    /// Construct a node, computing h and enforcing the root-side contract.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        parent: Option<usize>,
        root: Point,
        right: Point,
        left: Point,
        right_vertex: Option<usize>,
        left_vertex: Option<usize>,
        next_polygon: usize,
        g: f64,
        goal: &Point,
    ) -> Result<Self, SearchError> {
        if orientation(&right, &left, &root) == Orientation::Clockwise {
            return Err(SearchError::RootClockwise {
                lat: root.lat,
                lon: root.lon,
            });
        }
        let h = interval_heuristic(&root, &right, &left, goal);
        Ok(Self {
            parent,
            root,
            right,
            left,
            right_vertex,
            left_vertex,
            next_polygon,
            g,
            h,
        })
    }

    pub fn f(&self) -> f64 {
        self.g + self.h
    }
}

/// Lower bound on the distance from `root` to `goal` for a path forced
/// through the interval (right, left).
///
/// When the goal sits on the root's side of the interval it is first folded
/// across the interval's great circle; the geodesic to the folded goal then
/// either passes through the interval directly or is pinned at whichever
/// endpoint it would have to clear.
pub fn interval_heuristic(root: &Point, right: &Point, left: &Point, goal: &Point) -> f64 {
    if root.approx_eq(right) || root.approx_eq(left) {
        return distance(root, goal);
    }
    let target = if orientation(goal, right, left) == Orientation::Anticlockwise {
        reflect(goal, right, left)
    } else {
        *goal
    };
    if orientation(root, right, &target) == Orientation::Clockwise {
        distance(root, right) + distance(right, &target)
    } else if orientation(root, left, &target) == Orientation::Anticlockwise {
        distance(root, left) + distance(left, &target)
    } else {
        distance(root, &target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    // Shared fixture: interval on the equator from (0,0) to (0,90), root
    // north of it at (10, 45).
    fn fixture() -> (Point, Point, Point) {
        (
            Point::new(10.0, 45.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 90.0),
        )
    }

    #[test]
    fn test_heuristic_direct_visibility() {
        let (root, right, left) = fixture();
        let goal = Point::new(-10.0, 45.0);
        let h = interval_heuristic(&root, &right, &left, &goal);
        assert_close(h, 20.0, 1e-9);
    }

    #[test]
    fn test_heuristic_reflects_goal_on_root_side() {
        let (root, right, left) = fixture();
        // Goal north of the interval like the root; folded to (-30, 45).
        let goal = Point::new(30.0, 45.0);
        let h = interval_heuristic(&root, &right, &left, &goal);
        assert_close(h, 40.0, 1e-9);
    }

    #[test]
    fn test_heuristic_blocked_at_right() {
        let (root, right, left) = fixture();
        let goal = Point::new(-5.0, -60.0);
        let h = interval_heuristic(&root, &right, &left, &goal);
        let expected = distance(&root, &right) + distance(&right, &goal);
        assert_close(h, expected, 1e-9);
        assert!(h >= distance(&root, &goal));
    }

    #[test]
    fn test_heuristic_blocked_at_left() {
        let (root, right, left) = fixture();
        let goal = Point::new(-5.0, 150.0);
        let h = interval_heuristic(&root, &right, &left, &goal);
        let expected = distance(&root, &left) + distance(&left, &goal);
        assert_close(h, expected, 1e-9);
        assert!(h >= distance(&root, &goal));
    }

    #[test]
    fn test_heuristic_root_at_endpoint() {
        let (_, right, left) = fixture();
        let goal = Point::new(-10.0, 45.0);
        let h = interval_heuristic(&right, &right, &left, &goal);
        assert_close(h, distance(&right, &goal), 1e-12);
    }

    #[test]
    fn test_node_rejects_clockwise_root() {
        let right = Point::new(0.0, 0.0);
        let left = Point::new(0.0, 90.0);
        let root = Point::new(-10.0, 45.0);
        let goal = Point::new(20.0, 45.0);
        let err = SearchNode::new(None, root, right, left, None, None, 0, 0.0, &goal);
        assert!(matches!(err, Err(SearchError::RootClockwise { .. })));
    }

    #[test]
    fn test_node_f_is_g_plus_h() {
        let (root, right, left) = fixture();
        let goal = Point::new(-10.0, 45.0);
        let node =
            SearchNode::new(None, root, right, left, None, None, 0, 7.5, &goal).unwrap();
        assert_close(node.f(), 7.5 + node.h, 1e-12);
    }
}
