//! The interval search engine.
//!
//! A* over search nodes of (root, observable interval, next polygon).
//! Popping a node projects the visibility cone from its root through the
//! interval across the next polygon, splitting the far boundary into an
//! observable range (root unchanged) and up to two non-observable pockets
//! reachable only by pivoting around a corner vertex.

use crate::geometry::{
    distance, intersection, is_bounded, orientation, CircleIntersection, Orientation, Point,
};
use crate::mesh::{Containment, Mesh, PolyRef};
use crate::queue::{OpenList, QueueEntry};
use crate::search_node::{SearchError, SearchNode};
use crate::EPSILON;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Outcome of one search.
///
/// An empty path means no path exists; that is a result, not an error.
#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    /// Start, turning points, goal. Empty when unreachable.
    pub path: Vec<Point>,
    /// Total great-circle length in degrees; 0 when unreachable.
    pub length_deg: f64,
    pub nodes_pushed: usize,
    pub nodes_popped: usize,
}

impl PathResult {
    pub fn found(&self) -> bool {
        !self.path.is_empty()
    }

    fn no_path(nodes_pushed: usize, nodes_popped: usize) -> Self {
        Self {
            path: Vec::new(),
            length_deg: 0.0,
            nodes_pushed,
            nodes_popped,
        }
    }
}

/// Run one search over a shared, immutable mesh.
pub fn shortest_path(mesh: &Mesh, start: Point, goal: Point) -> Result<PathResult, SearchError> {
    SearchInstance::new(mesh, start, goal).run()
}

/// A single-shot search. Owns its open list, history and node arena; the
/// mesh is only borrowed and never mutated.
pub struct SearchInstance<'m> {
    mesh: &'m Mesh,
    start: Point,
    goal: Point,
    end_polygons: Vec<usize>,
    nodes: Vec<SearchNode>,
    open: OpenList,
    /// Smallest g seen per quantised root; suppresses re-expansion of roots
    /// reached by strictly worse paths.
    history: HashMap<(i64, i64), f64>,
    nodes_pushed: usize,
    nodes_popped: usize,
}

impl<'m> SearchInstance<'m> {
    pub fn new(mesh: &'m Mesh, start: Point, goal: Point) -> Self {
        Self {
            mesh,
            start,
            goal,
            end_polygons: Vec::new(),
            nodes: Vec::new(),
            open: OpenList::new(),
            history: HashMap::new(),
            nodes_pushed: 0,
            nodes_popped: 0,
        }
    }

    /// Drive the search to completion.
    pub fn run(mut self) -> Result<PathResult, SearchError> {
        self.end_polygons = self.mesh.locate(&self.goal).polygons(self.mesh);
        if self.end_polygons.is_empty() {
            debug!("goal is unreachable (obstacle)");
            return Ok(PathResult::no_path(0, 0));
        }
        let start_polys = self.mesh.locate(&self.start).polygons(self.mesh);
        if start_polys.is_empty() {
            debug!("start is unreachable (obstacle)");
            return Ok(PathResult::no_path(0, 0));
        }
        if start_polys.iter().any(|p| self.end_polygons.contains(p)) {
            // Start and goal share a polygon: the chord is the path.
            return Ok(PathResult {
                length_deg: distance(&self.start, &self.goal),
                path: vec![self.start, self.goal],
                nodes_pushed: 0,
                nodes_popped: 0,
            });
        }

        self.seed(&start_polys)?;

        let mut final_node = None;
        while let Some(entry) = self.open.pop() {
            self.nodes_popped += 1;
            let next_polygon = self.nodes[entry.node].next_polygon;
            debug!(
                "pop node {} poly {} f {:.6} g {:.6}",
                entry.node, next_polygon, entry.f, entry.g
            );
            if self.end_polygons.contains(&next_polygon) {
                final_node = Some(self.build_terminal(entry.node));
                break;
            }
            for succ in self.successors(entry.node)? {
                let key = quantise(&succ.root);
                if let Some(&best) = self.history.get(&key) {
                    if best < succ.g {
                        continue;
                    }
                }
                self.history.insert(key, succ.g);
                self.push_node(succ);
            }
        }

        match final_node {
            Some(idx) => Ok(self.reconstruct(idx)),
            None => {
                debug!("open list exhausted; no path");
                Ok(PathResult::no_path(self.nodes_pushed, self.nodes_popped))
            }
        }
    }

    /// One node per edge of each start polygon that the start can see into.
    fn seed(&mut self, start_polys: &[usize]) -> Result<(), SearchError> {
        for &p_id in start_polys {
            let poly = &self.mesh.polygons[p_id];
            let n = poly.vertices.len();
            for i in 0..n {
                let Some(nb) = poly.neighbours[i].poly() else {
                    continue;
                };
                if self.is_dead_end(nb) {
                    continue;
                }
                let a_id = poly.vertices[i];
                let b_id = poly.vertices[(i + 1) % n];
                let a = *self.mesh.vertex_point(a_id);
                let b = *self.mesh.vertex_point(b_id);
                // Edges the start lies on give no visibility cone.
                if self.start.approx_eq(&a) || self.start.approx_eq(&b) {
                    continue;
                }
                if orientation(&a, &b, &self.start) == Orientation::Colinear
                    && is_bounded(&self.start, &a, &b)
                {
                    continue;
                }
                let node = SearchNode::new(
                    None,
                    self.start,
                    a,
                    b,
                    Some(a_id),
                    Some(b_id),
                    nb,
                    0.0,
                    &self.goal,
                )?;
                self.push_node(node);
            }
        }
        Ok(())
    }

    /// Project the popped node across its next polygon and split the far
    /// boundary into successor nodes.
    fn successors(&self, idx: usize) -> Result<Vec<SearchNode>, SearchError> {
        let node = self.nodes[idx].clone();
        let q_id = node.next_polygon;
        let q = &self.mesh.polygons[q_id];
        let n = q.vertices.len();
        let far = n - 1;

        if node.root.approx_eq(&node.right) && node.root.approx_eq(&node.left) {
            return Ok(Vec::new());
        }

        let entry = self.find_entry_edge(&node, q_id)?;
        let vid = |i: usize| q.vertices[i % n];
        let pt = |i: usize| *self.mesh.vertex_point(vid(i));

        // When the root sits on an interval endpoint, the grazing ray along
        // the entry edge is the limit of the visibility cone.
        let right_anchor = if node.root.approx_eq(&node.right) {
            node.left
        } else {
            node.root
        };
        let left_anchor = if node.root.approx_eq(&node.left) {
            node.right
        } else {
            node.root
        };

        // Right projection: walk the far boundary forward from the right
        // side until the right ray crosses it.
        let mut right_fix: Option<(isize, Point, Option<usize>)> = None;
        for k in 0..far {
            let e = entry + 1 + k;
            let a = pt(e);
            let b = pt(e + 1);
            let o_a = orientation(&right_anchor, &node.right, &a);
            let o_b = orientation(&right_anchor, &node.right, &b);
            if o_a == Orientation::Colinear && o_b == Orientation::Colinear {
                // The ray runs along this edge.
                right_fix = Some((k as isize, a, Some(vid(e))));
                break;
            }
            match o_b {
                Orientation::Clockwise => continue,
                Orientation::Colinear => {
                    right_fix = Some((k as isize + 1, b, Some(vid(e + 1))));
                    break;
                }
                Orientation::Anticlockwise => {
                    let x = self.ray_crossing(&right_anchor, &node.right, &a, &b, q_id, "right")?;
                    right_fix = Some(if x.approx_eq(&a) {
                        (k as isize, a, Some(vid(e)))
                    } else if x.approx_eq(&b) {
                        (k as isize + 1, b, Some(vid(e + 1)))
                    } else {
                        (k as isize, x, None)
                    });
                    break;
                }
            }
        }
        let (obs_start, new_right, new_right_vertex) =
            right_fix.ok_or(SearchError::ProjectionFailed {
                side: "right",
                polygon: q_id,
            })?;

        // Left projection: mirror image, walking backward from the left.
        let mut left_fix: Option<(isize, Point, Option<usize>)> = None;
        for k in (0..far).rev() {
            let e = entry + 1 + k;
            let a = pt(e);
            let b = pt(e + 1);
            let o_a = orientation(&left_anchor, &node.left, &a);
            let o_b = orientation(&left_anchor, &node.left, &b);
            if o_a == Orientation::Colinear && o_b == Orientation::Colinear {
                left_fix = Some((k as isize, b, Some(vid(e + 1))));
                break;
            }
            match o_a {
                Orientation::Anticlockwise => continue,
                Orientation::Colinear => {
                    left_fix = Some((k as isize - 1, a, Some(vid(e))));
                    break;
                }
                Orientation::Clockwise => {
                    let x = self.ray_crossing(&left_anchor, &node.left, &a, &b, q_id, "left")?;
                    left_fix = Some(if x.approx_eq(&b) {
                        (k as isize, b, Some(vid(e + 1)))
                    } else if x.approx_eq(&a) {
                        (k as isize - 1, a, Some(vid(e)))
                    } else {
                        (k as isize, x, None)
                    });
                    break;
                }
            }
        }
        let (obs_end, new_left, new_left_vertex) =
            left_fix.ok_or(SearchError::ProjectionFailed {
                side: "left",
                polygon: q_id,
            })?;

        let mut out = Vec::new();

        // Observable range: the root keeps seeing these edges directly, so
        // the root and g carry over unchanged.
        let mut k = obs_start.max(0);
        while k <= obs_end && k < far as isize {
            let e = entry + 1 + k as usize;
            if let Some(nb) = q.neighbours[e % n].poly() {
                if !self.is_dead_end(nb) {
                    let (r_pt, r_vx) = if k == obs_start {
                        (new_right, new_right_vertex)
                    } else {
                        (pt(e), Some(vid(e)))
                    };
                    let (l_pt, l_vx) = if k == obs_end {
                        (new_left, new_left_vertex)
                    } else {
                        (pt(e + 1), Some(vid(e + 1)))
                    };
                    out.push(SearchNode::new(
                        Some(idx),
                        node.root,
                        r_pt,
                        l_pt,
                        r_vx,
                        l_vx,
                        nb,
                        node.g,
                        &self.goal,
                    )?);
                }
            }
            k += 1;
        }

        // Right pocket: edges cut off behind the right ray, reachable only
        // by turning at the right endpoint when it is a corner vertex.
        if let Some(rv) = node.right_vertex {
            if self.mesh.vertices[rv].corner {
                let g2 = node.g + distance(&node.root, &node.right);
                let full_end = obs_start.clamp(0, far as isize) as usize;
                for k in 0..full_end {
                    let e = entry + 1 + k;
                    if let Some(nb) = q.neighbours[e % n].poly() {
                        if !self.is_dead_end(nb) {
                            out.push(SearchNode::new(
                                Some(idx),
                                node.right,
                                pt(e),
                                pt(e + 1),
                                Some(vid(e)),
                                Some(vid(e + 1)),
                                nb,
                                g2,
                                &self.goal,
                            )?);
                        }
                    }
                }
                if (0..far as isize).contains(&obs_start) {
                    let e = entry + 1 + obs_start as usize;
                    let a = pt(e);
                    if !new_right.approx_eq(&a) {
                        if let Some(nb) = q.neighbours[e % n].poly() {
                            if !self.is_dead_end(nb) {
                                out.push(SearchNode::new(
                                    Some(idx),
                                    node.right,
                                    a,
                                    new_right,
                                    Some(vid(e)),
                                    new_right_vertex,
                                    nb,
                                    g2,
                                    &self.goal,
                                )?);
                            }
                        }
                    }
                }
            }
        }

        // Left pocket, symmetric around the left endpoint.
        if let Some(lv) = node.left_vertex {
            if self.mesh.vertices[lv].corner {
                let g2 = node.g + distance(&node.root, &node.left);
                if (0..far as isize).contains(&obs_end) {
                    let e = entry + 1 + obs_end as usize;
                    let b = pt(e + 1);
                    if !new_left.approx_eq(&b) {
                        if let Some(nb) = q.neighbours[e % n].poly() {
                            if !self.is_dead_end(nb) {
                                out.push(SearchNode::new(
                                    Some(idx),
                                    node.left,
                                    new_left,
                                    b,
                                    new_left_vertex,
                                    Some(vid(e + 1)),
                                    nb,
                                    g2,
                                    &self.goal,
                                )?);
                            }
                        }
                    }
                }
                let full_start = (obs_end + 1).clamp(0, far as isize) as usize;
                for k in full_start..far {
                    let e = entry + 1 + k;
                    if let Some(nb) = q.neighbours[e % n].poly() {
                        if !self.is_dead_end(nb) {
                            out.push(SearchNode::new(
                                Some(idx),
                                node.left,
                                pt(e),
                                pt(e + 1),
                                Some(vid(e)),
                                Some(vid(e + 1)),
                                nb,
                                g2,
                                &self.goal,
                            )?);
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Local index of the edge of `q_id` the node's interval lies on.
    ///
    /// A shared edge appears reversed in the polygon being entered, so when
    /// both endpoints are mesh vertices the left vertex leads the right.
    fn find_entry_edge(&self, node: &SearchNode, q_id: usize) -> Result<usize, SearchError> {
        let q = &self.mesh.polygons[q_id];
        let n = q.vertices.len();
        if let (Some(rv), Some(lv)) = (node.right_vertex, node.left_vertex) {
            for j in 0..n {
                if q.vertices[j] == lv && q.vertices[(j + 1) % n] == rv {
                    return Ok(j);
                }
            }
        }
        let parent_polygon = node.parent.map(|p| self.nodes[p].next_polygon);
        let mut fallback = None;
        for j in 0..n {
            let a = self.mesh.vertex_point(q.vertices[j]);
            let b = self.mesh.vertex_point(q.vertices[(j + 1) % n]);
            let on_edge = |p: &Point| {
                orientation(a, b, p) == Orientation::Colinear && is_bounded(p, a, b)
            };
            if on_edge(&node.right) && on_edge(&node.left) {
                match parent_polygon {
                    Some(pp) if q.neighbours[j] == PolyRef::Poly(pp) => return Ok(j),
                    None => return Ok(j),
                    _ => {
                        if fallback.is_none() {
                            fallback = Some(j);
                        }
                    }
                }
            }
        }
        fallback.ok_or(SearchError::EntryEdgeNotFound { polygon: q_id })
    }

    /// The crossing of the ray's great circle with one edge, taken on the
    /// edge arc, falling back to whichever antipodal candidate is not
    /// outside the polygon.
    fn ray_crossing(
        &self,
        anchor: &Point,
        through: &Point,
        a: &Point,
        b: &Point,
        q_id: usize,
        side: &'static str,
    ) -> Result<Point, SearchError> {
        match intersection(anchor, through, a, b) {
            CircleIntersection::Coincident => Err(SearchError::NoRayCrossing {
                side,
                polygon: q_id,
            }),
            CircleIntersection::Points(x, y) => {
                if is_bounded(&x, a, b) {
                    Ok(x)
                } else if is_bounded(&y, a, b) {
                    Ok(y)
                } else {
                    let q = &self.mesh.polygons[q_id];
                    if q.contains(&self.mesh.vertices, &x) != Containment::Outside {
                        Ok(x)
                    } else if q.contains(&self.mesh.vertices, &y) != Containment::Outside {
                        Ok(y)
                    } else {
                        Err(SearchError::NoRayCrossing {
                            side,
                            polygon: q_id,
                        })
                    }
                }
            }
        }
    }

    /// Materialise the final node once a popped node's polygon holds the
    /// goal, checking that the goal really is visible through the interval
    /// and turning at the blocking endpoint when it is not.
    fn build_terminal(&mut self, idx: usize) -> usize {
        let node = self.nodes[idx].clone();
        let (root, g) =
            if orientation(&node.root, &node.right, &self.goal) != Orientation::Anticlockwise {
                (node.right, node.g + distance(&node.root, &node.right))
            } else if orientation(&node.root, &node.left, &self.goal) != Orientation::Clockwise {
                (node.left, node.g + distance(&node.root, &node.left))
            } else {
                (node.root, node.g)
            };
        let h = distance(&root, &self.goal);
        self.nodes.push(SearchNode {
            parent: Some(idx),
            root,
            right: self.goal,
            left: self.goal,
            right_vertex: None,
            left_vertex: None,
            next_polygon: node.next_polygon,
            g,
            h,
        });
        self.nodes.len() - 1
    }

    /// Unwind parent links, emitting each root where it changes.
    fn reconstruct(&self, final_idx: usize) -> PathResult {
        let mut path = vec![self.goal];
        let mut cur = final_idx;
        while let Some(parent) = self.nodes[cur].parent {
            if !self.nodes[cur].root.approx_eq(&self.nodes[parent].root) {
                path.push(self.nodes[cur].root);
            }
            cur = parent;
        }
        path.push(self.start);
        path.reverse();
        PathResult {
            path,
            length_deg: self.nodes[final_idx].f(),
            nodes_pushed: self.nodes_pushed,
            nodes_popped: self.nodes_popped,
        }
    }

    fn push_node(&mut self, node: SearchNode) {
        let entry = QueueEntry {
            node: self.nodes.len(),
            f: node.f(),
            g: node.g,
        };
        debug!(
            "push node {} poly {} f {:.6} g {:.6}",
            entry.node, node.next_polygon, entry.f, entry.g
        );
        self.nodes.push(node);
        self.open.push(entry);
        self.nodes_pushed += 1;
    }

    /// One-way polygons are dead ends unless they hold the goal.
    fn is_dead_end(&self, poly: usize) -> bool {
        self.mesh.polygons[poly].is_one_way && !self.end_polygons.contains(&poly)
    }
}

fn quantise(p: &Point) -> (i64, i64) {
    (
        (p.lat / EPSILON).round() as i64,
        (p.lon / EPSILON).round() as i64,
    )
}
