use geo::Coord;
use nalgebra::SMatrix;

use crate::error::GeometryError;
use crate::graph::{DirectedEdgeId, RoadGraph};
use crate::kalman::{KalmanState, LongitudinalState};

pub type Matrix2x4 = SMatrix<f64, 2, 4>;
pub type Matrix4 = SMatrix<f64, 4, 4>;
pub type Matrix2 = SMatrix<f64, 2, 2>;

/// The maximum along-segment speed a matched state may carry, in the units
/// of the trajectory frame; bounds out implausible motion during projection.
const MAX_SEGMENT_SPEED: f64 = 50.0;

/// A straight piece of one directed edge. `project`/`advance` are the only
/// two operations a search node needs; everything else here is geometry
/// precomputed once when the segment is built.
#[derive(Debug)]
pub struct Segment {
    origin: Coord<f64>,
    direction: Coord<f64>,
    normal: Coord<f64>,
    length: f64,
    half_width: f64,
    /// cumulative along-edge distance from the edge's origin to this
    /// segment's start
    pub distance: f64,
    d: Matrix2x4,
    f_s: Matrix2,
    q_s: Matrix2,
}

impl Segment {
    /// `offset` is accepted for interface symmetry with the Link/edge
    /// model but is always zero: the original implementation never varies
    /// it across segments of a link.
    pub fn new(
        origin: Coord<f64>,
        destination: Coord<f64>,
        offset: f64,
        distance: f64,
        f: &Matrix4,
        q: &Matrix4,
        width: f64,
    ) -> Segment {
        let dx = destination.x - origin.x;
        let dy = destination.y - origin.y;
        let length = (dx * dx + dy * dy).sqrt();
        let (direction, normal) = if length > 0.0 {
            let ux = dx / length;
            let uy = dy / length;
            (Coord { x: ux, y: uy }, Coord { x: -uy, y: ux })
        } else {
            (Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 })
        };
        let half_width = (width / (2.33 * 2.0)).powi(2);
        let d = projection_matrix(direction);
        let f_s = d * f * d.transpose();
        let q_s = d * q * d.transpose();
        let _ = offset;
        Segment {
            origin,
            direction,
            normal,
            length,
            half_width,
            distance,
            d,
            f_s,
            q_s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length <= 0.0
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn origin(&self) -> Coord<f64> {
        self.origin
    }

    pub fn destination(&self) -> Coord<f64> {
        Coord {
            x: self.origin.x + self.direction.x * self.length,
            y: self.origin.y + self.direction.y * self.length,
        }
    }

    fn normal_distance(&self) -> f64 {
        self.normal.x * self.origin.x + self.normal.y * self.origin.y
    }

    fn direction_distance(&self) -> f64 {
        self.direction.x * self.origin.x + self.direction.y * self.origin.y
    }

    /// Conditions `state` on "lies on this segment": snaps it onto the
    /// segment's line via a normal-direction measurement, then constrains
    /// the along-edge position and speed to the segment's bounds. Returns
    /// `(cost, constrained_state, projected_state)`; `constrained_state` is
    /// `None` on a degenerate segment or a non-finite intermediate result,
    /// in which case `cost` is `+inf`.
    pub fn project(&self, mut state: KalmanState) -> (f64, Option<KalmanState>, Option<LongitudinalState>) {
        if self.is_empty() {
            return (f64::INFINITY, None, None);
        }
        let h = Matrix2x4::new(
            self.normal.x,
            self.normal.y,
            0.0,
            0.0,
            0.0,
            0.0,
            self.normal.x,
            self.normal.y,
        );
        let r = Matrix2::new(self.half_width, 0.0, 0.0, 1.0);
        let y = nalgebra::SVector::<f64, 2>::new(self.normal_distance(), 0.0);
        let measurement_cost = match state.measurement_update(y, h, r) {
            Ok(c) => c,
            Err(_) => return (f64::INFINITY, None, None),
        };

        let dd = self.direction_distance();
        let a = nalgebra::SVector::<f64, 2>::new(dd, 0.0);
        let b = nalgebra::SVector::<f64, 2>::new(dd + self.length, MAX_SEGMENT_SPEED);
        let constraint_cost = match state.ineq_constraint_update(self.d, a, b) {
            Ok(c) => c,
            Err(_) => return (f64::INFINITY, None, None),
        };
        let cost = measurement_cost + constraint_cost;
        if !cost.is_finite() {
            return (f64::INFINITY, None, None);
        }

        let mut projected = state.transform(self.d);
        projected.x[0] -= dd;
        (cost, Some(state), Some(projected))
    }

    /// Time-updates the along-segment longitudinal state by this
    /// segment's motion matrices.
    pub fn advance(&self, mut projected_state: LongitudinalState) -> LongitudinalState {
        projected_state.time_update(&self.f_s, &self.q_s);
        projected_state
    }
}

fn projection_matrix(direction: Coord<f64>) -> Matrix2x4 {
    Matrix2x4::new(
        direction.x, direction.y, 0.0, 0.0, 0.0, 0.0, direction.x, direction.y,
    )
}

/// Ordered list of segments covering one directed edge.
#[derive(Debug)]
pub struct Link {
    segments: Vec<Segment>,
    pub length: f64,
}

impl Link {
    pub fn build(points: &[Coord<f64>], f: &Matrix4, q: &Matrix4, width: f64) -> Result<Link, GeometryError> {
        if points.len() < 2 {
            return Err(GeometryError::EmptyEdge);
        }
        let mut segments = Vec::with_capacity(points.len() - 1);
        let mut distance = 0.0;
        for pair in points.windows(2) {
            let segment = Segment::new(pair[0], pair[1], 0.0, distance, f, q, width);
            distance += segment.length();
            segments.push(segment);
        }
        let length = distance;
        Ok(Link { segments, length })
    }

    pub fn segment(&self, offset: usize) -> Option<&Segment> {
        self.segments.get(offset)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

/// Builds and caches one [`Link`] per directed edge requested; a directed
/// edge and its reverse get distinct links because `D` depends on
/// orientation even though they share the same underlying polyline.
pub struct LinkManager<'g, G: RoadGraph> {
    graph: &'g G,
    f: Matrix4,
    q: Matrix4,
    width: f64,
    links: std::cell::RefCell<std::collections::HashMap<DirectedEdgeId, std::rc::Rc<Link>>>,
}

impl<'g, G: RoadGraph> LinkManager<'g, G> {
    pub fn new(graph: &'g G, f: Matrix4, q: Matrix4, width: f64) -> Self {
        LinkManager {
            graph,
            f,
            q,
            width,
            links: std::cell::RefCell::new(std::collections::HashMap::new()),
        }
    }

    pub fn at(&self, edge: DirectedEdgeId) -> Result<std::rc::Rc<Link>, GeometryError> {
        if let Some(link) = self.links.borrow().get(&edge) {
            return Ok(link.clone());
        }
        let points = self.graph.edge_geometry(edge);
        let link = std::rc::Rc::new(Link::build(&points, &self.f, &self.q, self.width)?);
        self.links.borrow_mut().insert(edge, link.clone());
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RoadGraphBuilder, VertexId};
    use nalgebra::{SMatrix, SVector};

    fn identity_motion() -> (Matrix4, Matrix4) {
        (Matrix4::identity(), Matrix4::identity() * 0.01)
    }

    #[test]
    fn straight_segment_projects_on_axis_point() {
        let (f, q) = identity_motion();
        let segment = Segment::new(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 100.0, y: 0.0 },
            0.0,
            0.0,
            &f,
            &q,
            2.0,
        );
        let state = KalmanState::new(
            SVector::<f64, 4>::new(10.0, 0.0, 0.0, 0.0),
            SMatrix::<f64, 4, 4>::identity(),
        );
        let (cost, constrained, projected) = segment.project(state);
        assert!(cost.is_finite());
        assert!(constrained.is_some());
        let projected = projected.unwrap();
        assert!((projected.x[0] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn off_segment_point_has_high_cost_but_finite() {
        let (f, q) = identity_motion();
        let segment = Segment::new(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 100.0, y: 0.0 },
            0.0,
            0.0,
            &f,
            &q,
            2.0,
        );
        let near = KalmanState::new(
            SVector::<f64, 4>::new(10.0, 0.5, 0.0, 0.0),
            SMatrix::<f64, 4, 4>::identity(),
        );
        let far = KalmanState::new(
            SVector::<f64, 4>::new(10.0, 50.0, 0.0, 0.0),
            SMatrix::<f64, 4, 4>::identity(),
        );
        let (near_cost, _, _) = segment.project(near);
        let (far_cost, _, _) = segment.project(far);
        assert!(far_cost > near_cost);
    }

    #[test]
    fn degenerate_segment_is_empty_and_infinite_cost() {
        let (f, q) = identity_motion();
        let segment = Segment::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }, 0.0, 0.0, &f, &q, 2.0);
        assert!(segment.is_empty());
        let state = KalmanState::new(SVector::<f64, 4>::zeros(), SMatrix::<f64, 4, 4>::identity());
        let (cost, constrained, projected) = segment.project(state);
        assert_eq!(cost, f64::INFINITY);
        assert!(constrained.is_none());
        assert!(projected.is_none());
    }

    #[test]
    fn link_manager_caches_by_direction() {
        let mut builder = RoadGraphBuilder::new();
        let (u, v) = (VertexId(0), VertexId(1));
        builder.add_edge(u, v, vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }]);
        let graph = builder.build();
        let (f, q) = identity_motion();
        let manager = LinkManager::new(&graph, f, q, 2.0);
        let forward = DirectedEdgeId {
            edge_id: crate::graph::EdgeId(0),
            from: u,
            to: v,
        };
        let reverse = forward.reverse();
        let link_fwd = manager.at(forward).unwrap();
        let link_rev = manager.at(reverse).unwrap();
        assert_eq!(link_fwd.length, link_rev.length);
        assert!((link_fwd.segment(0).unwrap().origin().x - 0.0).abs() < 1e-9);
        assert!((link_rev.segment(0).unwrap().origin().x - 100.0).abs() < 1e-9);
    }
}
