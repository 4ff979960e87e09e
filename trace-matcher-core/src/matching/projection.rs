use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use geo::Rect;
use indexmap::IndexMap;

use crate::graph::{DirectedEdgeId, RoadGraph};
use crate::kalman::{KalmanState, LongitudinalState};

use super::segment::LinkManager;

/// How many bounding-box quantiles wide the search for continuation
/// points is, once a trajectory state already has a standing projection.
const SEARCH_QUANTILE: f64 = 25.0;
/// Wider quantile the initial node uses so the start set is never empty.
pub const INITIAL_QUANTILE: f64 = 50.0;
/// Cap on how many of the lowest-cost candidate projections are kept per
/// trajectory state.
const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectionKey {
    pub state_index: usize,
    pub edge: DirectedEdgeId,
    pub offset: usize,
}

#[derive(Clone)]
pub struct Projection {
    pub cost: f64,
    pub constrained_state: Rc<KalmanState>,
    pub projected_state: Rc<LongitudinalState>,
}

/// Lazily memoizes, per trajectory state, which `(edge, segment offset)`
/// pairs are plausible continuations and what projecting onto each costs.
/// Shares one [`LinkManager`] so segment geometry is only built once per
/// directed edge regardless of how many states probe it. Keyed by
/// `IndexMap` rather than `HashMap` so iteration order follows insertion
/// (cost-ascending) order instead of the hasher's per-run seed --
/// successors pushed from this map must come out the same way on every
/// run for the search to be deterministic.
type CandidatesByState = HashMap<usize, Rc<IndexMap<DirectedEdgeId, Vec<usize>>>>;
type SearchCache = HashMap<(usize, DirectedEdgeId), Rc<Vec<usize>>>;

pub struct ProjectionManager<'g, G: RoadGraph> {
    graph: &'g G,
    links: LinkManager<'g, G>,
    states: Vec<KalmanState>,
    ellipse_quantile: f64,
    projections: RefCell<HashMap<ProjectionKey, Projection>>,
    candidates_by_state: RefCell<CandidatesByState>,
    search_cache: RefCell<SearchCache>,
}

impl<'g, G: RoadGraph> ProjectionManager<'g, G> {
    pub fn new(graph: &'g G, links: LinkManager<'g, G>, states: Vec<KalmanState>) -> Self {
        ProjectionManager {
            graph,
            links,
            states,
            ellipse_quantile: SEARCH_QUANTILE,
            projections: RefCell::new(HashMap::new()),
            candidates_by_state: RefCell::new(HashMap::new()),
            search_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, index: usize) -> &KalmanState {
        &self.states[index]
    }

    fn ellipse_bounds(&self, index: usize, quantile: f64) -> Rect<f64> {
        let state = &self.states[index];
        let p = state.p;
        let sx = (p[(0, 0)].max(0.0)).sqrt() * quantile;
        let sy = (p[(1, 1)].max(0.0)).sqrt() * quantile;
        let x = state.x[0];
        let y = state.x[1];
        Rect::new(
            geo::Coord { x: x - sx, y: y - sy },
            geo::Coord { x: x + sx, y: y + sy },
        )
    }

    /// Returns the `edge -> [segment offsets]` map of admissible
    /// candidates for state `index`, computing and caching it on first
    /// request. `quantile` only matters the first time a given state is
    /// requested; later calls return the cached set.
    pub fn project_state(
        &self,
        index: usize,
        quantile: f64,
    ) -> Rc<IndexMap<DirectedEdgeId, Vec<usize>>> {
        if let Some(cached) = self.candidates_by_state.borrow().get(&index) {
            return cached.clone();
        }
        let bounds = self.ellipse_bounds(index, quantile);
        let mut scored: Vec<(DirectedEdgeId, usize, f64, KalmanState, LongitudinalState)> = Vec::new();
        for edge in self.graph.search_edges(bounds) {
            let link = match self.links.at(edge) {
                Ok(link) => link,
                Err(_) => continue,
            };
            for offset in 0..link.segment_count() {
                let segment = link.segment(offset).unwrap();
                let (cost, constrained, projected) = segment.project(self.states[index].clone());
                if let (Some(constrained), Some(projected)) = (constrained, projected) {
                    if cost.is_finite() {
                        scored.push((edge, offset, cost, constrained, projected));
                    }
                }
            }
        }
        scored.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(MAX_CANDIDATES);

        let mut by_edge: IndexMap<DirectedEdgeId, Vec<usize>> = IndexMap::new();
        for (edge, offset, cost, constrained, projected) in scored {
            by_edge.entry(edge).or_default().push(offset);
            self.projections.borrow_mut().insert(
                ProjectionKey {
                    state_index: index,
                    edge,
                    offset,
                },
                Projection {
                    cost,
                    constrained_state: Rc::new(constrained),
                    projected_state: Rc::new(projected),
                },
            );
        }
        for offsets in by_edge.values_mut() {
            offsets.sort_unstable();
        }
        let result = Rc::new(by_edge);
        self.candidates_by_state.borrow_mut().insert(index, result.clone());
        result
    }

    /// Segment offsets on `edge` whose polyline bounding box intersects the
    /// state-`index` ellipse at the standing search quantile; used by
    /// Linked/Forwarding successors to find continuations without
    /// recomputing full projection costs.
    pub fn search_edge(&self, index: usize, edge: DirectedEdgeId) -> Rc<Vec<usize>> {
        if let Some(cached) = self.search_cache.borrow().get(&(index, edge)) {
            return cached.clone();
        }
        let bounds = self.ellipse_bounds(index, self.ellipse_quantile);
        let link = match self.links.at(edge) {
            Ok(link) => link,
            Err(_) => {
                let empty = Rc::new(Vec::new());
                self.search_cache.borrow_mut().insert((index, edge), empty.clone());
                return empty;
            }
        };
        let mut offsets = Vec::new();
        for offset in 0..link.segment_count() {
            let segment = link.segment(offset).unwrap();
            if segment_bbox_intersects(segment, &bounds) {
                offsets.push(offset);
            }
        }
        let result = Rc::new(offsets);
        self.search_cache.borrow_mut().insert((index, edge), result.clone());
        result
    }

    /// Returns the cached projection at `(index, edge, offset)`, computing
    /// it first if this exact key has not been requested before.
    pub fn at(&self, index: usize, edge: DirectedEdgeId, offset: usize) -> Option<Projection> {
        let key = ProjectionKey {
            state_index: index,
            edge,
            offset,
        };
        if let Some(projection) = self.projections.borrow().get(&key) {
            return Some(projection.clone());
        }
        let link = self.links.at(edge).ok()?;
        let segment = link.segment(offset)?;
        let (cost, constrained, projected) = segment.project(self.states[index].clone());
        let (constrained, projected) = (constrained?, projected?);
        if !cost.is_finite() {
            return None;
        }
        let projection = Projection {
            cost,
            constrained_state: Rc::new(constrained),
            projected_state: Rc::new(projected),
        };
        self.projections.borrow_mut().insert(key, projection.clone());
        Some(projection)
    }
}

fn segment_bbox_intersects(segment: &super::segment::Segment, bounds: &Rect<f64>) -> bool {
    let a = segment.origin();
    let b = segment.destination();
    let (min_x, max_x) = (a.x.min(b.x), a.x.max(b.x));
    let (min_y, max_y) = (a.y.min(b.y), a.y.max(b.y));
    min_x <= bounds.max().x && max_x >= bounds.min().x && min_y <= bounds.max().y && max_y >= bounds.min().y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RoadGraphBuilder, VertexId};
    use nalgebra::{SMatrix, SVector};

    fn identity_motion() -> (SMatrix<f64, 4, 4>, SMatrix<f64, 4, 4>) {
        (SMatrix::identity(), SMatrix::<f64, 4, 4>::identity() * 0.01)
    }

    fn straight_graph() -> super::super::super::graph::InMemoryRoadGraph {
        let mut builder = RoadGraphBuilder::new();
        builder.add_edge(
            VertexId(0),
            VertexId(1),
            vec![geo::Coord { x: 0.0, y: 0.0 }, geo::Coord { x: 100.0, y: 0.0 }],
        );
        builder.build()
    }

    #[test]
    fn project_state_finds_nearby_edge_in_both_directions() {
        let graph = straight_graph();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let state = KalmanState::new(
            SVector::<f64, 4>::new(10.0, 0.5, 0.0, 0.0),
            SMatrix::<f64, 4, 4>::identity(),
        );
        let manager = ProjectionManager::new(&graph, links, vec![state]);
        let candidates = manager.project_state(0, INITIAL_QUANTILE);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn at_returns_same_projection_as_cached_by_project_state() {
        let graph = straight_graph();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let state = KalmanState::new(
            SVector::<f64, 4>::new(10.0, 0.5, 0.0, 0.0),
            SMatrix::<f64, 4, 4>::identity(),
        );
        let manager = ProjectionManager::new(&graph, links, vec![state]);
        let candidates = manager.project_state(0, INITIAL_QUANTILE);
        let (edge, offsets) = candidates.iter().next().unwrap();
        let projection = manager.at(0, *edge, offsets[0]).unwrap();
        assert!(projection.cost.is_finite());
    }

    #[test]
    fn search_edge_returns_segment_offsets_within_quantile() {
        let graph = straight_graph();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let state = KalmanState::new(
            SVector::<f64, 4>::new(10.0, 0.5, 0.0, 0.0),
            SMatrix::<f64, 4, 4>::identity(),
        );
        let manager = ProjectionManager::new(&graph, links, vec![state]);
        let edge = crate::graph::DirectedEdgeId {
            edge_id: crate::graph::EdgeId(0),
            from: VertexId(0),
            to: VertexId(1),
        };
        let offsets = manager.search_edge(0, edge);
        assert_eq!(offsets.as_slice(), &[0]);
    }
}
