use nalgebra::SMatrix;
use serde::Serialize;

use crate::error::MatchingError;
use crate::graph::{DirectedEdgeId, RoadGraph, VertexId};
use crate::kalman::KalmanState;

use super::path::{format_path, MatchedSegment};
use super::projection::ProjectionManager;
use super::search::{find_best_path, SearchConfig};
use super::segment::LinkManager;

pub type Matrix4 = SMatrix<f64, 4, 4>;

/// One raw observation to be matched: a Kalman belief over `(x, y, vx,
/// vy)` for a single GPS fix.
pub type MapMatchingPoint = KalmanState;

/// A trajectory submitted for matching: an identifier, the Kalman states
/// derived from its raw fixes, and the `(F, Q)` motion model that governs
/// transitions between consecutive fixes.
pub struct MapMatchingTrace {
    pub id: String,
    pub states: Vec<MapMatchingPoint>,
    pub transition: (Matrix4, Matrix4),
    pub road_width: f64,
}

/// The matched output for one trajectory.
#[derive(Debug, Serialize)]
pub struct MapMatchingResult {
    pub id: String,
    pub count: usize,
    pub segment: Vec<MatchedSegment>,
}

/// Matches one trajectory against `graph`, using `distance_cost_fn` and
/// `intersection_cost_fn` to score candidate paths. Returns
/// [`MatchingError::EmptyTrace`] for a trajectory with no observations,
/// and [`MatchingError::NoPath`] when the search exhausts its budget or
/// the open set empties before reaching the end of the trajectory.
pub fn match_trace<G: RoadGraph>(
    trace: &MapMatchingTrace,
    graph: &G,
    distance_cost_fn: &(dyn Fn(Option<DirectedEdgeId>) -> f64 + Sync),
    intersection_cost_fn: &(dyn Fn(VertexId, VertexId, usize) -> f64 + Sync),
    greedy_factor: f64,
    relaxation_budget: usize,
) -> Result<MapMatchingResult, MatchingError> {
    if trace.states.is_empty() {
        return Err(MatchingError::EmptyTrace);
    }

    let (f, q) = trace.transition;
    let projection_links = LinkManager::new(graph, f, q, trace.road_width);
    let projections = ProjectionManager::new(graph, projection_links, trace.states.clone());
    let search_links = LinkManager::new(graph, f, q, trace.road_width);

    let config = SearchConfig {
        distance_cost_fn,
        intersection_cost_fn,
        greedy_factor,
        relaxation_budget,
    };

    let path = find_best_path(&trace.id, &trace.states, graph, &projections, &search_links, &config)?;

    Ok(MapMatchingResult {
        id: trace.id.clone(),
        count: trace.states.len(),
        segment: format_path(&path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RoadGraphBuilder;
    use crate::matching::cost::{DistanceCost, IntersectionCost, OFF_NETWORK_DISTANCE_COST};
    use geo::Coord;
    use nalgebra::SVector;

    fn state_at(x: f64, y: f64) -> KalmanState {
        KalmanState::new(SVector::<f64, 4>::new(x, y, 1.0, 0.0), SMatrix::<f64, 4, 4>::identity())
    }

    #[test]
    fn empty_trace_is_rejected_before_any_search() {
        let mut builder = RoadGraphBuilder::new();
        builder.add_edge(
            crate::graph::VertexId(0),
            crate::graph::VertexId(1),
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }],
        );
        let graph = builder.build();
        let trace = MapMatchingTrace {
            id: "empty".to_string(),
            states: Vec::new(),
            transition: (Matrix4::identity(), Matrix4::identity() * 0.01),
            road_width: 2.0,
        };
        let distance_cost = DistanceCost::uniform(OFF_NETWORK_DISTANCE_COST);
        let intersection_cost = IntersectionCost::uniform();
        let err = match_trace(
            &trace,
            &graph,
            &|e| distance_cost.call(e),
            &|u, v, k| intersection_cost.call(u, v, k),
            0.5,
            super::super::search::DEFAULT_RELAXATION_BUDGET,
        )
        .unwrap_err();
        assert_eq!(err, MatchingError::EmptyTrace);
    }

    #[test]
    fn straight_track_matches_end_to_end() {
        let mut builder = RoadGraphBuilder::new();
        builder.add_edge(
            crate::graph::VertexId(0),
            crate::graph::VertexId(1),
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }],
        );
        let graph = builder.build();
        let trace = MapMatchingTrace {
            id: "t1".to_string(),
            states: vec![state_at(10.0, 0.2), state_at(20.0, 0.1), state_at(30.0, 0.3)],
            transition: (Matrix4::identity(), Matrix4::identity() * 0.01),
            road_width: 2.0,
        };
        let distance_cost = DistanceCost::uniform(OFF_NETWORK_DISTANCE_COST);
        let intersection_cost = IntersectionCost::uniform();
        let result = match_trace(
            &trace,
            &graph,
            &|e| distance_cost.call(e),
            &|u, v, k| intersection_cost.call(u, v, k),
            0.5,
            super::super::search::DEFAULT_RELAXATION_BUDGET,
        )
        .unwrap();
        assert_eq!(result.count, 3);
        assert!(!result.segment.is_empty());
    }
}
