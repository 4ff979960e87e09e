use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use geo::Coord;
use ordered_float::OrderedFloat;

use crate::error::NoPathError;
use crate::graph::{DirectedEdgeId, RoadGraph, VertexId};
use crate::kalman::KalmanState;
use crate::util::geo::euclidean;
use crate::util::priority_queue::InternalPriorityQueue;

use super::node::{Node, NodeKey};
use super::projection::ProjectionManager;
use super::segment::LinkManager;

/// Relaxations allowed before a trajectory is abandoned; guards against
/// pathological inputs (dense intersections, long off-network gaps) that
/// would otherwise expand the open set unboundedly.
pub const DEFAULT_RELAXATION_BUDGET: usize = 300_000;

pub struct SearchConfig<'a> {
    pub distance_cost_fn: &'a (dyn Fn(Option<DirectedEdgeId>) -> f64 + Sync),
    pub intersection_cost_fn: &'a (dyn Fn(VertexId, VertexId, usize) -> f64 + Sync),
    pub greedy_factor: f64,
    pub relaxation_budget: usize,
}

type Priority = (Reverse<OrderedFloat<f64>>, Reverse<u64>);

fn push(open: &mut InternalPriorityQueue<NodeKey, Priority>, key: NodeKey, f: f64, counter: &mut u64) {
    let order = *counter;
    *counter += 1;
    open.push(key, (Reverse(OrderedFloat(f)), Reverse(order)));
}

fn cumulative_distances(states: &[KalmanState]) -> Vec<f64> {
    let mut cumulative = vec![0.0];
    let mut total = 0.0;
    for pair in states.windows(2) {
        let a = Coord { x: pair[0].x[0], y: pair[0].x[1] };
        let b = Coord { x: pair[1].x[0], y: pair[1].x[1] };
        total += euclidean::distance(a, b);
        cumulative.push(total);
    }
    cumulative
}

fn reconstruct(
    final_key: &NodeKey,
    parent: &HashMap<NodeKey, NodeKey>,
    node_cache: &HashMap<NodeKey, Rc<Node>>,
) -> Vec<(NodeKey, Rc<Node>)> {
    let mut path = Vec::new();
    let mut current = final_key.clone();
    loop {
        let node = node_cache[&current].clone();
        path.push((current.clone(), node));
        match parent.get(&current) {
            Some(p) => current = p.clone(),
            None => break,
        }
    }
    path.reverse();
    path
}

/// A* over lazily-materialized [`NodeKey`]s, from the implicit Initial node
/// to the implicit Final node. `f = g + heuristic + handicap`; ties on
/// equal `f` are broken by insertion order.
pub fn find_best_path<G: RoadGraph>(
    trajectory_id: &str,
    states: &[KalmanState],
    graph: &G,
    projections: &ProjectionManager<G>,
    links: &LinkManager<G>,
    config: &SearchConfig,
) -> Result<Vec<(NodeKey, Rc<Node>)>, NoPathError> {
    let cumulative_distance = cumulative_distances(states);

    let mut open: InternalPriorityQueue<NodeKey, Priority> = InternalPriorityQueue::default();
    let mut g_score: HashMap<NodeKey, f64> = HashMap::new();
    let mut parent: HashMap<NodeKey, NodeKey> = HashMap::new();
    let mut node_cache: HashMap<NodeKey, Rc<Node>> = HashMap::new();
    let mut closed: HashSet<NodeKey> = HashSet::new();
    let mut counter: u64 = 0;
    let mut relaxations = 0usize;

    node_cache.insert(NodeKey::Initial, Rc::new(Node::Initial));
    g_score.insert(NodeKey::Initial, 0.0);
    push(&mut open, NodeKey::Initial, 0.0, &mut counter);

    while let Some((key, _)) = open.pop() {
        if closed.contains(&key) {
            continue;
        }
        closed.insert(key.clone());

        if matches!(key, NodeKey::Final) {
            log::debug!(
                "trajectory {}: reached Final after {} relaxations",
                trajectory_id,
                relaxations
            );
            return Ok(reconstruct(&key, &parent, &node_cache));
        }

        let current_node = node_cache
            .get(&key)
            .cloned()
            .expect("every key reaching the open set was materialized before being pushed");
        let current_g = g_score[&key];

        for successor_key in current_node.adjacent_nodes(states.len(), projections, graph) {
            relaxations += 1;
            if relaxations > config.relaxation_budget {
                log::warn!(
                    "trajectory {}: exhausted relaxation budget of {}",
                    trajectory_id,
                    config.relaxation_budget
                );
                return Err(NoPathError {
                    trajectory_id: trajectory_id.to_string(),
                    budget: config.relaxation_budget,
                });
            }
            if closed.contains(&successor_key) {
                continue;
            }
            let successor_node = match node_cache.get(&successor_key) {
                Some(node) => node.clone(),
                None => match Node::materialize(&successor_key, states, projections, links) {
                    Some(node) => {
                        let rc = Rc::new(node);
                        node_cache.insert(successor_key.clone(), rc.clone());
                        rc
                    }
                    None => continue,
                },
            };

            let transition_cost =
                current_node.cost_to(&successor_node, config.distance_cost_fn, config.intersection_cost_fn);
            if !transition_cost.is_finite() {
                continue;
            }
            let tentative_g = current_g + transition_cost + successor_node.cost();
            let improves = g_score.get(&successor_key).map(|&g| tentative_g < g).unwrap_or(true);
            if improves {
                g_score.insert(successor_key.clone(), tentative_g);
                parent.insert(successor_key.clone(), key.clone());
                let heuristic = successor_node.heuristic(states, &cumulative_distance, config.greedy_factor);
                let handicap = successor_node.handicap(config.distance_cost_fn);
                push(&mut open, successor_key, tentative_g + heuristic + handicap, &mut counter);
            }
        }
    }

    log::warn!("trajectory {}: open set emptied before reaching Final", trajectory_id);
    Err(NoPathError {
        trajectory_id: trajectory_id.to_string(),
        budget: config.relaxation_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RoadGraphBuilder;
    use crate::matching::ProjectionManager;
    use nalgebra::{SMatrix, SVector};

    fn identity_motion() -> (SMatrix<f64, 4, 4>, SMatrix<f64, 4, 4>) {
        (SMatrix::identity(), SMatrix::<f64, 4, 4>::identity() * 0.01)
    }

    fn state_at(x: f64, y: f64) -> KalmanState {
        KalmanState::new(SVector::<f64, 4>::new(x, y, 1.0, 0.0), SMatrix::<f64, 4, 4>::identity())
    }

    fn flat_distance_cost(_: Option<DirectedEdgeId>) -> f64 {
        1.0
    }

    fn flat_intersection_cost(_: VertexId, _: VertexId, _: usize) -> f64 {
        0.0
    }

    #[test]
    fn straight_track_matches_onto_single_edge() {
        let mut builder = RoadGraphBuilder::new();
        builder.add_edge(
            crate::graph::VertexId(0),
            crate::graph::VertexId(1),
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }],
        );
        let graph = builder.build();
        let (f, q) = identity_motion();
        let states = vec![state_at(10.0, 0.2), state_at(20.0, 0.1), state_at(30.0, 0.3)];
        let links = LinkManager::new(&graph, f, q, 2.0);
        let projections = ProjectionManager::new(&graph, links, states.clone());
        let links_for_search = LinkManager::new(&graph, f, q, 2.0);

        let config = SearchConfig {
            distance_cost_fn: &flat_distance_cost,
            intersection_cost_fn: &flat_intersection_cost,
            greedy_factor: 0.5,
            relaxation_budget: DEFAULT_RELAXATION_BUDGET,
        };
        let path = find_best_path("t1", &states, &graph, &projections, &links_for_search, &config).unwrap();
        assert!(matches!(path.last().unwrap().0, NodeKey::Final));
        assert!(path
            .iter()
            .filter(|(k, _)| matches!(k, NodeKey::Linked { .. }))
            .count()
            >= states.len());
    }

    #[test]
    fn budget_exhaustion_surfaces_no_path_error() {
        let mut builder = RoadGraphBuilder::new();
        builder.add_edge(
            crate::graph::VertexId(0),
            crate::graph::VertexId(1),
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }],
        );
        let graph = builder.build();
        let (f, q) = identity_motion();
        let states = vec![state_at(10.0, 0.2), state_at(20.0, 0.1)];
        let links = LinkManager::new(&graph, f, q, 2.0);
        let projections = ProjectionManager::new(&graph, links, states.clone());
        let links_for_search = LinkManager::new(&graph, f, q, 2.0);

        let config = SearchConfig {
            distance_cost_fn: &flat_distance_cost,
            intersection_cost_fn: &flat_intersection_cost,
            greedy_factor: 0.5,
            relaxation_budget: 0,
        };
        let err = find_best_path("t2", &states, &graph, &projections, &links_for_search, &config).unwrap_err();
        assert_eq!(err.trajectory_id, "t2");
        assert_eq!(err.budget, 0);
    }
}
