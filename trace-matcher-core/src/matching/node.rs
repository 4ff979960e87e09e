use std::hash::{Hash, Hasher};
use std::rc::Rc;

use geo::Coord;
use nalgebra::SVector;

use crate::graph::{DirectedEdgeId, RoadGraph, VertexId};
use crate::kalman::{KalmanState, LongitudinalState};
use crate::util::geo::euclidean;

use super::projection::{ProjectionManager, INITIAL_QUANTILE};
use super::segment::{Link, LinkManager};

/// Extra measurement variance added on top of the target state's own
/// uncertainty when scoring how well one projected position continues
/// into the next, in the along-edge distance unit.
const CONTINUATION_SLACK_VARIANCE: f64 = 2.0;

/// Cost charged to leave the road network: both [`FloatingNode`] and
/// [`JumpingNode`] carry this as their node cost.
const OFF_NETWORK_COST: f64 = 20.0;

fn projection_distance_cost(
    state1: &LongitudinalState,
    state2: &LongitudinalState,
    travelled_distance: f64,
) -> f64 {
    state1.measurement_distance(
        state2.x[0] + travelled_distance,
        SVector::<f64, 2>::new(1.0, 0.0),
        state2.p[(0, 0)] + CONTINUATION_SLACK_VARIANCE,
    )
}

/// A materialized [`NodeKey::Linked`]: a trajectory state conditioned on
/// lying at a specific offset into a specific directed edge. Shared via
/// `Rc` because it also serves as the anchor a [`NodeKey::Forwarding`] or
/// [`NodeKey::Jumping`] key branches off from.
#[derive(Debug)]
pub struct LinkedNodeData {
    pub edge: DirectedEdgeId,
    pub offset: usize,
    pub idx: usize,
    state_cost: f64,
    constrained_state: KalmanState,
    projected_state: LongitudinalState,
    link: Rc<Link>,
    next_projected_state: LongitudinalState,
}

impl LinkedNodeData {
    fn segment(&self) -> &super::segment::Segment {
        self.link
            .segment(self.offset)
            .expect("offset came from this link's own segment count")
    }

    pub fn cost(&self) -> f64 {
        self.state_cost
    }

    pub fn coordinates(&self) -> Coord<f64> {
        Coord {
            x: self.constrained_state.x[0],
            y: self.constrained_state.x[1],
        }
    }

    /// Along-edge distance of this projection from the edge's origin.
    pub fn projection(&self) -> f64 {
        self.projected_state.x[0] + self.segment().distance
    }

    pub fn link_length(&self) -> f64 {
        self.link.length
    }
}

#[derive(Debug)]
pub struct ForwardingNodeData {
    anchor: Rc<LinkedNodeData>,
    distance: f64,
    edge: DirectedEdgeId,
    link: Rc<Link>,
    projected_state: LongitudinalState,
}

impl ForwardingNodeData {
    pub fn anchor_link_length(&self) -> f64 {
        self.anchor.link_length()
    }

    pub fn anchor_idx(&self) -> usize {
        self.anchor.idx
    }

    pub fn edge(&self) -> DirectedEdgeId {
        self.edge
    }
}

/// A lightweight, hashable handle to a search node. Distinct keys that
/// describe "the same place" (same edge/offset/trajectory-index, or the
/// same anchor for off-network detours) compare equal even when carried
/// payloads such as `distance` differ, matching how the search
/// deduplicates visits to a node rather than to a specific arrival path.
#[derive(Clone, Debug)]
pub enum NodeKey {
    Initial,
    Linked {
        edge: DirectedEdgeId,
        offset: usize,
        idx: usize,
    },
    Forwarding {
        anchor: Rc<LinkedNodeData>,
        distance: f64,
        edge: DirectedEdgeId,
        projected_state: LongitudinalState,
    },
    Floating {
        idx: usize,
    },
    Jumping {
        anchor: Rc<LinkedNodeData>,
    },
    Final,
}

impl PartialEq for NodeKey {
    fn eq(&self, other: &Self) -> bool {
        use NodeKey::*;
        match (self, other) {
            (Initial, Initial) | (Final, Final) => true,
            (Linked { edge: e1, offset: o1, idx: i1 }, Linked { edge: e2, offset: o2, idx: i2 }) => {
                e1 == e2 && o1 == o2 && i1 == i2
            }
            (Forwarding { anchor: a1, edge: e1, .. }, Forwarding { anchor: a2, edge: e2, .. }) => {
                a1.idx == a2.idx && e1 == e2
            }
            (Floating { idx: i1 }, Floating { idx: i2 }) => i1 == i2,
            (Jumping { anchor: a1 }, Jumping { anchor: a2 }) => a1.idx == a2.idx,
            _ => false,
        }
    }
}

impl Eq for NodeKey {}

impl Hash for NodeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use NodeKey::*;
        match self {
            Initial => 0u8.hash(state),
            Linked { edge, offset, idx } => {
                1u8.hash(state);
                edge.hash(state);
                offset.hash(state);
                idx.hash(state);
            }
            Forwarding { anchor, edge, .. } => {
                2u8.hash(state);
                anchor.idx.hash(state);
                edge.hash(state);
            }
            Floating { idx } => {
                3u8.hash(state);
                idx.hash(state);
            }
            Jumping { anchor } => {
                4u8.hash(state);
                anchor.idx.hash(state);
            }
            Final => 5u8.hash(state),
        }
    }
}

impl NodeKey {
    /// Trajectory-state index and (when on the network) directed edge this
    /// key's node would occupy; used purely to report search progress.
    pub fn progress(&self) -> (Option<DirectedEdgeId>, f64) {
        match self {
            NodeKey::Initial => (None, 0.0),
            NodeKey::Linked { edge, idx, .. } => (Some(*edge), *idx as f64),
            NodeKey::Forwarding { anchor, edge, .. } => (Some(*edge), anchor.idx as f64),
            NodeKey::Floating { idx } => (None, *idx as f64),
            NodeKey::Jumping { anchor } => (None, anchor.idx as f64),
            NodeKey::Final => (None, f64::INFINITY),
        }
    }
}

/// A materialized search node: the Kalman-conditioned state that a
/// [`NodeKey`] refers to, built on demand from the trajectory states and
/// the shared [`ProjectionManager`]/[`LinkManager`].
#[derive(Debug)]
pub enum Node {
    Initial,
    Linked(Rc<LinkedNodeData>),
    Forwarding(Rc<ForwardingNodeData>),
    Floating { idx: usize, state: Rc<KalmanState> },
    Jumping { anchor: Rc<LinkedNodeData>, state: Rc<KalmanState> },
    Final,
}

impl Node {
    /// Builds the node a key refers to. Returns `None` only when the
    /// underlying projection or link lookup fails (a degenerate edge, or a
    /// numerically non-finite projection) -- the search treats that as an
    /// unreachable successor rather than a hard error.
    pub fn materialize<G: RoadGraph>(
        key: &NodeKey,
        states: &[KalmanState],
        projections: &ProjectionManager<G>,
        links: &LinkManager<G>,
    ) -> Option<Node> {
        match key {
            NodeKey::Initial => Some(Node::Initial),
            NodeKey::Final => Some(Node::Final),
            NodeKey::Floating { idx } => Some(Node::Floating {
                idx: *idx,
                state: Rc::new(states[*idx].clone()),
            }),
            NodeKey::Jumping { anchor } => Some(Node::Jumping {
                anchor: anchor.clone(),
                state: Rc::new(states[anchor.idx + 1].clone()),
            }),
            NodeKey::Linked { edge, offset, idx } => {
                let link = links.at(*edge).ok()?;
                let projection = projections.at(*idx, *edge, *offset)?;
                let projected_state = (*projection.projected_state).clone();
                let segment = link.segment(*offset)?;
                let next_projected_state = segment.advance(projected_state.clone());
                Some(Node::Linked(Rc::new(LinkedNodeData {
                    edge: *edge,
                    offset: *offset,
                    idx: *idx,
                    state_cost: projection.cost,
                    constrained_state: (*projection.constrained_state).clone(),
                    projected_state,
                    link,
                    next_projected_state,
                })))
            }
            NodeKey::Forwarding { anchor, distance, edge, projected_state } => {
                let link = links.at(*edge).ok()?;
                Some(Node::Forwarding(Rc::new(ForwardingNodeData {
                    anchor: anchor.clone(),
                    distance: *distance,
                    edge: *edge,
                    link,
                    projected_state: projected_state.clone(),
                })))
            }
        }
    }

    pub fn cost(&self) -> f64 {
        match self {
            Node::Initial | Node::Final | Node::Forwarding(_) => 0.0,
            Node::Linked(data) => data.cost(),
            Node::Floating { .. } | Node::Jumping { .. } => OFF_NETWORK_COST,
        }
    }

    /// Position in the trajectory frame; undefined (and unused) for
    /// [`Node::Initial`]/[`Node::Final`].
    pub fn coordinates(&self) -> Coord<f64> {
        match self {
            Node::Linked(data) => data.coordinates(),
            Node::Forwarding(data) => {
                let last = data.link.segment_count().saturating_sub(1);
                data.link.segment(last).expect("link built from >=1 point pair").origin()
            }
            Node::Floating { state, .. } | Node::Jumping { state, .. } => Coord {
                x: state.x[0],
                y: state.x[1],
            },
            Node::Initial | Node::Final => Coord { x: 0.0, y: 0.0 },
        }
    }

    pub fn adjacent_nodes<G: RoadGraph>(
        &self,
        state_count: usize,
        projections: &ProjectionManager<G>,
        graph: &G,
    ) -> Vec<NodeKey> {
        match self {
            Node::Initial => projections
                .project_state(0, INITIAL_QUANTILE)
                .iter()
                .flat_map(|(edge, offsets)| {
                    offsets.iter().map(move |offset| NodeKey::Linked {
                        edge: *edge,
                        offset: *offset,
                        idx: 0,
                    })
                })
                .collect(),
            Node::Final => Vec::new(),
            Node::Linked(data) => {
                if data.idx + 1 == state_count {
                    return vec![NodeKey::Final];
                }
                let mut keys: Vec<NodeKey> = projections
                    .search_edge(data.idx + 1, data.edge)
                    .iter()
                    .filter(|offset| **offset >= data.offset)
                    .map(|offset| NodeKey::Linked {
                        edge: data.edge,
                        offset: *offset,
                        idx: data.idx + 1,
                    })
                    .collect();
                keys.push(NodeKey::Jumping { anchor: data.clone() });
                for next_edge in graph.adjacent_excluding_reverse(data.edge) {
                    keys.push(NodeKey::Forwarding {
                        anchor: data.clone(),
                        distance: data.link.length - data.segment().distance,
                        edge: next_edge,
                        projected_state: data.next_projected_state.clone(),
                    });
                }
                keys
            }
            Node::Forwarding(data) => {
                let mut keys: Vec<NodeKey> = projections
                    .search_edge(data.anchor.idx + 1, data.edge)
                    .iter()
                    .map(|offset| NodeKey::Linked {
                        edge: data.edge,
                        offset: *offset,
                        idx: data.anchor.idx + 1,
                    })
                    .collect();
                let distance = data.distance + data.link.length;
                for next_edge in graph.adjacent_excluding_reverse(data.edge) {
                    keys.push(NodeKey::Forwarding {
                        anchor: data.anchor.clone(),
                        distance,
                        edge: next_edge,
                        projected_state: data.projected_state.clone(),
                    });
                }
                keys
            }
            Node::Floating { idx, .. } => {
                if idx + 1 == state_count {
                    return vec![NodeKey::Final];
                }
                let mut keys = vec![NodeKey::Floating { idx: idx + 1 }];
                for (edge, offsets) in projections.project_state(idx + 1, 5.0).iter() {
                    for offset in offsets {
                        keys.push(NodeKey::Linked {
                            edge: *edge,
                            offset: *offset,
                            idx: idx + 1,
                        });
                    }
                }
                keys
            }
            Node::Jumping { anchor, .. } => {
                let mut keys = vec![NodeKey::Floating { idx: anchor.idx + 1 }];
                for (edge, offsets) in projections.project_state(anchor.idx + 1, 5.0).iter() {
                    if *edge == anchor.edge || *edge == anchor.edge.reverse() {
                        continue;
                    }
                    for offset in offsets {
                        keys.push(NodeKey::Linked {
                            edge: *edge,
                            offset: *offset,
                            idx: anchor.idx + 1,
                        });
                    }
                }
                keys
            }
        }
    }

    fn distance_to(&self, other: &Node) -> f64 {
        match (self, other) {
            (Node::Linked(a), Node::Linked(b)) => {
                debug_assert_eq!(a.edge, b.edge);
                (b.projection() - a.projection()).abs()
            }
            (Node::Linked(a), Node::Forwarding(_)) => {
                a.link.length - (a.segment().distance + a.projected_state.x[0])
            }
            (Node::Linked(_), _) => 0.0,
            (Node::Forwarding(_), Node::Linked(b)) => b.segment().distance + b.projected_state.x[0],
            (Node::Forwarding(a), Node::Forwarding(_)) => a.link.length,
            (Node::Jumping { anchor, .. }, _) => euclidean::distance(anchor.coordinates(), other.coordinates()),
            (Node::Floating { .. }, _) => euclidean::distance(self.coordinates(), other.coordinates()),
            _ => 0.0,
        }
    }

    pub fn cost_to(
        &self,
        other: &Node,
        distance_cost_fn: &(dyn Fn(Option<DirectedEdgeId>) -> f64 + Sync),
        intersection_cost_fn: &(dyn Fn(VertexId, VertexId, usize) -> f64 + Sync),
    ) -> f64 {
        let _ = intersection_cost_fn;
        match self {
            Node::Initial => 0.0,
            Node::Linked(a) => {
                if matches!(other, Node::Final) {
                    return 0.0;
                }
                let mut cost = self.distance_to(other) * distance_cost_fn(Some(a.edge));
                if let Node::Linked(b) = other {
                    cost += projection_distance_cost(
                        &a.next_projected_state,
                        &b.projected_state,
                        b.segment().distance - a.segment().distance,
                    );
                }
                cost
            }
            Node::Forwarding(a) => {
                let mut cost = self.distance_to(other) * distance_cost_fn(Some(a.edge));
                if let Node::Linked(b) = other {
                    cost += projection_distance_cost(
                        &a.projected_state,
                        &b.projected_state,
                        a.distance + b.segment().distance,
                    );
                }
                cost
            }
            Node::Floating { .. } => {
                if matches!(other, Node::Final) {
                    0.0
                } else {
                    self.distance_to(other) * distance_cost_fn(None)
                }
            }
            Node::Jumping { .. } => self.distance_to(other) * distance_cost_fn(None),
            Node::Final => 0.0,
        }
    }

    pub fn handicap(&self, distance_cost_fn: &(dyn Fn(Option<DirectedEdgeId>) -> f64 + Sync)) -> f64 {
        match self {
            Node::Forwarding(data) => data
                .projected_state
                .ineql_constraint_distance(SVector::<f64, 2>::new(1.0, 0.0), data.distance),
            Node::Jumping { anchor, state } => {
                let jumping = Node::Jumping {
                    anchor: anchor.clone(),
                    state: state.clone(),
                };
                jumping.distance_to(&jumping) * distance_cost_fn(None)
            }
            _ => 0.0,
        }
    }

    pub fn heuristic(
        &self,
        states: &[KalmanState],
        cumulative_distance: &[f64],
        greedy_factor: f64,
    ) -> f64 {
        let last = cumulative_distance.len() - 1;
        match self {
            Node::Initial => 0.0,
            Node::Linked(data) => {
                if data.idx + 1 < states.len() {
                    let next = states[data.idx + 1].x;
                    let next_coord = Coord { x: next[0], y: next[1] };
                    greedy_factor
                        * (euclidean::distance(data.coordinates(), next_coord) - cumulative_distance[data.idx + 1])
                } else {
                    -greedy_factor * cumulative_distance[last]
                }
            }
            Node::Forwarding(data) => {
                let next = states[data.anchor.idx + 1].x;
                let next_coord = Coord { x: next[0], y: next[1] };
                greedy_factor * (euclidean::distance(self.coordinates(), next_coord) - cumulative_distance[data.anchor.idx + 1])
            }
            Node::Floating { idx, .. } => -greedy_factor * cumulative_distance[*idx],
            Node::Jumping { anchor, .. } => -greedy_factor * cumulative_distance[anchor.idx + 1],
            Node::Final => -greedy_factor * cumulative_distance[last],
        }
    }

    pub fn progress(&self) -> (Option<DirectedEdgeId>, f64) {
        match self {
            Node::Initial => (None, 0.0),
            Node::Linked(data) => (Some(data.edge), data.idx as f64),
            Node::Forwarding(data) => (Some(data.edge), data.anchor.idx as f64),
            Node::Floating { idx, .. } => (None, *idx as f64),
            Node::Jumping { anchor, .. } => (None, anchor.idx as f64),
            Node::Final => (None, f64::INFINITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InMemoryRoadGraph, RoadGraphBuilder};
    use crate::matching::ProjectionManager;
    use nalgebra::SMatrix;

    fn identity_motion() -> (SMatrix<f64, 4, 4>, SMatrix<f64, 4, 4>) {
        (SMatrix::identity(), SMatrix::<f64, 4, 4>::identity() * 0.01)
    }

    fn straight_graph() -> InMemoryRoadGraph {
        let mut builder = RoadGraphBuilder::new();
        builder.add_edge(
            crate::graph::VertexId(0),
            crate::graph::VertexId(1),
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }],
        );
        builder.build()
    }

    fn state_at(x: f64, y: f64) -> KalmanState {
        KalmanState::new(SVector::<f64, 4>::new(x, y, 0.0, 0.0), SMatrix::<f64, 4, 4>::identity())
    }

    #[test]
    fn initial_node_yields_linked_keys_on_the_edge() {
        let graph = straight_graph();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let states = vec![state_at(10.0, 0.2)];
        let projections = ProjectionManager::new(&graph, links, states.clone());

        let keys = Node::Initial.adjacent_nodes(states.len(), &projections, &graph);
        assert!(!keys.is_empty());
        assert!(keys.iter().all(|k| matches!(k, NodeKey::Linked { idx: 0, .. })));
    }

    #[test]
    fn linked_node_on_last_state_yields_final() {
        let graph = straight_graph();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let states = vec![state_at(10.0, 0.2)];
        let links2 = LinkManager::new(&graph, f, q, 2.0);
        let projections = ProjectionManager::new(&graph, links2, states.clone());
        let initial_keys = Node::Initial.adjacent_nodes(states.len(), &projections, &graph);
        let key = &initial_keys[0];
        let node = Node::materialize(key, &states, &projections, &links).unwrap();
        let successors = node.adjacent_nodes(states.len(), &projections, &graph);
        assert_eq!(successors.len(), 1);
        assert!(matches!(successors[0], NodeKey::Final));
    }

    #[test]
    fn linked_node_offers_jumping_and_forwarding_successors() {
        let mut builder = RoadGraphBuilder::new();
        let (u, v, w) = (crate::graph::VertexId(0), crate::graph::VertexId(1), crate::graph::VertexId(2));
        builder.add_edge(u, v, vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }]);
        builder.add_edge(v, w, vec![Coord { x: 100.0, y: 0.0 }, Coord { x: 200.0, y: 0.0 }]);
        let graph = builder.build();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let states = vec![state_at(10.0, 0.2), state_at(20.0, 0.2)];
        let projections = ProjectionManager::new(&graph, links, states.clone());
        let links2 = LinkManager::new(&graph, f, q, 2.0);

        let initial_keys = Node::Initial.adjacent_nodes(states.len(), &projections, &graph);
        let key = initial_keys
            .iter()
            .find(|k| matches!(k, NodeKey::Linked { edge, .. } if edge.from == u && edge.to == v))
            .unwrap();
        let node = Node::materialize(key, &states, &projections, &links2).unwrap();
        let successors = node.adjacent_nodes(states.len(), &projections, &graph);
        assert!(successors.iter().any(|k| matches!(k, NodeKey::Jumping { .. })));
        assert!(successors.iter().any(|k| matches!(k, NodeKey::Forwarding { .. })));
    }

    #[test]
    fn node_key_equality_ignores_forwarding_payload() {
        let mut builder = RoadGraphBuilder::new();
        let (u, v) = (crate::graph::VertexId(0), crate::graph::VertexId(1));
        builder.add_edge(u, v, vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }]);
        let graph = builder.build();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let states = vec![state_at(10.0, 0.2)];
        let projections = ProjectionManager::new(&graph, links, states.clone());
        let links2 = LinkManager::new(&graph, f, q, 2.0);
        let initial_keys = Node::Initial.adjacent_nodes(states.len(), &projections, &graph);
        let key = &initial_keys[0];
        let node = Node::materialize(key, &states, &projections, &links2).unwrap();
        let anchor = match node {
            Node::Linked(data) => data,
            _ => panic!("expected linked node"),
        };
        let edge = anchor.edge;
        let a = NodeKey::Forwarding {
            anchor: anchor.clone(),
            distance: 1.0,
            edge,
            projected_state: LongitudinalState::new(nalgebra::SVector::<f64, 2>::zeros(), nalgebra::SMatrix::<f64, 2, 2>::identity()),
        };
        let b = NodeKey::Forwarding {
            anchor: anchor.clone(),
            distance: 999.0,
            edge,
            projected_state: LongitudinalState::new(nalgebra::SVector::<f64, 2>::new(5.0, 5.0), nalgebra::SMatrix::<f64, 2, 2>::identity()),
        };
        assert!(a == b);
    }

    /// `Jumping`'s distance (and, through it, its handicap) must be the
    /// real gap between the anchor's on-edge departure point and the
    /// re-entry observation, not a same-state Euclidean distance that
    /// collapses to zero.
    #[test]
    fn jumping_distance_and_handicap_use_the_anchor_departure_point() {
        let graph = straight_graph();
        let (f, q) = identity_motion();
        let links = LinkManager::new(&graph, f, q, 2.0);
        let states = vec![state_at(10.0, 0.2), state_at(10.0, 50.0)];
        let projections = ProjectionManager::new(&graph, links, states.clone());
        let links2 = LinkManager::new(&graph, f, q, 2.0);

        let initial_keys = Node::Initial.adjacent_nodes(states.len(), &projections, &graph);
        let linked_key = &initial_keys[0];
        let linked = Node::materialize(linked_key, &states, &projections, &links2).unwrap();
        let anchor = match &linked {
            Node::Linked(data) => data.clone(),
            _ => panic!("expected linked node"),
        };

        let jumping_key = linked
            .adjacent_nodes(states.len(), &projections, &graph)
            .into_iter()
            .find(|k| matches!(k, NodeKey::Jumping { .. }))
            .expect("linked node offers a jumping successor");
        let jumping = Node::materialize(&jumping_key, &states, &projections, &links2).unwrap();

        let expected = euclidean::distance(anchor.coordinates(), jumping.coordinates());
        assert!(expected > 1.0, "states are far apart, so the real gap should be large");
        assert_eq!(jumping.distance_to(&jumping), expected);

        let distance_cost_fn: &(dyn Fn(Option<DirectedEdgeId>) -> f64 + Sync) = &|_| 300.0;
        assert_eq!(jumping.handicap(distance_cost_fn), expected * 300.0);
    }
}
