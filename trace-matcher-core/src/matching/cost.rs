use crate::graph::{DirectedEdgeId, VertexId};

/// Cost charged to `distance_cost_fn` when there is no current edge, i.e.
/// the out-of-network fallback rate.
pub const OFF_NETWORK_DISTANCE_COST: f64 = 300.0;

/// A weighted inner product of boolean predicates over an optional edge,
/// the shape `distance_cost_fn` and `intersection_cost_fn` both take: each
/// predicate contributes its weight when it holds, scaled by a fixed
/// factor. Callers that have real link classification data (road class,
/// bike-lane presence, and so on) supply their own predicate list; without
/// one, [`DistanceCost::uniform`] reduces to a constant rate for every
/// edge on the network.
type DistancePredicate = Box<dyn Fn(DirectedEdgeId) -> bool + Send + Sync>;

pub struct DistanceCost {
    predicates: Vec<DistancePredicate>,
    weights: Vec<f64>,
    scale: f64,
    off_network: f64,
}

impl DistanceCost {
    pub fn new(
        predicates: Vec<DistancePredicate>,
        weights: Vec<f64>,
        scale: f64,
        off_network: f64,
    ) -> Self {
        assert_eq!(predicates.len(), weights.len());
        DistanceCost { predicates, weights, scale, off_network }
    }

    /// A single always-true predicate at weight 1.0: every on-network
    /// edge costs the same per unit distance.
    pub fn uniform(off_network: f64) -> Self {
        DistanceCost::new(vec![Box::new(|_| true)], vec![1.0], 0.5, off_network)
    }

    pub fn call(&self, edge: Option<DirectedEdgeId>) -> f64 {
        let Some(edge) = edge else {
            return self.off_network;
        };
        let sum: f64 = self
            .predicates
            .iter()
            .zip(&self.weights)
            .map(|(pred, weight)| if pred(edge) { *weight } else { 0.0 })
            .sum();
        self.scale * sum
    }
}

/// Analogous weighted predicate sum for `intersection_cost_fn(u, v, k)`;
/// `k` is the outgoing-edge fan-out at `v` the search observed when
/// considering the intersection, carried through for predicates that care
/// about branching factor but unused by the uniform default.
type IntersectionPredicate = Box<dyn Fn(VertexId, VertexId, usize) -> bool + Send + Sync>;

pub struct IntersectionCost {
    predicates: Vec<IntersectionPredicate>,
    weights: Vec<f64>,
    scale: f64,
}

impl IntersectionCost {
    pub fn new(
        predicates: Vec<IntersectionPredicate>,
        weights: Vec<f64>,
        scale: f64,
    ) -> Self {
        assert_eq!(predicates.len(), weights.len());
        IntersectionCost { predicates, weights, scale }
    }

    pub fn uniform() -> Self {
        IntersectionCost::new(vec![Box::new(|_, _, _| true)], vec![1.0], 0.5)
    }

    pub fn call(&self, u: VertexId, v: VertexId, k: usize) -> f64 {
        let sum: f64 = self
            .predicates
            .iter()
            .zip(&self.weights)
            .map(|(pred, weight)| if pred(u, v, k) { *weight } else { 0.0 })
            .sum();
        self.scale * sum
    }
}
