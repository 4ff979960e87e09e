use geo::{Coord, Rect};
use serde::Serialize;

/// Opaque identifier for a graph vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VertexId(pub usize);

/// Opaque identifier for an undirected edge; its two directions share one
/// `EdgeId` but are distinguished by `from`/`to` on [`DirectedEdgeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeId(pub usize);

/// A directed traversal of one undirected edge. Order matters for equality
/// and hashing: `(e, u, v)` and `(e, v, u)` are distinct keys, matching the
/// Linked-node identity rule in the search graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DirectedEdgeId {
    pub edge_id: EdgeId,
    pub from: VertexId,
    pub to: VertexId,
}

impl DirectedEdgeId {
    pub fn reverse(&self) -> DirectedEdgeId {
        DirectedEdgeId {
            edge_id: self.edge_id,
            from: self.to,
            to: self.from,
        }
    }
}

/// The road network consumed by the matching engine. Construction,
/// persistence, and ingestion from external formats (OSM, shapefiles) are
/// not this crate's concern; callers provide an implementation (or use
/// [`crate::graph::InMemoryRoadGraph`] for tests and small inputs).
pub trait RoadGraph {
    /// Directed edges whose polyline bounding box intersects `bounds`, in
    /// both directions for every intersected undirected edge.
    fn search_edges(&self, bounds: Rect<f64>) -> Vec<DirectedEdgeId>;

    /// The polyline of a directed edge, oriented from `from` to `to`.
    fn edge_geometry(&self, edge: DirectedEdgeId) -> Vec<Coord<f64>>;

    /// Directed edges leaving `head(edge)`, excluding `edge`'s own reverse.
    fn adjacent_excluding_reverse(&self, edge: DirectedEdgeId) -> Vec<DirectedEdgeId> {
        let reverse = edge.reverse();
        self.adjacent(edge.to)
            .into_iter()
            .filter(|candidate| *candidate != reverse)
            .collect()
    }

    /// All directed edges leaving `vertex`.
    fn adjacent(&self, vertex: VertexId) -> Vec<DirectedEdgeId>;
}
