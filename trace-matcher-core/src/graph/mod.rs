mod in_memory;
mod road_graph;

pub use in_memory::{InMemoryRoadGraph, RoadGraphBuilder};
pub use road_graph::{DirectedEdgeId, EdgeId, RoadGraph, VertexId};
