use std::collections::HashMap;

use geo::{BoundingRect, Coord, LineString, Rect};
use rstar::{RTree, RTreeObject, AABB};

use super::road_graph::{DirectedEdgeId, EdgeId, RoadGraph, VertexId};

#[derive(Debug)]
struct EdgeRTreeRecord {
    edge_id: EdgeId,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for EdgeRTreeRecord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A small in-memory [`RoadGraph`], built from explicit edges. Sufficient
/// for tests and for the batch driver reading a flat edge list; OSM/
/// shapefile ingestion into this shape is an external collaborator's job.
#[derive(Debug)]
pub struct InMemoryRoadGraph {
    polylines: HashMap<EdgeId, Vec<Coord<f64>>>,
    endpoints: HashMap<EdgeId, (VertexId, VertexId)>,
    adjacency: HashMap<VertexId, Vec<DirectedEdgeId>>,
    rtree: RTree<EdgeRTreeRecord>,
}

impl RoadGraph for InMemoryRoadGraph {
    fn search_edges(&self, bounds: Rect<f64>) -> Vec<DirectedEdgeId> {
        let query = AABB::from_corners(
            [bounds.min().x, bounds.min().y],
            [bounds.max().x, bounds.max().y],
        );
        self.rtree
            .locate_in_envelope_intersecting(&query)
            .flat_map(|record| {
                let (u, v) = self.endpoints[&record.edge_id];
                [
                    DirectedEdgeId {
                        edge_id: record.edge_id,
                        from: u,
                        to: v,
                    },
                    DirectedEdgeId {
                        edge_id: record.edge_id,
                        from: v,
                        to: u,
                    },
                ]
            })
            .collect()
    }

    fn edge_geometry(&self, edge: DirectedEdgeId) -> Vec<Coord<f64>> {
        let points = &self.polylines[&edge.edge_id];
        let (canonical_from, _) = self.endpoints[&edge.edge_id];
        if edge.from == canonical_from {
            points.clone()
        } else {
            points.iter().rev().copied().collect()
        }
    }

    fn adjacent(&self, vertex: VertexId) -> Vec<DirectedEdgeId> {
        self.adjacency.get(&vertex).cloned().unwrap_or_default()
    }
}

/// Builds an [`InMemoryRoadGraph`] by adding undirected edges one at a
/// time; each stores its polyline in the order given and yields two
/// adjacency entries, one per direction.
#[derive(Default)]
pub struct RoadGraphBuilder {
    polylines: HashMap<EdgeId, Vec<Coord<f64>>>,
    endpoints: HashMap<EdgeId, (VertexId, VertexId)>,
    adjacency: HashMap<VertexId, Vec<DirectedEdgeId>>,
    next_edge_id: usize,
}

impl RoadGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, u: VertexId, v: VertexId, polyline: Vec<Coord<f64>>) -> EdgeId {
        let edge_id = EdgeId(self.next_edge_id);
        self.next_edge_id += 1;
        self.endpoints.insert(edge_id, (u, v));
        self.adjacency.entry(u).or_default().push(DirectedEdgeId {
            edge_id,
            from: u,
            to: v,
        });
        self.adjacency.entry(v).or_default().push(DirectedEdgeId {
            edge_id,
            from: v,
            to: u,
        });
        self.polylines.insert(edge_id, polyline);
        edge_id
    }

    pub fn build(self) -> InMemoryRoadGraph {
        let records = self
            .polylines
            .iter()
            .filter_map(|(edge_id, points)| {
                let line = LineString::from(points.clone());
                line.bounding_rect().map(|rect| EdgeRTreeRecord {
                    edge_id: *edge_id,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        InMemoryRoadGraph {
            polylines: self.polylines,
            endpoints: self.endpoints,
            adjacency: self.adjacency,
            rtree: RTree::bulk_load(records),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_edges_finds_intersecting_bbox_in_both_directions() {
        let mut builder = RoadGraphBuilder::new();
        let u = VertexId(0);
        let v = VertexId(1);
        builder.add_edge(
            u,
            v,
            vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }],
        );
        let graph = builder.build();
        let bounds = Rect::new(Coord { x: -1.0, y: -1.0 }, Coord { x: 10.0, y: 1.0 });
        let found = graph.search_edges(bounds);
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|e| e.from == u && e.to == v));
        assert!(found.iter().any(|e| e.from == v && e.to == u));
    }

    #[test]
    fn adjacent_excludes_reverse() {
        let mut builder = RoadGraphBuilder::new();
        let (a, b, c) = (VertexId(0), VertexId(1), VertexId(2));
        builder.add_edge(a, b, vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }]);
        builder.add_edge(b, c, vec![Coord { x: 1.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }]);
        let graph = builder.build();
        let ab = DirectedEdgeId {
            edge_id: EdgeId(0),
            from: a,
            to: b,
        };
        let onward = graph.adjacent_excluding_reverse(ab);
        assert_eq!(onward.len(), 1);
        assert_eq!(onward[0].to, c);
    }
}
