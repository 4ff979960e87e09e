use std::rc::Rc;

use geo::Coord;
use serde::Serialize;

use crate::graph::DirectedEdgeId;

use super::node::{Node, NodeKey};

/// A bound on one end of a [`MatchedSegment`]: the along-edge projection
/// (absent for off-network segments), whether it sits exactly at the
/// edge's endpoint, and the trajectory state index it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bound {
    pub projection: Option<f64>,
    pub at_endpoint: bool,
    pub state_index: usize,
}

impl Bound {
    fn new(projection: Option<f64>, at_endpoint: bool, state_index: usize) -> Self {
        Bound { projection, at_endpoint, state_index }
    }
}

/// One contiguous piece of the matched path: either a run of positions
/// snapped onto a single directed edge (`edge = Some`), or an off-network
/// stretch of raw trajectory positions (`edge = None`).
#[derive(Debug, Clone, Serialize)]
pub struct MatchedSegment {
    pub edge: Option<DirectedEdgeId>,
    pub geometry: Vec<Coord<f64>>,
    pub begin: Bound,
    pub end: Bound,
}

/// Walks the reconstructed `(key, node)` path and emits [`MatchedSegment`]s.
/// Mirrors the node-transition rules exactly: a Linked node opens or
/// continues the current edge's geometry, a Forwarding transition closes
/// the edge at its far endpoint and opens the next one, a Jumping
/// transition closes the edge at the anchor's projection and starts an
/// unmatched run, and Final closes whatever is still open.
pub fn format_path(path: &[(NodeKey, Rc<Node>)]) -> Vec<MatchedSegment> {
    let mut out = Vec::new();
    let mut current_edge: Option<DirectedEdgeId> = None;
    let mut begin_bound = Bound::new(None, false, 0);
    let mut geometry: Vec<Coord<f64>> = Vec::new();
    let mut previous: Option<&Node> = None;

    for (_, node) in path {
        let node: &Node = node;

        if current_edge.is_none() {
            if let Node::Linked(data) = node {
                if !geometry.is_empty() {
                    let end_bound = Bound::new(None, false, data.idx);
                    let mut closing = std::mem::take(&mut geometry);
                    closing.push(data.coordinates());
                    out.push(MatchedSegment {
                        edge: None,
                        geometry: closing,
                        begin: begin_bound,
                        end: end_bound,
                    });
                }
                current_edge = Some(data.edge);
                begin_bound = Bound::new(Some(data.projection()), false, data.idx);
                geometry = Vec::new();
            }
        }

        if let Node::Forwarding(data) = node {
            let end_bound = Bound::new(Some(data.anchor_link_length()), true, data.anchor_idx() + 1);
            geometry.push(node.coordinates());
            out.push(MatchedSegment {
                edge: current_edge,
                geometry: std::mem::take(&mut geometry),
                begin: begin_bound,
                end: end_bound,
            });
            current_edge = Some(data.edge());
            begin_bound = Bound::new(Some(0.0), true, data.anchor_idx() + 1);
            geometry = vec![node.coordinates()];
        }

        if let Node::Jumping { anchor, .. } = node {
            let end_bound = Bound::new(Some(anchor.projection()), false, anchor.idx + 1);
            out.push(MatchedSegment {
                edge: current_edge,
                geometry: std::mem::take(&mut geometry),
                begin: begin_bound,
                end: end_bound,
            });
            current_edge = None;
            begin_bound = Bound::new(None, false, anchor.idx + 1);
            geometry = vec![anchor.coordinates()];
        }

        if matches!(node, Node::Final) {
            match current_edge {
                None => {
                    if let Some(Node::Floating { idx, .. }) = previous {
                        let end_bound = Bound::new(None, false, idx + 1);
                        if !geometry.is_empty() {
                            out.push(MatchedSegment {
                                edge: None,
                                geometry: std::mem::take(&mut geometry),
                                begin: begin_bound,
                                end: end_bound,
                            });
                        }
                    }
                }
                Some(edge) => {
                    if let Some(Node::Linked(data)) = previous {
                        let end_bound = Bound::new(Some(data.projection()), false, data.idx + 1);
                        out.push(MatchedSegment {
                            edge: Some(edge),
                            geometry: std::mem::take(&mut geometry),
                            begin: begin_bound,
                            end: end_bound,
                        });
                    }
                }
            }
        }

        if matches!(node, Node::Linked(_) | Node::Floating { .. }) {
            geometry.push(node.coordinates());
        }

        previous = Some(node);
    }

    out
}
