//! Connectivity graph: an undirected graph over piece endpoints.
//!
//! Vertices are [`EndpointRef`]s. Edges come from two sources:
//!
//! - **internal**: the connection map of each piece (a rail inside the
//!   piece joins the two endpoints);
//! - **external**: endpoint pairs of different pieces that the
//!   [`EndpointMatcher`] snapped together.
//!
//! The graph is built all-or-nothing and rebuilt from scratch after any
//! topology edit. Vertex and neighbour iteration follow insertion order,
//! so the first vertex is endpoint 0 of the first placed piece.

use petgraph::graphmap::UnGraphMap;

use crate::layout::Layout;
use crate::matcher::EndpointMatcher;
use crate::turnout::COMMON_ENDPOINT;
use crate::types::{EndpointRef, LayoutError, edge_key};

/// Where an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// A rail inside one piece.
    Internal,
    /// A joint between two pieces.
    External,
}

/// Undirected endpoint graph of a layout.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityGraph {
    graph: UnGraphMap<EndpointRef, EdgeKind>,
}

impl ConnectivityGraph {
    /// Match endpoints of `layout` and build its graph.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::AmbiguousEndpoint`] if any endpoint has more
    /// than one match. No graph is produced in that case.
    pub fn build(layout: &Layout, threshold: f64) -> Result<Self, LayoutError> {
        let matcher = EndpointMatcher::new(layout, threshold);
        let external = matcher.external_connections(layout)?;
        Ok(Self::from_connections(layout, &external))
    }

    /// Build the graph from the pieces' connection maps plus already
    /// matched external connections.
    #[must_use]
    pub fn from_connections(layout: &Layout, external: &[(EndpointRef, EndpointRef)]) -> Self {
        let mut graph = UnGraphMap::new();
        for piece in layout.pieces() {
            for from in 0..piece.endpoints().len() {
                for &to in piece.connected(from) {
                    let (a, b) = edge_key(
                        EndpointRef::new(piece.id(), from),
                        EndpointRef::new(piece.id(), to),
                    );
                    if !graph.contains_edge(a, b) {
                        graph.add_edge(a, b, EdgeKind::Internal);
                    }
                }
            }
        }
        for &(a, b) in external {
            let (a, b) = edge_key(a, b);
            if !graph.contains_edge(a, b) {
                graph.add_edge(a, b, EdgeKind::External);
            }
        }
        Self { graph }
    }

    /// Neighbours of `endpoint` in insertion order; empty if the endpoint
    /// is not a vertex.
    pub fn neighbors(&self, endpoint: EndpointRef) -> impl Iterator<Item = EndpointRef> + '_ {
        self.graph.neighbors(endpoint)
    }

    /// Number of neighbours of `endpoint`.
    #[must_use]
    pub fn degree(&self, endpoint: EndpointRef) -> usize {
        self.graph.neighbors(endpoint).count()
    }

    /// Whether `a` and `b` are adjacent (in either order).
    #[must_use]
    pub fn contains_edge(&self, a: EndpointRef, b: EndpointRef) -> bool {
        self.graph.contains_edge(a, b)
    }

    /// Kind of the edge between `a` and `b`, if any.
    #[must_use]
    pub fn edge_kind(&self, a: EndpointRef, b: EndpointRef) -> Option<EdgeKind> {
        self.graph.edge_weight(a, b).copied()
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = EndpointRef> + '_ {
        self.graph.nodes()
    }

    /// Every edge once, as `(lower, higher, kind)`.
    pub fn edges(&self) -> impl Iterator<Item = (EndpointRef, EndpointRef, EdgeKind)> + '_ {
        self.graph.all_edges().map(|(a, b, &kind)| {
            let (a, b) = edge_key(a, b);
            (a, b, kind)
        })
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of undirected edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of edges of `kind`.
    #[must_use]
    pub fn count_edges(&self, kind: EdgeKind) -> usize {
        self.graph.all_edges().filter(|(_, _, k)| **k == kind).count()
    }

    /// The traversal start: the first vertex inserted.
    #[must_use]
    pub fn start_vertex(&self) -> Option<EndpointRef> {
        self.graph.nodes().next()
    }

    /// Returns `true` if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Reject vertices with more neighbours than their piece can have:
    /// two for endpoints of plain pieces and turnout branches, three for
    /// a turnout's common endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::MalformedGraph`] for the first offending
    /// vertex, or [`LayoutError::UnknownPiece`] for a vertex whose piece
    /// is not in `layout`.
    pub fn validate(&self, layout: &Layout) -> Result<(), LayoutError> {
        for endpoint in self.graph.nodes() {
            let piece = layout.piece(endpoint.piece)?;
            let limit = if piece.is_turnout() && endpoint.index == COMMON_ENDPOINT {
                3
            } else {
                2
            };
            let degree = self.degree(endpoint);
            if degree > limit {
                return Err(LayoutError::MalformedGraph { endpoint, degree });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::PieceId;

    fn ep(piece: u32, index: usize) -> EndpointRef {
        EndpointRef::new(PieceId(piece), index)
    }

    fn layout(pieces: &[(&str, f64, f64)]) -> Layout {
        let mut layout = Layout::new(Catalog::builtin());
        for &(name, x, y) in pieces {
            layout.add_piece(name, x, y).unwrap();
        }
        layout
    }

    #[test]
    fn two_straights_share_one_external_edge() {
        let l = layout(&[("straight20", 0.0, 0.0), ("straight40", 20.0, 0.0)]);
        let g = ConnectivityGraph::build(&l, 2.0).unwrap();
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.count_edges(EdgeKind::External), 1);
        assert_eq!(g.edge_kind(ep(0, 1), ep(1, 0)), Some(EdgeKind::External));
        assert_eq!(g.edge_kind(ep(1, 1), ep(1, 0)), Some(EdgeKind::Internal));
        assert_eq!(g.start_vertex(), Some(ep(0, 0)));
    }

    #[test]
    fn graph_is_symmetric() {
        let l = layout(&[
            ("straight20", 0.0, 0.0),
            ("lhPoints", 20.0, 0.0),
            ("straight40", 40.0, 0.0),
            ("straight40", 40.0, -10.0),
        ]);
        let g = ConnectivityGraph::build(&l, 2.0).unwrap();
        for a in g.vertices() {
            for b in g.neighbors(a) {
                assert!(g.neighbors(b).any(|n| n == a), "{a} -> {b} not mirrored");
                assert!(g.contains_edge(b, a));
            }
        }
    }

    #[test]
    fn turnout_has_no_branch_to_branch_edge() {
        let l = layout(&[("rhPoints", 0.0, 0.0)]);
        let g = ConnectivityGraph::build(&l, 2.0).unwrap();
        assert_eq!(g.edge_count(), 2);
        assert!(g.contains_edge(ep(0, 0), ep(0, 1)));
        assert!(g.contains_edge(ep(0, 0), ep(0, 2)));
        assert!(!g.contains_edge(ep(0, 1), ep(0, 2)));
        assert_eq!(g.degree(ep(0, 0)), 2);
    }

    #[test]
    fn ambiguous_layout_builds_no_graph() {
        let l = layout(&[
            ("straight20", 0.0, 0.0),
            ("straight20", 20.0, 0.0),
            ("straight20", 20.0, 1.0),
        ]);
        assert!(matches!(
            ConnectivityGraph::build(&l, 2.0).unwrap_err(),
            LayoutError::AmbiguousEndpoint { .. }
        ));
    }

    #[test]
    fn neighbors_of_unknown_vertex_is_empty() {
        let g = ConnectivityGraph::default();
        assert!(g.is_empty());
        assert_eq!(g.start_vertex(), None);
        assert_eq!(g.neighbors(ep(9, 0)).count(), 0);
    }

    #[test]
    fn closed_loop_validates() {
        let mut l = Layout::new(Catalog::builtin());
        for (x, y, r) in [(0.0, 0.0, 0.0), (40.0, 40.0, 90.0), (0.0, 80.0, 180.0), (-40.0, 40.0, 270.0)] {
            let id = l.add_piece("rad40curve90", x, y).unwrap();
            l.rotate_piece(id, r).unwrap();
        }
        let g = ConnectivityGraph::build(&l, 2.0).unwrap();
        assert_eq!(g.count_edges(EdgeKind::External), 4);
        assert!(g.vertices().all(|v| g.degree(v) == 2));
        g.validate(&l).unwrap();
    }

    #[test]
    fn over_connected_endpoint_is_malformed() {
        let l = layout(&[
            ("straight20", 0.0, 0.0),
            ("straight20", 20.0, 0.0),
            ("straight20", -20.0, 0.0),
        ]);
        // Hand-made joints giving piece-0_1 two external partners.
        let external = [(ep(0, 1), ep(1, 0)), (ep(0, 1), ep(2, 1)), (ep(0, 0), ep(2, 1))];
        let g = ConnectivityGraph::from_connections(&l, &external);
        assert!(matches!(
            g.validate(&l).unwrap_err(),
            LayoutError::MalformedGraph { endpoint, degree: 3 } if endpoint == ep(0, 1)
        ));
    }
}
