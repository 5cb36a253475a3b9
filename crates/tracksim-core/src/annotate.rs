//! World-point annotation: walk the connectivity graph from a start
//! vertex and resolve every rail crossed into layout-space points.
//!
//! The walk is depth-first with an explicit stack and a set of visited
//! undirected edges, so cycles terminate and every edge is processed
//! once. Each step along an internal edge stores the resolved points on
//! the owning piece under `(from, to)` together with their exact reverse
//! under `(to, from)`. A turnout therefore ends up with `(0, 1)`, `(0, 2)`
//! and their reverses, never `(1, 2)`.

use std::collections::HashSet;

use crate::graph::ConnectivityGraph;
use crate::layout::Layout;
use crate::resolve::resolve_segment;
use crate::types::{BoundingBox, EndpointRef, LayoutConfig, LayoutError, PieceId, edge_key};

/// Counts from one annotation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annotation {
    /// Bounds of every resolved world point.
    pub bounds: BoundingBox,
    /// Undirected rails resolved (each stored in both directions).
    pub segments: usize,
    /// World points stored in the forward direction of each rail.
    pub points: usize,
}

/// Resolve world points for every rail reachable from `start`.
///
/// Existing annotations are discarded first.
///
/// # Errors
///
/// Returns [`LayoutError::DisconnectedLayout`] if any piece is left
/// without world points, and propagates resolver errors
/// ([`LayoutError::MissingSegment`], markup errors).
pub fn annotate_world_points(
    layout: &mut Layout,
    graph: &ConnectivityGraph,
    start: EndpointRef,
    config: &LayoutConfig,
) -> Result<Annotation, LayoutError> {
    layout.clear_annotations();

    let mut annotation = Annotation {
        bounds: BoundingBox::empty(),
        segments: 0,
        points: 0,
    };
    let mut visited: HashSet<(EndpointRef, EndpointRef)> = HashSet::new();
    let mut stack = vec![start];

    while let Some(from) = stack.pop() {
        let neighbors: Vec<EndpointRef> = graph.neighbors(from).collect();
        // Reversed so the first neighbour is explored first.
        for &to in neighbors.iter().rev() {
            if !visited.insert(edge_key(from, to)) {
                continue;
            }
            if from.same_piece(to) {
                let piece = layout.piece(from.piece)?;
                let resolved = resolve_segment(piece, from.index, to.index, config)?;
                annotation.bounds.merge(&resolved.bounds);
                annotation.segments += 1;
                annotation.points += resolved.points.len();
                layout
                    .piece_mut(from.piece)?
                    .store_segment(from.index, to.index, resolved.points);
            }
            stack.push(to);
        }
    }

    let unreached: Vec<PieceId> = layout
        .pieces()
        .iter()
        .filter(|p| !p.is_annotated())
        .map(|p| p.id())
        .collect();
    if !unreached.is_empty() {
        log::warn!("{} piece(s) unreachable from {start}", unreached.len());
        return Err(LayoutError::DisconnectedLayout { unreached });
    }

    log::debug!(
        "annotated {} segments ({} points) from {start}",
        annotation.segments,
        annotation.points
    );
    Ok(annotation)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::Point;

    fn build(pieces: &[(&str, f64, f64)]) -> (Layout, ConnectivityGraph) {
        let mut layout = Layout::new(Catalog::builtin());
        for &(name, x, y) in pieces {
            layout.add_piece(name, x, y).unwrap();
        }
        let graph = ConnectivityGraph::build(&layout, 2.0).unwrap();
        (layout, graph)
    }

    #[test]
    fn annotates_both_directions_of_every_rail() {
        let (mut layout, graph) = build(&[("straight20", 0.0, 0.0), ("straight40", 20.0, 0.0)]);
        let start = graph.start_vertex().unwrap();
        let a = annotate_world_points(&mut layout, &graph, start, &LayoutConfig::default()).unwrap();
        assert_eq!(a.segments, 2);
        assert_eq!(a.points, 21 + 41);
        assert!((a.bounds.min_x).abs() < 1e-12);
        assert!((a.bounds.max_x - 60.0).abs() < 1e-12);

        for piece in layout.pieces() {
            let forward = piece.world_points(0, 1).unwrap();
            let backward = piece.world_points(1, 0).unwrap();
            assert_eq!(&forward.reversed(), backward);
        }
    }

    #[test]
    fn turnout_gets_common_to_branch_segments_only() {
        let (mut layout, graph) = build(&[("lhPoints", 0.0, 0.0)]);
        let start = graph.start_vertex().unwrap();
        annotate_world_points(&mut layout, &graph, start, &LayoutConfig::default()).unwrap();
        let piece = &layout.pieces()[0];
        let mut keys: Vec<(usize, usize)> = piece.segments().map(|(k, _)| k).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![(0, 1), (0, 2), (1, 0), (2, 0)]);
        let diverging = piece.world_points(0, 2).unwrap();
        assert!(diverging.last().unwrap().distance(Point::new(20.0, -10.0)) < 1e-6);
    }

    #[test]
    fn cycles_terminate() {
        let mut layout = Layout::new(Catalog::builtin());
        for (x, y, r) in [(0.0, 0.0, 0.0), (40.0, 40.0, 90.0), (0.0, 80.0, 180.0), (-40.0, 40.0, 270.0)] {
            let id = layout.add_piece("rad40curve90", x, y).unwrap();
            layout.rotate_piece(id, r).unwrap();
        }
        let graph = ConnectivityGraph::build(&layout, 2.0).unwrap();
        let start = graph.start_vertex().unwrap();
        let a = annotate_world_points(&mut layout, &graph, start, &LayoutConfig::default()).unwrap();
        assert_eq!(a.segments, 4);
        assert!((a.bounds.width() - 80.0).abs() < 1e-6);
        assert!((a.bounds.height() - 80.0).abs() < 1e-6);
    }

    #[test]
    fn unreachable_piece_is_reported() {
        let (mut layout, graph) = build(&[("straight20", 0.0, 0.0), ("straight20", 100.0, 0.0)]);
        let start = graph.start_vertex().unwrap();
        let err =
            annotate_world_points(&mut layout, &graph, start, &LayoutConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::DisconnectedLayout { ref unreached } if *unreached == vec![PieceId(1)]
        ));
    }
}
