//! Endpoint matcher: find the endpoint of another piece that a given
//! endpoint snaps to.
//!
//! World-space endpoints of every piece are bulk-loaded into an R-tree
//! once per build; each query is then a radius search instead of a scan
//! over all pieces. Two endpoints match when their distance is strictly
//! below the threshold. Endpoints of the querying piece itself never
//! match.

use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::layout::Layout;
use crate::types::{EndpointRef, LayoutError, Point};

/// An R-tree entry: endpoint position with its reference.
type IndexedEndpoint = GeomWithData<[f64; 2], EndpointRef>;

/// Spatial index over the world-space endpoints of a layout.
pub struct EndpointMatcher {
    tree: RTree<IndexedEndpoint>,
    threshold: f64,
}

impl EndpointMatcher {
    /// Index every endpoint of every piece in `layout`.
    #[must_use]
    pub fn new(layout: &Layout, threshold: f64) -> Self {
        let entries: Vec<IndexedEndpoint> = layout
            .pieces()
            .iter()
            .flat_map(|piece| {
                (0..piece.endpoints().len()).filter_map(move |index| {
                    piece.world_endpoint(index).map(|p| {
                        GeomWithData::new([p.x, p.y], EndpointRef::new(piece.id(), index))
                    })
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            threshold,
        }
    }

    /// Number of indexed endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// The endpoint of another piece that `endpoint` (at world position
    /// `world`) connects to, if any.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::AmbiguousEndpoint`] if more than one
    /// endpoint of other pieces lies within the threshold.
    pub fn find_match(
        &self,
        endpoint: EndpointRef,
        world: Point,
    ) -> Result<Option<EndpointRef>, LayoutError> {
        let mut candidates: Vec<EndpointRef> = self
            .tree
            .locate_within_distance([world.x, world.y], self.threshold * self.threshold)
            .filter(|entry| entry.data.piece != endpoint.piece)
            .filter(|entry| {
                let [x, y] = *entry.geom();
                Point::new(x, y).distance(world) < self.threshold
            })
            .map(|entry| entry.data)
            .collect();
        candidates.sort_unstable();

        match candidates.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(*only)),
            _ => Err(LayoutError::AmbiguousEndpoint {
                endpoint,
                candidates,
            }),
        }
    }

    /// Every external connection of `layout`, each listed once with its
    /// lower endpoint first.
    ///
    /// # Errors
    ///
    /// Propagates [`LayoutError::AmbiguousEndpoint`] from
    /// [`find_match`](Self::find_match).
    pub fn external_connections(
        &self,
        layout: &Layout,
    ) -> Result<Vec<(EndpointRef, EndpointRef)>, LayoutError> {
        let mut connections = Vec::new();
        for piece in layout.pieces() {
            for index in 0..piece.endpoints().len() {
                let endpoint = EndpointRef::new(piece.id(), index);
                let Some(world) = piece.world_endpoint(index) else {
                    continue;
                };
                if let Some(other) = self.find_match(endpoint, world)?
                    && endpoint < other
                {
                    connections.push((endpoint, other));
                }
            }
        }
        Ok(connections)
    }
}
