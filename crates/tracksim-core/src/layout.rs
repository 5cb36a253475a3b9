//! The layout model: placed pieces, their editable state, and the
//! persisted form.
//!
//! A [`PieceInstance`] is a typed record of one placed piece. Its
//! endpoints and connection map come from the shared [`PieceType`]; its
//! placement, turnout branch, and resolved world points are its own.
//! World points are derived data: any edit that changes topology (add,
//! remove, move, rotate) clears them on every piece, and the layout must
//! be rebuilt before traversal resumes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, PieceType};
use crate::geometry::Placement;
use crate::resolve::{OrientedElement, resolve};
use crate::turnout::Branch;
use crate::types::{BoundingBox, LayoutError, PieceId, Point, Polyline};

/// One placed piece.
#[derive(Debug, Clone)]
pub struct PieceInstance {
    id: PieceId,
    kind: Arc<PieceType>,
    placement: Placement,
    active_branch: Option<Branch>,
    world_points: BTreeMap<(usize, usize), Polyline>,
}

impl PieceInstance {
    /// Place a piece of type `kind`. Turnouts start on [`Branch::First`].
    #[must_use]
    pub fn new(id: PieceId, kind: Arc<PieceType>, placement: Placement) -> Self {
        let active_branch = kind.is_turnout().then_some(Branch::First);
        Self {
            id,
            kind,
            placement,
            active_branch,
            world_points: BTreeMap::new(),
        }
    }

    /// Unique identifier.
    #[must_use]
    pub const fn id(&self) -> PieceId {
        self.id
    }

    /// The catalog type this piece was placed from.
    #[must_use]
    pub fn piece_type(&self) -> &PieceType {
        &self.kind
    }

    /// Current placement.
    #[must_use]
    pub const fn placement(&self) -> Placement {
        self.placement
    }

    /// Local endpoint coordinates, inherited from the type.
    #[must_use]
    pub fn endpoints(&self) -> &[Point] {
        &self.kind.endpoints
    }

    /// Endpoint indices reachable from `index` inside the piece.
    #[must_use]
    pub fn connected(&self, index: usize) -> &[usize] {
        self.kind.connected(index)
    }

    /// Whether this piece is a turnout.
    #[must_use]
    pub fn is_turnout(&self) -> bool {
        self.kind.is_turnout()
    }

    /// Active branch of a turnout; `None` for plain pieces.
    #[must_use]
    pub const fn active_branch(&self) -> Option<Branch> {
        self.active_branch
    }

    /// Endpoint `index` in layout coordinates.
    #[must_use]
    pub fn world_endpoint(&self, index: usize) -> Option<Point> {
        self.endpoints()
            .get(index)
            .map(|&local| self.placement.to_world(local))
    }

    /// Resolved points running from endpoint `from` to endpoint `to`.
    #[must_use]
    pub fn world_points(&self, from: usize, to: usize) -> Option<&Polyline> {
        self.world_points.get(&(from, to))
    }

    /// Every resolved directed segment, keyed by `(from, to)`.
    pub fn segments(&self) -> impl Iterator<Item = ((usize, usize), &Polyline)> {
        self.world_points.iter().map(|(&key, points)| (key, points))
    }

    /// Whether annotation has stored any segment on this piece.
    #[must_use]
    pub fn is_annotated(&self) -> bool {
        !self.world_points.is_empty()
    }

    /// Store `points` for `from -> to` and their exact reverse for
    /// `to -> from`.
    pub(crate) fn store_segment(&mut self, from: usize, to: usize, points: Polyline) {
        self.world_points.insert((to, from), points.reversed());
        self.world_points.insert((from, to), points);
    }

    pub(crate) fn clear_world_points(&mut self) {
        self.world_points.clear();
    }

    /// Set the active branch of a turnout.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NotATurnout`] for plain pieces.
    pub fn set_active_branch(&mut self, branch: Branch) -> Result<(), LayoutError> {
        match self.active_branch {
            Some(_) => {
                self.active_branch = Some(branch);
                Ok(())
            }
            None => Err(LayoutError::NotATurnout(self.id)),
        }
    }

    /// Flip a turnout to its other branch, returning the new branch.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NotATurnout`] for plain pieces.
    pub fn toggle_branch(&mut self) -> Result<Branch, LayoutError> {
        let branch = self
            .active_branch
            .ok_or(LayoutError::NotATurnout(self.id))?
            .toggled();
        self.active_branch = Some(branch);
        log::debug!("turnout {} switched to endpoint {}", self.id, branch.index());
        Ok(branch)
    }

    /// The persisted form of this piece.
    #[must_use]
    pub fn record(&self) -> LayoutRecord {
        LayoutRecord {
            id: self.id,
            piece_type: self.kind.name.clone(),
            x: self.placement.x,
            y: self.placement.y,
            rotation: self.placement.rotation,
        }
    }
}

/// Persisted form of one piece: identity, type, and placement only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRecord {
    /// Piece identifier (`piece-N`).
    pub id: PieceId,
    /// Catalog type name.
    #[serde(rename = "type")]
    pub piece_type: String,
    /// Horizontal translation.
    pub x: f64,
    /// Vertical translation.
    pub y: f64,
    /// Rotation in degrees.
    #[serde(default)]
    pub rotation: f64,
}

/// Persisted layout: piece records plus the id counter.
///
/// Turnout state and world points are derived after load, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedLayout {
    /// Pieces in placement order.
    pub pieces: Vec<LayoutRecord>,
    /// Next numeric id to hand out.
    #[serde(default)]
    pub next_id: u32,
}

/// All placed pieces of a layout, in placement order.
#[derive(Debug, Clone)]
pub struct Layout {
    catalog: Catalog,
    pieces: Vec<PieceInstance>,
    next_id: u32,
}

impl Layout {
    /// An empty layout placing pieces from `catalog`.
    #[must_use]
    pub const fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            pieces: Vec::new(),
            next_id: 0,
        }
    }

    /// The catalog pieces are placed from.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Pieces in placement order.
    #[must_use]
    pub fn pieces(&self) -> &[PieceInstance] {
        &self.pieces
    }

    /// Number of placed pieces.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pieces.len()
    }

    /// Returns `true` if nothing has been placed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Look up a piece.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] if `id` is not placed.
    pub fn piece(&self, id: PieceId) -> Result<&PieceInstance, LayoutError> {
        self.pieces
            .iter()
            .find(|p| p.id == id)
            .ok_or(LayoutError::UnknownPiece(id))
    }

    pub(crate) fn piece_mut(&mut self, id: PieceId) -> Result<&mut PieceInstance, LayoutError> {
        self.pieces
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(LayoutError::UnknownPiece(id))
    }

    /// Place a new piece of `type_name` at `(x, y)` with no rotation.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPieceType`] if the catalog has no
    /// such type.
    pub fn add_piece(&mut self, type_name: &str, x: f64, y: f64) -> Result<PieceId, LayoutError> {
        let id = PieceId(self.next_id);
        self.insert(id, type_name, Placement::new(x, y, 0.0))?;
        Ok(id)
    }

    /// Place a piece with an explicit id, e.g. when loading a saved layout.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPieceType`] for an unknown type and
    /// [`LayoutError::InvalidPieceId`] if `id` is already placed.
    pub fn insert(
        &mut self,
        id: PieceId,
        type_name: &str,
        placement: Placement,
    ) -> Result<(), LayoutError> {
        if self.pieces.iter().any(|p| p.id == id) {
            return Err(LayoutError::InvalidPieceId(format!("{id} is already placed")));
        }
        let kind = self.catalog.get(type_name)?;
        self.clear_annotations();
        self.pieces.push(PieceInstance::new(id, kind, placement));
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        Ok(())
    }

    /// Remove a piece.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] if `id` is not placed.
    pub fn remove_piece(&mut self, id: PieceId) -> Result<PieceInstance, LayoutError> {
        let position = self
            .pieces
            .iter()
            .position(|p| p.id == id)
            .ok_or(LayoutError::UnknownPiece(id))?;
        self.clear_annotations();
        Ok(self.pieces.remove(position))
    }

    /// Move a piece to `(x, y)`, keeping its rotation.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] if `id` is not placed.
    pub fn move_piece(&mut self, id: PieceId, x: f64, y: f64) -> Result<(), LayoutError> {
        let piece = self.piece_mut(id)?;
        piece.placement = Placement::new(x, y, piece.placement.rotation);
        self.clear_annotations();
        Ok(())
    }

    /// Rotate a piece by `delta` degrees, returning the normalized rotation.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] if `id` is not placed.
    pub fn rotate_piece(&mut self, id: PieceId, delta: f64) -> Result<f64, LayoutError> {
        let piece = self.piece_mut(id)?;
        piece.placement = piece.placement.rotated(delta);
        let rotation = piece.placement.rotation;
        self.clear_annotations();
        Ok(rotation)
    }

    /// Flip a turnout. Does not change topology, so annotations are kept.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] or [`LayoutError::NotATurnout`].
    pub fn toggle_turnout(&mut self, id: PieceId) -> Result<Branch, LayoutError> {
        self.piece_mut(id)?.toggle_branch()
    }

    /// Set a turnout to a specific branch.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] or [`LayoutError::NotATurnout`].
    pub fn set_turnout(&mut self, id: PieceId, branch: Branch) -> Result<(), LayoutError> {
        self.piece_mut(id)?.set_active_branch(branch)
    }

    /// Drop resolved world points from every piece.
    pub fn clear_annotations(&mut self) {
        for piece in &mut self.pieces {
            piece.clear_world_points();
        }
    }

    /// Bounds of every rail of every piece in layout space, without
    /// needing a connectivity graph.
    ///
    /// # Errors
    ///
    /// Propagates markup errors from the piece types.
    pub fn outline_bounding_box(&self, sample_step: f64) -> Result<BoundingBox, LayoutError> {
        let mut bounds = BoundingBox::empty();
        for piece in &self.pieces {
            for element in piece.piece_type().elements()? {
                let resolved = resolve(
                    &piece.placement,
                    &OrientedElement::forward(element),
                    sample_step,
                );
                bounds.merge(&resolved.bounds);
            }
        }
        Ok(bounds)
    }

    /// The persisted form of this layout.
    #[must_use]
    pub fn to_saved(&self) -> SavedLayout {
        SavedLayout {
            pieces: self.pieces.iter().map(PieceInstance::record).collect(),
            next_id: self.next_id,
        }
    }

    /// Rebuild a layout from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPieceType`] or
    /// [`LayoutError::InvalidPieceId`] for a bad record.
    pub fn from_saved(catalog: Catalog, saved: &SavedLayout) -> Result<Self, LayoutError> {
        let mut layout = Self::new(catalog);
        for record in &saved.pieces {
            layout.insert(
                record.id,
                &record.piece_type,
                Placement::new(record.x, record.y, record.rotation),
            )?;
        }
        layout.next_id = layout.next_id.max(saved.next_id);
        Ok(layout)
    }

    /// Parse a saved layout from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Json`] for malformed JSON, otherwise as
    /// [`from_saved`](Self::from_saved).
    pub fn from_json(catalog: Catalog, json: &str) -> Result<Self, LayoutError> {
        let saved: SavedLayout = serde_json::from_str(json)?;
        Self::from_saved(catalog, &saved)
    }

    /// Serialize the persisted form to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string_pretty(&self.to_saved())?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new(Catalog::builtin())
    }

    #[test]
    fn add_piece_assigns_sequential_ids() {
        let mut l = layout();
        let a = l.add_piece("straight20", 0.0, 0.0).unwrap();
        let b = l.add_piece("straight40", 20.0, 0.0).unwrap();
        assert_eq!(a, PieceId(0));
        assert_eq!(b, PieceId(1));
        assert_eq!(l.len(), 2);
        assert_eq!(l.piece(b).unwrap().piece_type().name, "straight40");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut l = layout();
        assert!(matches!(
            l.add_piece("viaduct", 0.0, 0.0).unwrap_err(),
            LayoutError::UnknownPieceType(_)
        ));
        assert!(l.is_empty());
    }

    #[test]
    fn turnouts_start_on_first_branch() {
        let mut l = layout();
        let t = l.add_piece("lhPoints", 0.0, 0.0).unwrap();
        let s = l.add_piece("straight20", 0.0, 0.0).unwrap();
        assert_eq!(l.piece(t).unwrap().active_branch(), Some(Branch::First));
        assert_eq!(l.piece(s).unwrap().active_branch(), None);
    }

    #[test]
    fn toggle_turnout_flips_and_rejects_plain_pieces() {
        let mut l = layout();
        let t = l.add_piece("rhPoints", 0.0, 0.0).unwrap();
        let s = l.add_piece("straight20", 50.0, 0.0).unwrap();
        assert_eq!(l.toggle_turnout(t).unwrap(), Branch::Second);
        assert_eq!(l.toggle_turnout(t).unwrap(), Branch::First);
        assert!(matches!(
            l.toggle_turnout(s).unwrap_err(),
            LayoutError::NotATurnout(id) if id == s
        ));
    }

    #[test]
    fn world_endpoint_applies_placement() {
        let mut l = layout();
        let id = l.add_piece("straight20", 10.0, 10.0).unwrap();
        l.rotate_piece(id, 90.0).unwrap();
        let end = l.piece(id).unwrap().world_endpoint(1).unwrap();
        assert!(end.distance(Point::new(10.0, 30.0)) < 1e-9);
        assert!(l.piece(id).unwrap().world_endpoint(2).is_none());
    }

    #[test]
    fn rotate_normalizes_and_snaps() {
        let mut l = layout();
        let id = l.add_piece("straight20", 0.0, 0.0).unwrap();
        let r = l.rotate_piece(id, -Placement::ROTATION_STEP).unwrap();
        assert!((r - 315.0).abs() < 1e-12);
    }

    #[test]
    fn store_segment_keeps_exact_reverse() {
        let mut l = layout();
        let id = l.add_piece("straight20", 0.0, 0.0).unwrap();
        let points = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(20.0, 0.0)]);
        l.piece_mut(id).unwrap().store_segment(0, 1, points.clone());
        let piece = l.piece(id).unwrap();
        assert_eq!(piece.world_points(0, 1), Some(&points));
        assert_eq!(piece.world_points(1, 0), Some(&points.reversed()));
        assert_eq!(piece.segments().count(), 2);
    }

    #[test]
    fn topology_edits_clear_annotations() {
        let mut l = layout();
        let a = l.add_piece("straight20", 0.0, 0.0).unwrap();
        let b = l.add_piece("straight20", 20.0, 0.0).unwrap();
        let points = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(20.0, 0.0)]);
        l.piece_mut(a).unwrap().store_segment(0, 1, points.clone());

        l.toggle_turnout(a).unwrap_err();
        assert!(l.piece(a).unwrap().is_annotated());

        l.move_piece(b, 25.0, 0.0).unwrap();
        assert!(!l.piece(a).unwrap().is_annotated());

        l.piece_mut(a).unwrap().store_segment(0, 1, points);
        l.remove_piece(b).unwrap();
        assert!(!l.piece(a).unwrap().is_annotated());
        assert!(matches!(
            l.remove_piece(b).unwrap_err(),
            LayoutError::UnknownPiece(_)
        ));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut l = layout();
        l.insert(PieceId(4), "straight20", Placement::default()).unwrap();
        assert!(l.insert(PieceId(4), "straight40", Placement::default()).is_err());
        // The counter moves past explicit ids.
        assert_eq!(l.add_piece("straight20", 0.0, 0.0).unwrap(), PieceId(5));
    }

    #[test]
    fn saved_layout_round_trips() {
        let mut l = layout();
        l.add_piece("straight20", 0.0, 0.0).unwrap();
        let t = l.add_piece("lhPoints", 20.0, 0.0).unwrap();
        l.rotate_piece(t, 45.0).unwrap();
        l.toggle_turnout(t).unwrap();

        let json = l.to_json().unwrap();
        assert!(json.contains("\"type\": \"lhPoints\""));
        assert!(json.contains("\"piece-1\""));

        let restored = Layout::from_json(Catalog::builtin(), &json).unwrap();
        assert_eq!(restored.to_saved(), l.to_saved());
        // Turnout state is derived, not persisted.
        assert_eq!(restored.piece(t).unwrap().active_branch(), Some(Branch::First));
    }

    #[test]
    fn saved_layout_accepts_missing_rotation_and_counter() {
        let json = r#"{"pieces": [{"id": "piece-3", "type": "straight40", "x": 5, "y": 6}]}"#;
        let mut l = Layout::from_json(Catalog::builtin(), json).unwrap();
        assert!(l.piece(PieceId(3)).unwrap().placement().rotation.abs() < f64::EPSILON);
        assert_eq!(l.add_piece("straight20", 0.0, 0.0).unwrap(), PieceId(4));
    }

    #[test]
    fn outline_bounding_box_covers_curves() {
        let mut l = layout();
        l.add_piece("rad40curve90", 0.0, 0.0).unwrap();
        let bb = l.outline_bounding_box(1.0).unwrap();
        assert!(bb.min_x.abs() < 1e-9);
        assert!(bb.min_y.abs() < 1e-9);
        assert!((bb.max_x - 40.0).abs() < 1e-6);
        assert!((bb.max_y - 40.0).abs() < 1e-6);
    }
}
