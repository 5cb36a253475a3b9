//! Segment geometry resolver: discretize one rail element of a placed
//! piece into layout-space points.
//!
//! Sampling runs at fixed arc-length steps from `0` while strictly below
//! the element length. The exact start and end points are then added if
//! sampling did not land on them, so a resolved sequence always begins
//! and ends on the placed element's endpoints regardless of step size.

use crate::geometry::{Element, Placement};
use crate::layout::PieceInstance;
use crate::types::{BoundingBox, LayoutConfig, LayoutError, Point, Polyline};

/// An element traversed in a chosen direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedElement {
    element: Element,
    reversed: bool,
}

impl OrientedElement {
    /// Traverse `element` from its start.
    #[must_use]
    pub const fn forward(element: Element) -> Self {
        Self {
            element,
            reversed: false,
        }
    }

    /// Traverse `element` from its end.
    #[must_use]
    pub const fn backward(element: Element) -> Self {
        Self {
            element,
            reversed: true,
        }
    }

    /// Whether traversal runs against the element's own direction.
    #[must_use]
    pub const fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Total arc length.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.element.length()
    }

    /// Point at arc-length `length` along the traversal direction.
    #[must_use]
    pub fn point_at_length(&self, length: f64) -> Point {
        if self.reversed {
            self.element.point_at_length(self.length() - length)
        } else {
            self.element.point_at_length(length)
        }
    }
}

/// Find the element joining local points `from` and `to`, in either
/// orientation, with coordinates equal within `tolerance`.
#[must_use]
pub fn find_element(
    elements: &[Element],
    from: Point,
    to: Point,
    tolerance: f64,
) -> Option<OrientedElement> {
    elements.iter().find_map(|&element| {
        let start = element.start();
        let end = element.end();
        if start.approx_eq(from, tolerance) && end.approx_eq(to, tolerance) {
            Some(OrientedElement::forward(element))
        } else if start.approx_eq(to, tolerance) && end.approx_eq(from, tolerance) {
            Some(OrientedElement::backward(element))
        } else {
            None
        }
    })
}

/// A discretized element in layout space.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSegment {
    /// Points from the traversal start to its end.
    pub points: Polyline,
    /// Bounds of `points`.
    pub bounds: BoundingBox,
}

/// Sample `element` every `step` units and carry the samples into layout
/// space through `placement`.
#[must_use]
pub fn resolve(placement: &Placement, element: &OrientedElement, step: f64) -> ResolvedSegment {
    let length = element.length();
    let world = |l: f64| placement.to_world(element.point_at_length(l));

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = if step > 0.0 && length > 0.0 {
        (length / step).ceil() as usize
    } else {
        0
    };

    #[allow(clippy::cast_precision_loss)]
    let offset = |i: usize| i as f64 * step;

    let mut points: Vec<Point> = (0..steps)
        .map(offset)
        .take_while(|&l| l < length)
        .map(world)
        .collect();

    let first = world(0.0);
    if points.first() != Some(&first) {
        points.insert(0, first);
    }
    let last = world(length);
    if points.last() != Some(&last) {
        points.push(last);
    }

    let mut bounds = BoundingBox::empty();
    for &p in &points {
        bounds.include(p);
    }

    ResolvedSegment {
        points: Polyline::new(points),
        bounds,
    }
}

/// Resolve the rail of `piece` that runs from endpoint `from` to endpoint
/// `to`.
///
/// # Errors
///
/// Returns [`LayoutError::MissingSegment`] if no element of the piece
/// joins the two endpoints, and propagates markup errors.
pub fn resolve_segment(
    piece: &PieceInstance,
    from: usize,
    to: usize,
    config: &LayoutConfig,
) -> Result<ResolvedSegment, LayoutError> {
    let missing = || LayoutError::MissingSegment {
        piece: piece.id(),
        from,
        to,
    };
    let endpoints = piece.endpoints();
    let (&a, &b) = endpoints
        .get(from)
        .zip(endpoints.get(to))
        .ok_or_else(missing)?;
    let elements = piece.piece_type().elements()?;
    let oriented =
        find_element(&elements, a, b, config.endpoint_tolerance).ok_or_else(missing)?;
    Ok(resolve(&piece.placement(), &oriented, config.sample_step))
}
