//! Piece geometry: straight and arc elements in piece-local space, the
//! markup parser that produces them, and the placement transform that
//! carries local points into layout space.
//!
//! Every element exposes the same two operations, [`Element::length`]
//! and [`Element::point_at_length`], so the resolver can sample straights
//! and arcs uniformly.
//!
//! Piece markup is a fragment of SVG: `<line x1 y1 x2 y2/>` for straights
//! and `<path d="M x y A r r 0 large sweep x y"/>` for arcs. Other
//! attributes (stroke, fill) are ignored.

use std::f64::consts::TAU;

use geo::{AffineTransform, Coord};
use serde::{Deserialize, Serialize};
use svg::node::element::path::{Command, Data, Position};
use svg::node::element::tag::Type;
use svg::parser::Event;

use crate::types::{LayoutError, Point};

/// Convert a [`Point`] to a [`geo::Coord`].
const fn point_to_coord(p: Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Convert a [`geo::Coord`] to a [`Point`].
const fn coord_to_point(c: Coord<f64>) -> Point {
    Point { x: c.x, y: c.y }
}

/// Placement of a piece in the layout: `translate(x, y) rotate(rotation)`.
///
/// Rotation is in degrees, clockwise on screen (SVG y-down convention).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Placement {
    /// Horizontal translation.
    pub x: f64,
    /// Vertical translation.
    pub y: f64,
    /// Rotation in degrees, normalized to `[0, 360)`.
    pub rotation: f64,
}

impl Placement {
    /// Rotation edits snap by this many degrees.
    pub const ROTATION_STEP: f64 = 45.0;

    /// Create a placement, normalizing the rotation.
    #[must_use]
    pub fn new(x: f64, y: f64, rotation: f64) -> Self {
        Self {
            x,
            y,
            rotation: normalize_degrees(rotation),
        }
    }

    /// The affine transform from piece-local to layout coordinates.
    #[must_use]
    pub fn transform(&self) -> AffineTransform<f64> {
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        AffineTransform::new(cos, -sin, self.x, sin, cos, self.y)
    }

    /// Map a piece-local point into layout space.
    #[must_use]
    pub fn to_world(&self, local: Point) -> Point {
        coord_to_point(self.transform().apply(point_to_coord(local)))
    }

    /// This placement rotated by `delta` degrees.
    #[must_use]
    pub fn rotated(self, delta: f64) -> Self {
        Self::new(self.x, self.y, self.rotation + delta)
    }
}

/// Wrap an angle in degrees into `[0, 360)`.
#[must_use]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// A circular arc in SVG endpoint form, with its centre parameterization
/// precomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcElement {
    start: Point,
    end: Point,
    center: Point,
    radius: f64,
    start_angle: f64,
    /// Signed sweep in radians; positive is clockwise on screen.
    sweep_angle: f64,
}

impl ArcElement {
    /// Build an arc from SVG `A` parameters with equal radii and no
    /// x-axis rotation.
    ///
    /// A radius too small to span the chord is scaled up to half the
    /// chord, as SVG renderers do.
    #[must_use]
    pub fn from_endpoints(
        start: Point,
        end: Point,
        radius: f64,
        large_arc: bool,
        sweep: bool,
    ) -> Self {
        let hx = (start.x - end.x) / 2.0;
        let hy = (start.y - end.y) / 2.0;
        let half_chord_sq = hx.mul_add(hx, hy * hy);

        let mut r = radius.abs();
        if r * r < half_chord_sq {
            r = half_chord_sq.sqrt();
        }

        let coef = if half_chord_sq > 0.0 {
            let magnitude = ((r * r - half_chord_sq).max(0.0) / half_chord_sq).sqrt();
            if large_arc == sweep {
                -magnitude
            } else {
                magnitude
            }
        } else {
            0.0
        };

        let center = Point::new(
            coef * hy + (start.x + end.x) / 2.0,
            -coef * hx + (start.y + end.y) / 2.0,
        );

        let start_angle = (start.y - center.y).atan2(start.x - center.x);
        let end_angle = (end.y - center.y).atan2(end.x - center.x);
        let mut sweep_angle = end_angle - start_angle;
        if sweep && sweep_angle < 0.0 {
            sweep_angle += TAU;
        } else if !sweep && sweep_angle > 0.0 {
            sweep_angle -= TAU;
        }

        Self {
            start,
            end,
            center,
            radius: r,
            start_angle,
            sweep_angle,
        }
    }

    /// Centre of the circle the arc lies on.
    #[must_use]
    pub const fn center(&self) -> Point {
        self.center
    }

    /// Effective radius (after any chord scaling).
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.radius
    }

    /// Signed sweep in radians.
    #[must_use]
    pub const fn sweep_angle(&self) -> f64 {
        self.sweep_angle
    }

    fn length(&self) -> f64 {
        self.radius * self.sweep_angle.abs()
    }

    fn point_at_length(&self, length: f64) -> Point {
        let theta = self
            .sweep_angle
            .signum()
            .mul_add(length / self.radius, self.start_angle);
        let (sin, cos) = theta.sin_cos();
        Point::new(
            self.radius.mul_add(cos, self.center.x),
            self.radius.mul_add(sin, self.center.y),
        )
    }
}

/// One physical rail segment of a piece, in piece-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element {
    /// A straight line between two points.
    Straight {
        /// Start of the line.
        start: Point,
        /// End of the line.
        end: Point,
    },
    /// A circular arc.
    Arc(ArcElement),
}

impl Element {
    /// Point at arc-length `0`.
    #[must_use]
    pub const fn start(&self) -> Point {
        match self {
            Self::Straight { start, .. } => *start,
            Self::Arc(arc) => arc.start,
        }
    }

    /// Point at arc-length [`length`](Self::length).
    #[must_use]
    pub const fn end(&self) -> Point {
        match self {
            Self::Straight { end, .. } => *end,
            Self::Arc(arc) => arc.end,
        }
    }

    /// Total arc length of the element.
    #[must_use]
    pub fn length(&self) -> f64 {
        match self {
            Self::Straight { start, end } => start.distance(*end),
            Self::Arc(arc) => arc.length(),
        }
    }

    /// Point at arc-length `length` from the start, clamped to the element.
    ///
    /// Both ends return the element's defining points exactly.
    #[must_use]
    pub fn point_at_length(&self, length: f64) -> Point {
        let total = self.length();
        if length <= 0.0 || total <= 0.0 {
            return self.start();
        }
        if length >= total {
            return self.end();
        }
        match self {
            Self::Straight { start, end } => start.lerp(*end, length / total),
            Self::Arc(arc) => arc.point_at_length(length),
        }
    }

    /// Parse piece markup into its elements, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnsupportedGeometry`] for any tag other than
    /// `<line>` or a `<path>` made of one move and one arc, and
    /// [`LayoutError::Markup`] when the fragment or its path data cannot
    /// be parsed.
    pub fn parse_markup(markup: &str, piece_type: &str) -> Result<Vec<Self>, LayoutError> {
        let unsupported = |element: String| LayoutError::UnsupportedGeometry {
            piece_type: piece_type.to_owned(),
            element,
        };

        let mut elements = Vec::new();
        let parser = svg::read(markup).map_err(|e| LayoutError::Markup(e.to_string()))?;
        for event in parser {
            match event {
                Event::Tag(_, Type::End, _) => {}
                Event::Tag("line", _, attributes) => {
                    let attr = |name: &str| -> Result<f64, LayoutError> {
                        attributes
                            .get(name)
                            .and_then(|v| v.to_string().trim().parse().ok())
                            .ok_or_else(|| {
                                LayoutError::Markup(format!(
                                    "<line> in {piece_type} needs a numeric {name}"
                                ))
                            })
                    };
                    elements.push(Self::Straight {
                        start: Point::new(attr("x1")?, attr("y1")?),
                        end: Point::new(attr("x2")?, attr("y2")?),
                    });
                }
                Event::Tag("path", _, attributes) => {
                    let d = attributes.get("d").map(ToString::to_string).ok_or_else(|| {
                        LayoutError::Markup(format!("<path> in {piece_type} has no d attribute"))
                    })?;
                    elements.push(parse_arc_path(&d).map_err(|()| unsupported(format!("path {d}")))?);
                }
                Event::Tag(other, _, _) => return Err(unsupported(format!("<{other}>"))),
                Event::Error(e) => return Err(LayoutError::Markup(e.to_string())),
                _ => {}
            }
        }
        Ok(elements)
    }
}

/// Parse `M x y A rx ry rot large sweep x y` path data into an arc.
fn parse_arc_path(d: &str) -> Result<Element, ()> {
    let data = Data::parse(d).map_err(|_| ())?;
    let mut current: Option<Point> = None;
    let mut arc: Option<ArcElement> = None;

    for command in data.iter() {
        match command {
            // A leading moveto is absolute whatever its case.
            Command::Move(_, params) if current.is_none() && params.len() == 2 => {
                current = Some(Point::new(f64::from(params[0]), f64::from(params[1])));
            }
            Command::EllipticalArc(position, params) if arc.is_none() && params.len() == 7 => {
                let start = current.ok_or(())?;
                let mut end = Point::new(f64::from(params[5]), f64::from(params[6]));
                if *position == Position::Relative {
                    end = Point::new(start.x + end.x, start.y + end.y);
                }
                arc = Some(ArcElement::from_endpoints(
                    start,
                    end,
                    f64::from(params[0]),
                    params[3] >= 0.5,
                    params[4] >= 0.5,
                ));
            }
            _ => return Err(()),
        }
    }
    arc.map(Element::Arc).ok_or(())
}

/// Angle in radians of the direction from `from` to `to`.
#[must_use]
pub fn heading(from: Point, to: Point) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}
