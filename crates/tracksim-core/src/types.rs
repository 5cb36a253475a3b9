//! Shared types for the track layout engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 2D point in layout coordinates.
///
/// Layout space follows the SVG convention: `x` grows to the right and
/// `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position (downward positive).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation from `self` toward `other`.
    ///
    /// `t = 0.0` yields `self`, `t = 1.0` yields `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            x: (other.x - self.x).mul_add(t, self.x),
            y: (other.y - self.y).mul_add(t, self.y),
        }
    }

    /// Whether both coordinates are within `tolerance` of `other`'s.
    #[must_use]
    pub fn approx_eq(self, other: Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() < tolerance && (self.y - other.y).abs() < tolerance
    }
}

/// A sequence of connected points forming a path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the first point, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Point> {
        self.0.first()
    }

    /// Returns the last point, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Point> {
        self.0.last()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// A copy of this polyline running in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().rev().copied().collect())
    }

    /// Sum of the span lengths between consecutive points.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.0.windows(2).map(|w| w[0].distance(w[1])).sum()
    }
}

/// Axis-aligned bounds over a set of points.
///
/// Starts out empty (inverted infinite bounds) and grows with
/// [`include`](Self::include).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Smallest `x` seen.
    pub min_x: f64,
    /// Smallest `y` seen.
    pub min_y: f64,
    /// Largest `x` seen.
    pub max_x: f64,
    /// Largest `y` seen.
    pub max_y: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// Bounds containing no points.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Returns `true` if no point has been included yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Grow the bounds to contain `point`.
    pub fn include(&mut self, point: Point) {
        self.min_x = self.min_x.min(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_x = self.max_x.max(point.x);
        self.max_y = self.max_y.max(point.y);
    }

    /// Grow the bounds to contain `other`.
    pub fn merge(&mut self, other: &Self) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Horizontal extent, `0.0` when empty.
    #[must_use]
    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_x - self.min_x
        }
    }

    /// Vertical extent, `0.0` when empty.
    #[must_use]
    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_y - self.min_y
        }
    }

    /// Midpoint of the bounds, the origin when empty.
    #[must_use]
    pub fn center(&self) -> Point {
        if self.is_empty() {
            Point::new(0.0, 0.0)
        } else {
            Point::new(
                (self.min_x + self.max_x) / 2.0,
                (self.min_y + self.max_y) / 2.0,
            )
        }
    }
}

/// Identifier of a placed piece, displayed as `piece-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PieceId(pub u32);

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "piece-{}", self.0)
    }
}

impl FromStr for PieceId {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("piece-")
            .and_then(|n| n.parse().ok())
            .map(Self)
            .ok_or_else(|| LayoutError::InvalidPieceId(s.to_owned()))
    }
}

impl TryFrom<String> for PieceId {
    type Error = LayoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PieceId> for String {
    fn from(id: PieceId) -> Self {
        id.to_string()
    }
}

/// One endpoint of one piece: the vertex key of the connectivity graph.
///
/// Displays as `piece-N_i`. The derived ordering (piece, then index) is
/// the canonical order used for undirected edge keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    /// Owning piece.
    pub piece: PieceId,
    /// Index into the piece type's endpoint list.
    pub index: usize,
}

impl EndpointRef {
    /// Create a new endpoint reference.
    #[must_use]
    pub const fn new(piece: PieceId, index: usize) -> Self {
        Self { piece, index }
    }

    /// Whether both endpoints belong to the same piece.
    #[must_use]
    pub fn same_piece(self, other: Self) -> bool {
        self.piece == other.piece
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.piece, self.index)
    }
}

impl FromStr for EndpointRef {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (piece, index) = s
            .rsplit_once('_')
            .ok_or_else(|| LayoutError::InvalidPieceId(s.to_owned()))?;
        let index = index
            .parse()
            .map_err(|_| LayoutError::InvalidPieceId(s.to_owned()))?;
        Ok(Self::new(piece.parse()?, index))
    }
}

/// Canonical key of an undirected edge: the two endpoints in ascending
/// order, so `(a, b)` and `(b, a)` collapse to the same key.
///
/// The order is numeric on `(piece, index)`, not the lexical order of the
/// `piece-N_i` names: `piece-2_0` sorts before `piece-10_0`.
#[must_use]
pub fn edge_key(a: EndpointRef, b: EndpointRef) -> (EndpointRef, EndpointRef) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Tunable parameters for graph construction, sampling, and the
/// simulation driver.
///
/// Missing fields in a JSON config fall back to the `DEFAULT_*` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Two endpoints of different pieces closer than this (strictly)
    /// are joined.
    pub match_threshold: f64,

    /// Arc-length distance between consecutive resolved world points.
    pub sample_step: f64,

    /// Coordinate tolerance when pairing a markup element with the
    /// endpoints it joins.
    pub endpoint_tolerance: f64,

    /// Speed is clamped to `[-max_speed, max_speed]` units per frame.
    pub max_speed: f64,

    /// Fixed step used by speed up/down controls.
    pub speed_increment: f64,

    /// Wheel diameter used to derive the per-frame wheel rotation.
    pub wheel_diameter: f64,

    /// Added to the layout bounds when sizing the ground plane.
    pub ground_margin: f64,
}

impl LayoutConfig {
    /// Default endpoint matching distance.
    pub const DEFAULT_MATCH_THRESHOLD: f64 = 2.0;
    /// Default resolver sampling step.
    pub const DEFAULT_SAMPLE_STEP: f64 = 1.0;
    /// Default element/endpoint pairing tolerance.
    pub const DEFAULT_ENDPOINT_TOLERANCE: f64 = 0.1;
    /// Default maximum absolute speed.
    pub const DEFAULT_MAX_SPEED: f64 = 1.0;
    /// Default speed adjustment step.
    pub const DEFAULT_SPEED_INCREMENT: f64 = 0.1;
    /// Default wheel diameter.
    pub const DEFAULT_WHEEL_DIAMETER: f64 = 3.0;
    /// Default ground-plane margin.
    pub const DEFAULT_GROUND_MARGIN: f64 = 20.0;

    /// Check that every parameter is usable.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidConfig`] naming the first field that
    /// is non-finite or out of range.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let positive = [
            ("match_threshold", self.match_threshold),
            ("sample_step", self.sample_step),
            ("endpoint_tolerance", self.endpoint_tolerance),
            ("max_speed", self.max_speed),
            ("speed_increment", self.speed_increment),
            ("wheel_diameter", self.wheel_diameter),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(LayoutError::InvalidConfig(format!(
                    "{name} must be finite and positive, got {value}"
                )));
            }
        }
        if !self.ground_margin.is_finite() || self.ground_margin < 0.0 {
            return Err(LayoutError::InvalidConfig(format!(
                "ground_margin must be finite and non-negative, got {}",
                self.ground_margin
            )));
        }
        Ok(())
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            match_threshold: Self::DEFAULT_MATCH_THRESHOLD,
            sample_step: Self::DEFAULT_SAMPLE_STEP,
            endpoint_tolerance: Self::DEFAULT_ENDPOINT_TOLERANCE,
            max_speed: Self::DEFAULT_MAX_SPEED,
            speed_increment: Self::DEFAULT_SPEED_INCREMENT,
            wheel_diameter: Self::DEFAULT_WHEEL_DIAMETER,
            ground_margin: Self::DEFAULT_GROUND_MARGIN,
        }
    }
}

fn join_refs(refs: &[EndpointRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_ids(ids: &[PieceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while constructing or editing a layout.
///
/// All of these are fatal to the operation that raised them: a graph
/// build that fails leaves no partial graph behind. Runtime traversal
/// outcomes are reported as [`DeadEnd`](crate::traversal::DeadEnd)
/// values instead.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// More than one endpoint of other pieces lies within the match
    /// threshold of `endpoint`.
    #[error(
        "each endpoint can only be connected to one other piece: {endpoint} is near {}",
        join_refs(.candidates)
    )]
    AmbiguousEndpoint {
        /// The endpoint being matched.
        endpoint: EndpointRef,
        /// Every endpoint found within the threshold.
        candidates: Vec<EndpointRef>,
    },

    /// Annotation finished without reaching every piece.
    #[error("track pieces must all be connected; unreachable: {}", join_ids(.unreached))]
    DisconnectedLayout {
        /// Pieces that received no world points.
        unreached: Vec<PieceId>,
    },

    /// A markup element is neither a straight line nor an arc path.
    #[error("piece type {piece_type} has unsupported geometry: {element}")]
    UnsupportedGeometry {
        /// Catalog name of the offending type.
        piece_type: String,
        /// Short description of the element.
        element: String,
    },

    /// No element of the piece joins the two endpoints.
    #[error("piece {piece} has no segment joining endpoints {from} and {to}")]
    MissingSegment {
        /// Piece being annotated.
        piece: PieceId,
        /// Endpoint index the segment should start at.
        from: usize,
        /// Endpoint index the segment should end at.
        to: usize,
    },

    /// An endpoint has more neighbours than its piece allows.
    #[error("endpoint {endpoint} has {degree} neighbours, more than its piece allows")]
    MalformedGraph {
        /// Offending vertex.
        endpoint: EndpointRef,
        /// Its neighbour count.
        degree: usize,
    },

    /// Two endpoints passed as a directed edge are not adjacent.
    #[error("endpoints {from} and {to} are not adjacent")]
    NotAdjacent {
        /// Tail of the requested edge.
        from: EndpointRef,
        /// Head of the requested edge.
        to: EndpointRef,
    },

    /// The endpoint has no edges in the connectivity graph.
    #[error("endpoint {0} is not part of the connectivity graph")]
    NotAVertex(EndpointRef),

    /// The catalog has no type with this name.
    #[error("unknown piece type: {0}")]
    UnknownPieceType(String),

    /// The layout has no piece with this id.
    #[error("unknown piece: {0}")]
    UnknownPiece(PieceId),

    /// A turnout operation was requested for a plain piece.
    #[error("piece {0} is not a turnout")]
    NotATurnout(PieceId),

    /// The layout contains no pieces.
    #[error("load or create a layout first")]
    EmptyLayout,

    /// A configuration parameter is out of range.
    #[error("invalid layout configuration: {0}")]
    InvalidConfig(String),

    /// A piece or endpoint identifier could not be parsed.
    #[error("invalid piece identifier: {0}")]
    InvalidPieceId(String),

    /// Piece markup could not be parsed.
    #[error("invalid piece markup: {0}")]
    Markup(String),

    /// A catalog or saved layout was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
