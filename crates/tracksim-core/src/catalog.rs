//! Piece catalog: the track types a layout can place.
//!
//! A [`PieceType`] pairs the connection points of a piece (endpoints in
//! piece-local space) with the markup describing its rails. The built-in
//! [`Catalog`] carries the straights, curves, small curves, and left/right
//! turnouts of the editor's toolbox; custom catalogs can be loaded from
//! JSON.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::Element;
use crate::types::{LayoutError, Point};

/// A track type: endpoints, intra-piece connections, and rail markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceType {
    /// Catalog name, e.g. `straight20`.
    pub name: String,

    /// Connection points in piece-local coordinates. Two for plain
    /// pieces; three for turnouts (common endpoint first).
    pub endpoints: Vec<Point>,

    /// Endpoint index to the indices reachable inside the piece.
    ///
    /// Derived from the endpoint count when omitted.
    #[serde(default)]
    pub connections: BTreeMap<usize, Vec<usize>>,

    /// SVG fragment of `<line>`/`<path>` elements, one per rail.
    pub markup: String,
}

impl PieceType {
    /// Create a type whose connections follow from its endpoint count.
    #[must_use]
    pub fn new(name: impl Into<String>, endpoints: Vec<Point>, markup: impl Into<String>) -> Self {
        let connections = default_connections(endpoints.len());
        Self {
            name: name.into(),
            endpoints,
            connections,
            markup: markup.into(),
        }
    }

    /// Whether this type is a turnout (one common and two branch endpoints).
    #[must_use]
    pub fn is_turnout(&self) -> bool {
        self.endpoints.len() == 3
    }

    /// Endpoint indices reachable from `index` inside the piece.
    #[must_use]
    pub fn connected(&self, index: usize) -> &[usize] {
        self.connections.get(&index).map_or(&[], Vec::as_slice)
    }

    /// Parse the markup into rail elements.
    ///
    /// # Errors
    ///
    /// Propagates [`LayoutError::UnsupportedGeometry`] and
    /// [`LayoutError::Markup`] from the markup parser.
    pub fn elements(&self) -> Result<Vec<Element>, LayoutError> {
        Element::parse_markup(&self.markup, &self.name)
    }

    /// Check endpoint count, connection indices, and markup.
    fn validate(&self) -> Result<(), LayoutError> {
        let unsupported = |element: String| LayoutError::UnsupportedGeometry {
            piece_type: self.name.clone(),
            element,
        };
        let count = self.endpoints.len();
        if !(2..=3).contains(&count) {
            return Err(unsupported(format!("{count} endpoints")));
        }
        for (from, targets) in &self.connections {
            if let Some(bad) = std::iter::once(from)
                .chain(targets)
                .find(|&&i| i >= count)
            {
                return Err(unsupported(format!("connection to missing endpoint {bad}")));
            }
        }
        let elements = self.elements()?;
        if elements.is_empty() {
            return Err(unsupported("no rail elements".to_owned()));
        }
        Ok(())
    }
}

/// Plain pieces join their two ends; turnouts join the common endpoint to
/// each branch and never the branches to each other.
fn default_connections(endpoint_count: usize) -> BTreeMap<usize, Vec<usize>> {
    match endpoint_count {
        2 => BTreeMap::from([(0, vec![1]), (1, vec![0])]),
        3 => BTreeMap::from([(0, vec![1, 2]), (1, vec![0]), (2, vec![0])]),
        _ => BTreeMap::new(),
    }
}

/// The set of placeable track types, keyed by name.
///
/// Types are shared with every instance placed from them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: BTreeMap<String, Arc<PieceType>>,
}

impl Catalog {
    /// The editor's built-in toolbox.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for length in [20, 40, 60, 80] {
            catalog.insert_unchecked(PieceType::new(
                format!("straight{length}"),
                vec![Point::new(0.0, 0.0), Point::new(f64::from(length), 0.0)],
                format!(r#"<line x1="0" y1="0" x2="{length}" y2="0" stroke="black" stroke-width="6"/>"#),
            ));
        }
        for radius in [40, 60, 80] {
            let r = f64::from(radius);
            catalog.insert_unchecked(PieceType::new(
                format!("rad{radius}curve90"),
                vec![Point::new(0.0, 0.0), Point::new(r, r)],
                format!(
                    r#"<path d="M0 0 A {radius} {radius} 0 0 1 {radius} {radius}" stroke="black" stroke-width="6" fill="none"/>"#
                ),
            ));
        }
        for (radius, x, y) in [(40, 28.28, 11.72), (60, 42.43, 17.57), (80, 56.57, 23.43)] {
            catalog.insert_unchecked(PieceType::new(
                format!("rad{radius}curve45"),
                vec![Point::new(0.0, 0.0), Point::new(x, y)],
                format!(
                    r#"<path d="M0 0 A {radius} {radius} 0 0 1 {x} {y}" stroke="black" stroke-width="6" fill="none"/>"#
                ),
            ));
        }
        for (name, side, sweep) in [("lhPoints", -10.0, 0), ("rhPoints", 10.0, 1)] {
            catalog.insert_unchecked(PieceType::new(
                name,
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(20.0, 0.0),
                    Point::new(20.0, side),
                ],
                format!(
                    r#"<line x1="0" y1="0" x2="20" y2="0" stroke="black" stroke-width="6"/>
                       <path d="M0 0 A 40 40 0 0 {sweep} 20 {side}" stroke="black" stroke-width="6" fill="none"/>"#
                ),
            ));
        }
        for (name, side, sweep) in [("smallCurveL", -10.0, 0), ("smallCurveR", 10.0, 1)] {
            catalog.insert_unchecked(PieceType::new(
                name,
                vec![Point::new(0.0, 0.0), Point::new(20.0, side)],
                format!(
                    r#"<path d="M0 0 A 40 40 0 0 {sweep} 20 {side}" stroke="black" stroke-width="6" fill="none"/>"#
                ),
            ));
        }
        catalog
    }

    /// Load a catalog from a JSON array of piece types.
    ///
    /// Types without explicit connections get the defaults for their
    /// endpoint count.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Json`] for malformed JSON, and
    /// [`LayoutError::UnsupportedGeometry`] or [`LayoutError::Markup`]
    /// for a type whose endpoints, connections, or markup are unusable.
    pub fn from_json(json: &str) -> Result<Self, LayoutError> {
        let types: Vec<PieceType> = serde_json::from_str(json)?;
        let mut catalog = Self::default();
        for piece_type in types {
            catalog.insert(piece_type)?;
        }
        Ok(catalog)
    }

    /// Add or replace a type after validating it.
    ///
    /// # Errors
    ///
    /// See [`from_json`](Self::from_json).
    pub fn insert(&mut self, mut piece_type: PieceType) -> Result<(), LayoutError> {
        if piece_type.connections.is_empty() {
            piece_type.connections = default_connections(piece_type.endpoints.len());
        }
        piece_type.validate()?;
        self.insert_unchecked(piece_type);
        Ok(())
    }

    fn insert_unchecked(&mut self, piece_type: PieceType) {
        self.types
            .insert(piece_type.name.clone(), Arc::new(piece_type));
    }

    /// Look up a type by name.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPieceType`] if no such type exists.
    pub fn get(&self, name: &str) -> Result<Arc<PieceType>, LayoutError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| LayoutError::UnknownPieceType(name.to_owned()))
    }

    /// Names of every type, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of types in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if the catalog has no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
