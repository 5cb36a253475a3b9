//! tracksim-core: Track layout connectivity and train traversal (sans-IO).
//!
//! Turns a set of placed track pieces into a traversable layout through:
//! endpoint matching -> graph construction -> degree validation ->
//! world-point annotation. A [`Simulation`] then drives a train across
//! the prepared layout one tick at a time.
//!
//! This crate has **no I/O dependencies** -- layouts and catalogs come in
//! as values or JSON strings, and every result is returned as structured
//! data. Rendering lives in `tracksim-export`.

pub mod annotate;
pub mod build;
pub mod catalog;
pub mod diagnostics;
pub mod geometry;
pub mod graph;
pub mod layout;
pub mod matcher;
pub mod resolve;
pub mod simulation;
pub mod traversal;
pub mod turnout;
pub mod types;

pub use build::{LayoutBuild, PreparedLayout};
pub use catalog::{Catalog, PieceType};
pub use diagnostics::{BuildDiagnostics, Clock, SystemClock, prepare_with_diagnostics};
pub use geometry::Placement;
pub use graph::{ConnectivityGraph, EdgeKind};
pub use layout::{Layout, PieceInstance, SavedLayout};
pub use simulation::{Simulation, SimulationContext, Status};
pub use traversal::{DeadEnd, Direction, Frame, Track, TrainPose, TraversalState};
pub use turnout::Branch;
pub use types::{BoundingBox, EndpointRef, LayoutConfig, LayoutError, PieceId, Point, Polyline};

/// Prepare a layout for traversal.
///
/// Runs every build stage in order:
///
/// 1. Match endpoints between pieces (R-tree nearest neighbour)
/// 2. Build the connectivity graph
/// 3. Validate vertex degrees and pick the start vertex
/// 4. Resolve world points for every rail
///
/// Use [`LayoutBuild`] to inspect intermediate stages, or
/// [`prepare_with_diagnostics`] to time them.
///
/// # Errors
///
/// Returns [`LayoutError::InvalidConfig`] for unusable parameters,
/// [`LayoutError::EmptyLayout`] if nothing is placed,
/// [`LayoutError::AmbiguousEndpoint`] or [`LayoutError::MalformedGraph`]
/// for over-connected endpoints, and [`LayoutError::DisconnectedLayout`]
/// if some piece cannot be reached from the start vertex.
pub fn prepare(layout: Layout, config: &LayoutConfig) -> Result<PreparedLayout, LayoutError> {
    Ok(LayoutBuild::new(layout, config.clone())
        .match_endpoints()?
        .connect()
        .validate()?
        .annotate()?
        .into_prepared())
}
