//! Staged layout build: advance from placed pieces to a traversable
//! layout one stage at a time, inspecting each intermediate result.
//!
//! ```rust
//! # use tracksim_core::{Catalog, Layout, LayoutConfig, LayoutError};
//! # use tracksim_core::build::LayoutBuild;
//! # fn run() -> Result<(), LayoutError> {
//! let mut layout = Layout::new(Catalog::builtin());
//! layout.add_piece("straight20", 0.0, 0.0)?;
//! layout.add_piece("straight40", 20.0, 0.0)?;
//!
//! let prepared = LayoutBuild::new(layout, LayoutConfig::default())
//!     .match_endpoints()?
//!     .connect()
//!     .validate()?
//!     .annotate()?
//!     .into_prepared();
//! assert_eq!(prepared.graph().edge_count(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next stage (or a
//! `Result` for fallible stages). A failed stage drops everything built
//! so far, so no partial graph ever escapes.

use crate::annotate::{Annotation, annotate_world_points};
use crate::diagnostics::StageMetrics;
use crate::graph::{ConnectivityGraph, EdgeKind};
use crate::layout::Layout;
use crate::matcher::EndpointMatcher;
use crate::traversal::Track;
use crate::turnout::Branch;
use crate::types::{BoundingBox, EndpointRef, LayoutConfig, LayoutError, PieceId};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Build state before any work has been done.
#[must_use = "build stages are consumed by advancing — call .match_endpoints() to continue"]
pub struct Pending {
    layout: Layout,
    config: LayoutConfig,
}

impl Pending {
    /// The layout to be built.
    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Match every endpoint against the endpoints of other pieces.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidConfig`] for unusable parameters,
    /// [`LayoutError::EmptyLayout`] if no piece is placed, and
    /// [`LayoutError::AmbiguousEndpoint`] if an endpoint has more than
    /// one match.
    pub fn match_endpoints(self) -> Result<Matched, LayoutError> {
        self.config.validate()?;
        if self.layout.is_empty() {
            return Err(LayoutError::EmptyLayout);
        }
        let matcher = EndpointMatcher::new(&self.layout, self.config.match_threshold);
        let external = matcher.external_connections(&self.layout)?;
        log::debug!(
            "matched {} joints among {} endpoints",
            external.len(),
            matcher.len()
        );
        Ok(Matched {
            endpoints: matcher.len(),
            layout: self.layout,
            config: self.config,
            external,
        })
    }
}

// ───────────────────────── Stage 1: Matched ──────────────────────────

/// Build state after endpoint matching.
#[must_use = "build stages are consumed by advancing — call .connect() to continue"]
pub struct Matched {
    layout: Layout,
    config: LayoutConfig,
    external: Vec<(EndpointRef, EndpointRef)>,
    endpoints: usize,
}

impl Matched {
    /// Joints between pieces, lower endpoint first.
    #[must_use]
    pub fn external_connections(&self) -> &[(EndpointRef, EndpointRef)] {
        &self.external
    }

    /// Combine piece connection maps with the matched joints.
    pub fn connect(self) -> Connected {
        let graph = ConnectivityGraph::from_connections(&self.layout, &self.external);
        log::debug!(
            "graph has {} vertices and {} edges",
            graph.vertex_count(),
            graph.edge_count()
        );
        Connected {
            layout: self.layout,
            config: self.config,
            graph,
        }
    }
}

// ───────────────────────── Stage 2: Connected ────────────────────────

/// Build state once the connectivity graph exists.
#[must_use = "build stages are consumed by advancing — call .validate() to continue"]
pub struct Connected {
    layout: Layout,
    config: LayoutConfig,
    graph: ConnectivityGraph,
}

impl Connected {
    /// The unvalidated graph.
    #[must_use]
    pub const fn graph(&self) -> &ConnectivityGraph {
        &self.graph
    }

    /// Check vertex degrees and pick the traversal start.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::MalformedGraph`] for an over-connected
    /// endpoint and [`LayoutError::EmptyLayout`] if the graph has no
    /// vertices.
    pub fn validate(self) -> Result<Validated, LayoutError> {
        self.graph.validate(&self.layout)?;
        let start = self.graph.start_vertex().ok_or(LayoutError::EmptyLayout)?;
        Ok(Validated {
            layout: self.layout,
            config: self.config,
            graph: self.graph,
            start,
        })
    }
}

// ───────────────────────── Stage 3: Validated ────────────────────────

/// Build state after graph validation.
#[must_use = "build stages are consumed by advancing — call .annotate() to continue"]
pub struct Validated {
    layout: Layout,
    config: LayoutConfig,
    graph: ConnectivityGraph,
    start: EndpointRef,
}

impl Validated {
    /// Vertex the annotation walk and the train start from.
    #[must_use]
    pub const fn start(&self) -> EndpointRef {
        self.start
    }

    /// Resolve world points for every rail.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::DisconnectedLayout`] if some piece is not
    /// reachable from the start vertex, and propagates geometry errors.
    pub fn annotate(mut self) -> Result<Annotated, LayoutError> {
        let annotation =
            annotate_world_points(&mut self.layout, &self.graph, self.start, &self.config)?;
        Ok(Annotated {
            layout: self.layout,
            config: self.config,
            graph: self.graph,
            start: self.start,
            annotation,
        })
    }
}

// ───────────────────────── Stage 4: Annotated ────────────────────────

/// Build state with every rail resolved.
#[must_use = "call .into_prepared() to extract the PreparedLayout"]
pub struct Annotated {
    layout: Layout,
    config: LayoutConfig,
    graph: ConnectivityGraph,
    start: EndpointRef,
    annotation: Annotation,
}

impl Annotated {
    /// Counts and bounds from the annotation walk.
    #[must_use]
    pub const fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    /// Finish the build.
    #[must_use]
    pub fn into_prepared(self) -> PreparedLayout {
        log::info!(
            "layout ready: {} pieces, {} segments, start {}",
            self.layout.len(),
            self.annotation.segments,
            self.start
        );
        PreparedLayout {
            layout: self.layout,
            graph: self.graph,
            bounds: self.annotation.bounds,
            start: self.start,
        }
    }
}

// ───────────────────────── BuildStage trait ──────────────────────────

/// Total number of build stages.
pub const STAGE_COUNT: usize = 5;

/// Implemented by every build stage past [`Pending`] so diagnostics can
/// be gathered uniformly.
pub trait BuildStage: Sized {
    /// Short name of the stage (e.g. `"match"`).
    const NAME: &str;

    /// Zero-based position of the stage; [`Pending`] is stage 0.
    const INDEX: usize;

    /// Metrics describing the work done to reach this stage.
    fn metrics(&self) -> StageMetrics;
}

impl BuildStage for Matched {
    const NAME: &str = "match";
    const INDEX: usize = 1;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Match {
            threshold: self.config.match_threshold,
            endpoints: self.endpoints,
            joints: self.external.len(),
        }
    }
}

impl BuildStage for Connected {
    const NAME: &str = "connect";
    const INDEX: usize = 2;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Connect {
            vertices: self.graph.vertex_count(),
            internal_edges: self.graph.count_edges(EdgeKind::Internal),
            external_edges: self.graph.count_edges(EdgeKind::External),
        }
    }
}

impl BuildStage for Validated {
    const NAME: &str = "validate";
    const INDEX: usize = 3;

    fn metrics(&self) -> StageMetrics {
        let max_degree = self
            .graph
            .vertices()
            .map(|v| self.graph.degree(v))
            .max()
            .unwrap_or(0);
        StageMetrics::Validate {
            turnouts: self.layout.pieces().iter().filter(|p| p.is_turnout()).count(),
            max_degree,
            start: self.start,
        }
    }
}

impl BuildStage for Annotated {
    const NAME: &str = "annotate";
    const INDEX: usize = 4;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Annotate {
            sample_step: self.config.sample_step,
            segments: self.annotation.segments,
            points: self.annotation.points,
        }
    }
}

/// Entry point of the staged build.
pub struct LayoutBuild;

impl LayoutBuild {
    /// Start a build of `layout` with `config`. Nothing is computed yet.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(layout: Layout, config: LayoutConfig) -> Pending {
        Pending { layout, config }
    }
}

/// A layout ready for traversal: annotated pieces, their graph, the
/// bounds of every world point, and the start vertex.
#[derive(Debug, Clone)]
pub struct PreparedLayout {
    layout: Layout,
    graph: ConnectivityGraph,
    bounds: BoundingBox,
    start: EndpointRef,
}

impl PreparedLayout {
    /// The annotated layout.
    #[must_use]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The connectivity graph.
    #[must_use]
    pub const fn graph(&self) -> &ConnectivityGraph {
        &self.graph
    }

    /// Bounds of every resolved world point.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Vertex the train spawns on.
    #[must_use]
    pub const fn start(&self) -> EndpointRef {
        self.start
    }

    /// A traversal view over this layout.
    #[must_use]
    pub const fn track<'a>(&'a self, config: &'a LayoutConfig) -> Track<'a> {
        Track {
            layout: &self.layout,
            graph: &self.graph,
            config,
        }
    }

    /// Flip a turnout. Topology is unchanged, so world points stay valid.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] or [`LayoutError::NotATurnout`].
    pub fn toggle_turnout(&mut self, id: PieceId) -> Result<Branch, LayoutError> {
        self.layout.toggle_turnout(id)
    }

    /// Set a turnout to a specific branch.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] or [`LayoutError::NotATurnout`].
    pub fn set_turnout(&mut self, id: PieceId, branch: Branch) -> Result<(), LayoutError> {
        self.layout.set_turnout(id, branch)
    }

    /// Give the layout back for editing.
    #[must_use]
    pub fn into_layout(self) -> Layout {
        self.layout
    }
}
