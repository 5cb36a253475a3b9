//! Build diagnostics: timing, counts, and other metrics for each stage.
//!
//! Collected by [`prepare_with_diagnostics`]
//! alongside the prepared layout, for tuning the match threshold and
//! sample step on real layouts.
//!
//! Durations use [`std::time::Duration`]. Timestamps come from a
//! [`Clock`]; the default [`SystemClock`] uses the `web-time` crate,
//! which reads `performance.now()` on WASM and `std::time::Instant` on
//! native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::build::{BuildStage, LayoutBuild, PreparedLayout};
use crate::layout::Layout;
use crate::types::{BoundingBox, EndpointRef, LayoutConfig, LayoutError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// A point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDiagnostics {
    /// Stage 1: endpoint matching.
    pub matching: StageDiagnostics,
    /// Stage 2: graph construction.
    pub connect: StageDiagnostics,
    /// Stage 3: degree validation.
    pub validate: StageDiagnostics,
    /// Stage 4: world-point annotation.
    pub annotate: StageDiagnostics,
    /// Total wall-clock duration of the build (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: BuildSummary,
}

/// Diagnostics for a single build stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Endpoint matching.
    Match {
        /// Match distance used.
        threshold: f64,
        /// Endpoints indexed.
        endpoints: usize,
        /// Joints found between pieces.
        joints: usize,
    },
    /// Graph construction.
    Connect {
        /// Graph vertices.
        vertices: usize,
        /// Rails inside pieces.
        internal_edges: usize,
        /// Joints between pieces.
        external_edges: usize,
    },
    /// Degree validation.
    Validate {
        /// Turnouts in the layout.
        turnouts: usize,
        /// Largest vertex degree.
        max_degree: usize,
        /// Traversal start vertex.
        start: EndpointRef,
    },
    /// World-point annotation.
    Annotate {
        /// Resolver step used.
        sample_step: f64,
        /// Rails resolved.
        segments: usize,
        /// Forward world points stored.
        points: usize,
    },
}

/// High-level summary counts for a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Placed pieces.
    pub pieces: usize,
    /// Turnouts among them.
    pub turnouts: usize,
    /// Graph vertices.
    pub vertices: usize,
    /// Undirected graph edges.
    pub edges: usize,
    /// Directed segments stored (both directions of every rail).
    pub directed_segments: usize,
    /// Forward world points stored.
    pub world_points: usize,
    /// Bounds of every world point.
    pub bounds: BoundingBox,
}

impl BuildDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Build Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Layout: {} pieces ({} turnouts), {} vertices, {} edges",
            self.summary.pieces, self.summary.turnouts, self.summary.vertices, self.summary.edges,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Match", &self.matching),
            ("Connect", &self.connect),
            ("Validate", &self.validate),
            ("Annotate", &self.annotate),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        let b = &self.summary.bounds;
        lines.push(format!(
            "Segments: {}  |  World points: {}  |  Bounds: {:.1}x{:.1}",
            self.summary.directed_segments,
            self.summary.world_points,
            b.width(),
            b.height(),
        ));

        lines.join("\n")
    }
}

/// Run every build stage, timing each with `clock`.
///
/// # Errors
///
/// Returns the first stage error, exactly as [`prepare`](crate::prepare)
/// would.
pub fn prepare_with_diagnostics<C: Clock>(
    layout: Layout,
    config: &LayoutConfig,
    clock: &C,
) -> Result<(PreparedLayout, BuildDiagnostics), LayoutError> {
    let total_start = clock.now();

    let t = clock.now();
    let matched = LayoutBuild::new(layout, config.clone()).match_endpoints()?;
    let matching = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: matched.metrics(),
    };

    let t = clock.now();
    let connected = matched.connect();
    let connect = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: connected.metrics(),
    };

    let t = clock.now();
    let validated = connected.validate()?;
    let validate = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: validated.metrics(),
    };

    let t = clock.now();
    let annotated = validated.annotate()?;
    let annotate = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: annotated.metrics(),
    };
    let annotation = *annotated.annotation();

    let prepared = annotated.into_prepared();
    let total_duration = clock.elapsed(&total_start);

    let layout = prepared.layout();
    let summary = BuildSummary {
        pieces: layout.len(),
        turnouts: layout.pieces().iter().filter(|p| p.is_turnout()).count(),
        vertices: prepared.graph().vertex_count(),
        edges: prepared.graph().edge_count(),
        directed_segments: annotation.segments * 2,
        world_points: annotation.points,
        bounds: annotation.bounds,
    };

    Ok((
        prepared,
        BuildDiagnostics {
            matching,
            connect,
            validate,
            annotate,
            total_duration,
            summary,
        },
    ))
}

/// Convert a `Duration` to milliseconds as `f64`.
#[must_use]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Match {
            threshold,
            endpoints,
            joints,
        } => format!("threshold={threshold:.2} {endpoints} endpoints, {joints} joints"),
        StageMetrics::Connect {
            vertices,
            internal_edges,
            external_edges,
        } => format!("{vertices} vertices, {internal_edges} rails + {external_edges} joints"),
        StageMetrics::Validate {
            turnouts,
            max_degree,
            start,
        } => format!("{turnouts} turnouts, max degree {max_degree}, start {start}"),
        StageMetrics::Annotate {
            sample_step,
            segments,
            points,
        } => format!("step={sample_step:.2} {segments} segments, {points} pts"),
    }
}
