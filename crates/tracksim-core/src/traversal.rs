//! Train traversal engine.
//!
//! A [`TraversalState`] is a plain value threaded through [`step`] once
//! per frame: `step(state, track, speed) -> (state, frame)`. Nothing is
//! mutated in place, so the state machine can be driven by a render loop,
//! a headless benchmark, or a test without any of them owning it.
//!
//! Within a segment, points are stored so that forward travel increases
//! the point index. Reverse travel walks the same sequence backwards,
//! which keeps the train facing the same way while backing up.
//!
//! Runtime failures never become errors. A track end yields
//! [`DeadEnd::Terminus`]; an inconsistent graph yields
//! [`DeadEnd::Malformed`]. Either way the state is returned unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::heading;
use crate::graph::ConnectivityGraph;
use crate::layout::Layout;
use crate::turnout::{Branch, COMMON_ENDPOINT};
use crate::types::{EndpointRef, LayoutConfig, LayoutError, PieceId, Point, Polyline};

/// Direction of travel derived from the sign of the speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Negative speed.
    Reverse,
    /// Zero or non-finite speed.
    Stopped,
    /// Positive speed.
    Forward,
}

impl Direction {
    /// Direction of travel at `speed`. Infinite and NaN speeds hold the
    /// train in place.
    #[must_use]
    pub fn from_speed(speed: f64) -> Self {
        if !speed.is_finite() {
            Self::Stopped
        } else if speed > 0.0 {
            Self::Forward
        } else if speed < 0.0 {
            Self::Reverse
        } else {
            Self::Stopped
        }
    }

    /// `-1`, `0`, or `1`.
    #[must_use]
    pub const fn sign(self) -> isize {
        match self {
            Self::Reverse => -1,
            Self::Stopped => 0,
            Self::Forward => 1,
        }
    }

    /// [`sign`](Self::sign) as a float.
    #[must_use]
    pub const fn signum(self) -> f64 {
        match self {
            Self::Reverse => -1.0,
            Self::Stopped => 0.0,
            Self::Forward => 1.0,
        }
    }

    /// Whether the train moves at all.
    #[must_use]
    pub const fn is_moving(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Position and facing of the train in layout space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainPose {
    /// Position on the rail.
    pub position: Point,
    /// Facing angle in radians, `atan2(dy, dx)` in layout coordinates.
    pub heading: f64,
}

impl TrainPose {
    /// Standing on `from`, facing `to`.
    #[must_use]
    pub fn facing(from: Point, to: Point) -> Self {
        Self {
            position: from,
            heading: heading(from, to),
        }
    }
}

/// One frame of motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    /// Pose after the frame.
    pub pose: TrainPose,
    /// Distance covered along the rail this frame.
    pub distance: f64,
    /// Wheel rotation delta in radians.
    pub wheel_rotation: f64,
}

/// Why a traversal step could not continue on an inconsistent graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedReason {
    /// The endpoint refers to a piece that is not in the layout.
    UnknownPiece,
    /// A plain piece offered more than one way forward.
    AmbiguousForward {
        /// Number of candidate endpoints.
        options: usize,
    },
    /// A turnout had no option satisfying its routing rule.
    TurnoutRouting,
    /// The segment to enter has no world points.
    MissingSegment,
    /// The segment to enter has fewer than two points.
    DegenerateSegment,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPiece => f.write_str("unknown piece"),
            Self::AmbiguousForward { options } => {
                write!(f, "{options} ways forward from a plain piece")
            }
            Self::TurnoutRouting => f.write_str("no route through turnout"),
            Self::MissingSegment => f.write_str("segment has no world points"),
            Self::DegenerateSegment => f.write_str("segment has fewer than two points"),
        }
    }
}

/// The train cannot go any further in its current direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadEnd {
    /// A genuine end of track.
    Terminus {
        /// Endpoint the train stopped at.
        at: EndpointRef,
    },
    /// The graph is inconsistent at `at`.
    Malformed {
        /// Endpoint where resolution failed.
        at: EndpointRef,
        /// What was wrong.
        reason: MalformedReason,
    },
}

impl DeadEnd {
    /// Endpoint the train stopped at.
    #[must_use]
    pub const fn at(&self) -> EndpointRef {
        match self {
            Self::Terminus { at } | Self::Malformed { at, .. } => *at,
        }
    }

    /// Whether this is a graph inconsistency rather than a track end.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    fn log(&self) {
        match self {
            Self::Terminus { at } => log::warn!("dead end at {at}"),
            Self::Malformed { at, reason } => log::error!("malformed graph at {at}: {reason}"),
        }
    }
}

impl fmt::Display for DeadEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminus { at } => write!(f, "end of track at {at}"),
            Self::Malformed { at, reason } => write!(f, "malformed graph at {at}: {reason}"),
        }
    }
}

/// Outcome of one [`step`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// Speed was zero; nothing changed.
    Held,
    /// The train moved along a segment.
    Moved(Movement),
    /// The train passed a joint between two pieces without moving.
    Crossed {
        /// Endpoint on the piece being left.
        from: EndpointRef,
        /// Endpoint on the piece being entered.
        to: EndpointRef,
    },
    /// The train could not continue.
    DeadEnd(DeadEnd),
}

impl Frame {
    /// The movement, if the train moved.
    #[must_use]
    pub const fn movement(&self) -> Option<&Movement> {
        match self {
            Self::Moved(movement) => Some(movement),
            _ => None,
        }
    }

    /// The dead end, if the train stopped at one.
    #[must_use]
    pub const fn dead_end(&self) -> Option<&DeadEnd> {
        match self {
            Self::DeadEnd(dead_end) => Some(dead_end),
            _ => None,
        }
    }
}

/// World-point key of the segment a train is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    /// Owning piece.
    pub piece: PieceId,
    /// First endpoint index of the stored sequence.
    pub from: usize,
    /// Last endpoint index of the stored sequence.
    pub to: usize,
}

impl SegmentKey {
    /// Key of the sequence to walk from `at` to `target` (same piece):
    /// stored `at -> target` when moving forward and `target -> at`
    /// when reversing, so forward travel always increases the index.
    #[must_use]
    pub const fn along(at: EndpointRef, target: EndpointRef, direction: Direction) -> Self {
        match direction {
            Direction::Reverse => Self {
                piece: at.piece,
                from: target.index,
                to: at.index,
            },
            Direction::Stopped | Direction::Forward => Self {
                piece: at.piece,
                from: at.index,
                to: target.index,
            },
        }
    }
}

/// Read-only view of everything a traversal step consults.
#[derive(Debug, Clone, Copy)]
pub struct Track<'a> {
    /// Placed, annotated pieces (turnout state is read from here).
    pub layout: &'a Layout,
    /// Endpoint graph of `layout`.
    pub graph: &'a ConnectivityGraph,
    /// Wheel diameter and other parameters.
    pub config: &'a LayoutConfig,
}

/// Live position of the train.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraversalState {
    previous: EndpointRef,
    current: EndpointRef,
    edge_direction: Direction,
    segment: Option<SegmentKey>,
    point_index: usize,
    progress: f64,
    last_direction: Direction,
}

impl TraversalState {
    /// Endpoint the current directed edge starts from.
    #[must_use]
    pub const fn previous(&self) -> EndpointRef {
        self.previous
    }

    /// Endpoint the current directed edge leads to.
    #[must_use]
    pub const fn current(&self) -> EndpointRef {
        self.current
    }

    /// Segment being walked; `None` right after crossing a joint.
    #[must_use]
    pub const fn segment(&self) -> Option<SegmentKey> {
        self.segment
    }

    /// Index of the point the train last passed.
    #[must_use]
    pub const fn point_index(&self) -> usize {
        self.point_index
    }

    /// Distance travelled past [`point_index`](Self::point_index).
    #[must_use]
    pub const fn progress(&self) -> f64 {
        self.progress
    }

    /// Direction of the most recent motion.
    #[must_use]
    pub const fn last_direction(&self) -> Direction {
        self.last_direction
    }

    /// The directed edge `(from, at)` as seen when moving `direction`.
    const fn edge_toward(&self, direction: Direction) -> (EndpointRef, EndpointRef) {
        if matches!(
            (self.edge_direction, direction),
            (Direction::Reverse, Direction::Reverse) | (Direction::Forward, Direction::Forward)
        ) {
            (self.previous, self.current)
        } else {
            (self.current, self.previous)
        }
    }

    /// Re-express the position from the other end of the current span
    /// when the direction flips, so the train does not jump.
    fn correct_reversal(&mut self, points: &[Point], direction: Direction) {
        if self.last_direction.is_moving() && self.last_direction != direction {
            let other = self
                .point_index
                .checked_add_signed(self.last_direction.sign())
                .filter(|&i| i < points.len());
            match other {
                Some(other) => {
                    let span = points[self.point_index].distance(points[other]);
                    self.progress = (span - self.progress).max(0.0);
                    self.point_index = other;
                }
                None => self.progress = 0.0,
            }
        }
        self.last_direction = direction;
    }

    const fn is_exhausted(&self, len: usize, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.point_index + 1 >= len,
            Direction::Reverse => self.point_index == 0,
            Direction::Stopped => false,
        }
    }

    /// Resolve the next endpoint and enter it. Returns the new segment's
    /// points, or `None` when the step crossed a joint.
    fn enter_next<'a>(
        &mut self,
        track: &Track<'a>,
        direction: Direction,
    ) -> Result<Option<&'a Polyline>, DeadEnd> {
        let (from, at) = self.edge_toward(direction);
        let target = find_next_endpoint(track.layout, track.graph, from, at)?;
        self.previous = at;
        self.current = target;
        self.edge_direction = direction;
        self.last_direction = direction;

        if !target.same_piece(at) {
            self.segment = None;
            log::trace!("crossed {at} -> {target}");
            return Ok(None);
        }

        let key = SegmentKey::along(at, target, direction);
        let points = segment_points(track.layout, key, target)?;
        self.segment = Some(key);
        self.point_index = match direction {
            Direction::Reverse => points.len() - 1,
            Direction::Stopped | Direction::Forward => 0,
        };
        self.progress = 0.0;
        Ok(Some(points))
    }

    /// Advance `distance` along `points`, clamping at the final point.
    fn travel_along(
        &mut self,
        points: &[Point],
        distance: f64,
        direction: Direction,
        wheel_diameter: f64,
    ) -> Movement {
        self.progress += distance;
        let sign = direction.sign();

        let (pose, covered) = loop {
            let ahead = self
                .point_index
                .checked_add_signed(sign)
                .filter(|&i| i < points.len());
            let Some(ahead) = ahead else {
                // Overran the segment: stop on its last point.
                let leftover = self.progress;
                self.progress = 0.0;
                let behind = self.point_index.saturating_add_signed(-sign);
                let pose = TrainPose {
                    position: points[self.point_index],
                    heading: facing(points, behind, self.point_index),
                };
                break (pose, distance - leftover);
            };

            let (here, there) = (points[self.point_index], points[ahead]);
            let span = here.distance(there);
            if self.progress < span {
                let pose = TrainPose {
                    position: here.lerp(there, self.progress / span),
                    heading: facing(points, self.point_index, ahead),
                };
                break (pose, distance);
            }
            self.progress -= span;
            self.point_index = ahead;
        };

        Movement {
            pose,
            distance: covered,
            wheel_rotation: -direction.signum() * 2.0 * covered / wheel_diameter,
        }
    }
}

/// Heading along the stored order of the span between `a` and `b`.
fn facing(points: &[Point], a: usize, b: usize) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    heading(points[lo], points[hi])
}

fn segment_points(
    layout: &Layout,
    key: SegmentKey,
    at: EndpointRef,
) -> Result<&Polyline, DeadEnd> {
    let malformed = |reason| DeadEnd::Malformed { at, reason };
    let piece = layout
        .piece(key.piece)
        .map_err(|_| malformed(MalformedReason::UnknownPiece))?;
    let points = piece
        .world_points(key.from, key.to)
        .ok_or_else(|| malformed(MalformedReason::MissingSegment))?;
    if points.len() < 2 {
        return Err(malformed(MalformedReason::DegenerateSegment));
    }
    Ok(points)
}

/// Choose where a train arriving at `at` from `from` goes next.
///
/// Plain pieces must offer exactly one option. Turnouts route by rule:
/// leaving the turnout always lands on another piece (never branch to
/// branch through the common endpoint), entering at the common endpoint
/// follows the active branch, and entering at a branch leads to the
/// common endpoint.
///
/// # Errors
///
/// Returns [`DeadEnd::Terminus`] when there is nowhere to go, including
/// leaving a turnout whose far side is unconnected, and
/// [`DeadEnd::Malformed`] when the graph contradicts the routing rules.
pub fn find_next_endpoint(
    layout: &Layout,
    graph: &ConnectivityGraph,
    from: EndpointRef,
    at: EndpointRef,
) -> Result<EndpointRef, DeadEnd> {
    let options: Vec<EndpointRef> = graph.neighbors(at).filter(|&n| n != from).collect();
    if options.is_empty() {
        return Err(DeadEnd::Terminus { at });
    }

    let malformed = |reason| DeadEnd::Malformed { at, reason };
    let piece = layout
        .piece(at.piece)
        .map_err(|_| malformed(MalformedReason::UnknownPiece))?;

    if !piece.is_turnout() {
        return match options.as_slice() {
            [only] => Ok(*only),
            _ => Err(malformed(MalformedReason::AmbiguousForward {
                options: options.len(),
            })),
        };
    }

    if from.same_piece(at) {
        return options
            .iter()
            .copied()
            .find(|n| !n.same_piece(at))
            .ok_or(DeadEnd::Terminus { at });
    }

    let wanted = if at.index == COMMON_ENDPOINT {
        piece.active_branch().map(Branch::index)
    } else {
        Some(COMMON_ENDPOINT)
    };
    wanted
        .and_then(|index| {
            options
                .iter()
                .copied()
                .find(|n| n.same_piece(at) && n.index == index)
        })
        .ok_or_else(|| malformed(MalformedReason::TurnoutRouting))
}

/// Place a train on `start`, facing its first neighbour.
///
/// # Errors
///
/// Returns [`LayoutError::NotAVertex`] if `start` has no edges, otherwise
/// as [`spawn_toward`].
pub fn spawn(
    track: &Track<'_>,
    start: EndpointRef,
) -> Result<(TraversalState, TrainPose), LayoutError> {
    let toward = track
        .graph
        .neighbors(start)
        .next()
        .ok_or(LayoutError::NotAVertex(start))?;
    spawn_toward(track, start, toward)
}

/// Place a train on `from`, about to travel toward `to`.
///
/// Crossing spawns (on an external edge) start with no segment and face
/// east until the first move.
///
/// # Errors
///
/// Returns [`LayoutError::NotAdjacent`] if the two endpoints share no
/// edge and [`LayoutError::MissingSegment`] if the rail between them has
/// not been annotated.
pub fn spawn_toward(
    track: &Track<'_>,
    from: EndpointRef,
    to: EndpointRef,
) -> Result<(TraversalState, TrainPose), LayoutError> {
    if !track.graph.contains_edge(from, to) {
        return Err(LayoutError::NotAdjacent { from, to });
    }
    let mut state = TraversalState {
        previous: from,
        current: to,
        edge_direction: Direction::Forward,
        segment: None,
        point_index: 0,
        progress: 0.0,
        last_direction: Direction::Stopped,
    };

    let pose = if from.same_piece(to) {
        let key = SegmentKey::along(from, to, Direction::Forward);
        let piece = track.layout.piece(from.piece)?;
        let missing = LayoutError::MissingSegment {
            piece: from.piece,
            from: from.index,
            to: to.index,
        };
        let Some(&[first, second, ..]) = piece.world_points(key.from, key.to).map(Polyline::points)
        else {
            return Err(missing);
        };
        state.segment = Some(key);
        TrainPose::facing(first, second)
    } else {
        let position = track
            .layout
            .piece(from.piece)?
            .world_endpoint(from.index)
            .ok_or(LayoutError::NotAVertex(from))?;
        TrainPose {
            position,
            heading: 0.0,
        }
    };
    log::debug!("train spawned at {from} toward {to}");
    Ok((state, pose))
}

/// Advance the train one frame at `speed` units per frame.
///
/// Zero and non-finite speeds hold. On a dead end the input state is returned unchanged
/// along with [`Frame::DeadEnd`]; the caller decides what to do with the
/// speed.
#[must_use]
pub fn step(state: TraversalState, track: &Track<'_>, speed: f64) -> (TraversalState, Frame) {
    match advance(state, track, speed) {
        Ok(outcome) => outcome,
        Err(dead_end) => {
            dead_end.log();
            (state, Frame::DeadEnd(dead_end))
        }
    }
}

fn advance(
    state: TraversalState,
    track: &Track<'_>,
    speed: f64,
) -> Result<(TraversalState, Frame), DeadEnd> {
    let direction = Direction::from_speed(speed);
    if !direction.is_moving() {
        return Ok((state, Frame::Held));
    }
    let mut next = state;

    let ongoing = match next.segment {
        Some(key) => {
            let points = segment_points(track.layout, key, next.current)?;
            next.point_index = next.point_index.min(points.len() - 1);
            next.correct_reversal(points.points(), direction);
            (!next.is_exhausted(points.len(), direction)).then_some(points)
        }
        None => None,
    };

    let points = match ongoing {
        Some(points) => points,
        None => match next.enter_next(track, direction)? {
            Some(points) => points,
            None => {
                let frame = Frame::Crossed {
                    from: next.previous,
                    to: next.current,
                };
                return Ok((next, frame));
            }
        },
    };

    let movement = next.travel_along(
        points.points(),
        speed.abs(),
        direction,
        track.config.wheel_diameter,
    );
    Ok((next, Frame::Moved(movement)))
}
