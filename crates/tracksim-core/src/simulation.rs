//! Simulation driver: owns a prepared layout, the train, and the
//! operator's controls, and advances everything one frame per tick.
//!
//! [`SimulationContext`] is the operator-facing state (speed, direction,
//! status). [`Simulation`] threads a [`TraversalState`] through
//! [`traversal::step`](crate::traversal::step) and applies dead-end
//! handling: whenever the train cannot continue, speed is forced to zero
//! and the status says why.

use serde::{Deserialize, Serialize};

use crate::build::PreparedLayout;
use crate::layout::Layout;
use crate::traversal::{DeadEnd, Direction, Frame, TrainPose, TraversalState, spawn, step};
use crate::turnout::Branch;
use crate::types::{LayoutConfig, LayoutError, PieceId, Point};

/// What the train is doing, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Moving under a nonzero speed.
    Running,
    /// Speed is zero by request.
    Stopped,
    /// Halted at the end of the track.
    DeadEnd,
    /// Halted on an inconsistent graph.
    Malformed(String),
}

/// Speed controls and operator-visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationContext {
    speed: f64,
    max_speed: f64,
    speed_increment: f64,
    direction: Direction,
    status: Status,
}

impl SimulationContext {
    /// A stopped context using the speed limits of `config`.
    #[must_use]
    pub const fn new(config: &LayoutConfig) -> Self {
        Self {
            speed: 0.0,
            max_speed: config.max_speed,
            speed_increment: config.speed_increment,
            direction: Direction::Stopped,
            status: Status::Stopped,
        }
    }

    /// Current speed in units per frame.
    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Direction implied by the current speed.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> &Status {
        &self.status
    }

    /// Speed as the readout shows it: tenths, rounded.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn speed_display(&self) -> i64 {
        (self.speed * 10.0).round() as i64
    }

    /// Set the speed, snapped to a multiple of the speed increment and
    /// then clamped to `[-max_speed, max_speed]`. Returns the applied
    /// speed.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        let speed = if speed.is_nan() { 0.0 } else { speed };
        let snapped = (speed / self.speed_increment).round() * self.speed_increment;
        self.speed = snapped.clamp(-self.max_speed, self.max_speed);
        self.direction = Direction::from_speed(self.speed);
        self.status = if self.direction.is_moving() {
            Status::Running
        } else {
            Status::Stopped
        };
        self.speed
    }

    /// Change the speed by `delta`. Returns the applied speed.
    pub fn adjust_speed(&mut self, delta: f64) -> f64 {
        self.set_speed(self.speed + delta)
    }

    /// One increment faster (or less reverse).
    pub fn speed_up(&mut self) -> f64 {
        self.adjust_speed(self.speed_increment)
    }

    /// One increment slower (or more reverse).
    pub fn slow_down(&mut self) -> f64 {
        self.adjust_speed(-self.speed_increment)
    }

    fn halt(&mut self, dead_end: &DeadEnd) {
        self.speed = 0.0;
        self.direction = Direction::Stopped;
        self.status = match dead_end {
            DeadEnd::Terminus { .. } => Status::DeadEnd,
            DeadEnd::Malformed { reason, .. } => Status::Malformed(reason.to_string()),
        };
    }
}

/// Ground-plane and camera sizing for a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneFrame {
    /// Centre of the layout bounds; world points are drawn relative to it.
    pub center: Point,
    /// Ground-plane width: bounds width plus margin.
    pub ground_width: f64,
    /// Ground-plane depth: bounds height plus margin.
    pub ground_height: f64,
    /// Larger of the bounds' width and height, for camera fitting.
    pub layout_size: f64,
}

impl SceneFrame {
    /// `point` relative to the layout centre.
    #[must_use]
    pub fn recentered(&self, point: Point) -> Point {
        Point::new(point.x - self.center.x, point.y - self.center.y)
    }
}

/// A running simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    prepared: PreparedLayout,
    config: LayoutConfig,
    context: SimulationContext,
    state: TraversalState,
    pose: TrainPose,
    odometer: f64,
}

impl Simulation {
    /// Spawn the train on the start vertex of `prepared`, stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidConfig`] for unusable parameters and
    /// propagates spawn errors.
    pub fn start(prepared: PreparedLayout, config: LayoutConfig) -> Result<Self, LayoutError> {
        config.validate()?;
        let (state, pose) = spawn(&prepared.track(&config), prepared.start())?;
        Ok(Self {
            context: SimulationContext::new(&config),
            prepared,
            config,
            state,
            pose,
            odometer: 0.0,
        })
    }

    /// Operator controls and status.
    #[must_use]
    pub const fn context(&self) -> &SimulationContext {
        &self.context
    }

    /// Mutable operator controls.
    pub const fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.context
    }

    /// The layout being driven on.
    #[must_use]
    pub const fn prepared(&self) -> &PreparedLayout {
        &self.prepared
    }

    /// Parameters in use.
    #[must_use]
    pub const fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Current traversal state.
    #[must_use]
    pub const fn state(&self) -> &TraversalState {
        &self.state
    }

    /// Last known pose of the train.
    #[must_use]
    pub const fn pose(&self) -> TrainPose {
        self.pose
    }

    /// Total distance moved since the last spawn.
    #[must_use]
    pub const fn odometer(&self) -> f64 {
        self.odometer
    }

    /// Advance one frame at the context's speed.
    pub fn tick(&mut self) -> Frame {
        let track = self.prepared.track(&self.config);
        let (state, frame) = step(self.state, &track, self.context.speed);
        self.state = state;
        match &frame {
            Frame::Moved(movement) => {
                self.pose = movement.pose;
                self.odometer += movement.distance;
            }
            Frame::DeadEnd(dead_end) => self.context.halt(dead_end),
            Frame::Held | Frame::Crossed { .. } => {}
        }
        frame
    }

    /// Flip a turnout between frames.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownPiece`] or [`LayoutError::NotATurnout`].
    pub fn toggle_turnout(&mut self, id: PieceId) -> Result<Branch, LayoutError> {
        self.prepared.toggle_turnout(id)
    }

    /// Put the train back on the start vertex, stopped.
    ///
    /// # Errors
    ///
    /// Propagates spawn errors.
    pub fn respawn(&mut self) -> Result<TrainPose, LayoutError> {
        let (state, pose) = spawn(&self.prepared.track(&self.config), self.prepared.start())?;
        self.state = state;
        self.pose = pose;
        self.odometer = 0.0;
        self.context.set_speed(0.0);
        Ok(pose)
    }

    /// Replace the layout after a topology edit, rebuilding the graph and
    /// every world point, then respawn.
    ///
    /// # Errors
    ///
    /// Propagates build errors. The previous layout stays in place on
    /// failure.
    pub fn rebuild(&mut self, layout: Layout) -> Result<TrainPose, LayoutError> {
        self.prepared = crate::prepare(layout, &self.config)?;
        self.respawn()
    }

    /// Ground-plane and camera sizing for the current layout.
    #[must_use]
    pub fn scene(&self) -> SceneFrame {
        let bounds = self.prepared.bounds();
        SceneFrame {
            center: bounds.center(),
            ground_width: bounds.width() + self.config.ground_margin,
            ground_height: bounds.height() + self.config.ground_margin,
            layout_size: bounds.width().max(bounds.height()),
        }
    }

    /// Stop simulating and give the layout back to the editor.
    #[must_use]
    pub fn into_layout(self) -> Layout {
        self.prepared.into_layout()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn layout(pieces: &[(&str, f64, f64)]) -> Layout {
        let mut layout = Layout::new(Catalog::builtin());
        for &(name, x, y) in pieces {
            layout.add_piece(name, x, y).unwrap();
        }
        layout
    }

    fn simulation(pieces: &[(&str, f64, f64)]) -> Simulation {
        let config = LayoutConfig::default();
        let prepared = crate::prepare(layout(pieces), &config).unwrap();
        Simulation::start(prepared, config).unwrap()
    }

    // --- SimulationContext tests ---

    #[test]
    fn speed_is_clamped_and_rounded() {
        let mut ctx = SimulationContext::new(&LayoutConfig::default());
        assert!((ctx.adjust_speed(0.34) - 0.3).abs() < 1e-12);
        assert!((ctx.adjust_speed(5.0) - 1.0).abs() < 1e-12);
        assert!((ctx.set_speed(-7.0) + 1.0).abs() < 1e-12);
        assert_eq!(ctx.direction(), Direction::Reverse);
        assert_eq!(ctx.status(), &Status::Running);
        assert_eq!(ctx.speed_display(), -10);
    }

    #[test]
    fn increments_accumulate_without_drift() {
        let mut ctx = SimulationContext::new(&LayoutConfig::default());
        for _ in 0..3 {
            ctx.speed_up();
        }
        assert_eq!(ctx.speed_display(), 3);
        for _ in 0..3 {
            ctx.slow_down();
        }
        assert!(ctx.speed().abs() < f64::EPSILON);
        assert_eq!(ctx.direction(), Direction::Stopped);
        assert_eq!(ctx.status(), &Status::Stopped);
    }

    #[test]
    fn clamp_uses_configured_max() {
        let config = LayoutConfig {
            max_speed: 0.25,
            ..LayoutConfig::default()
        };
        let mut ctx = SimulationContext::new(&config);
        assert!((ctx.set_speed(1.0) - 0.25).abs() < 1e-12);
        assert!((ctx.set_speed(-3.0) + 0.25).abs() < 1e-12);
        assert!((ctx.set_speed(f64::INFINITY) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn increments_follow_configured_step() {
        let config = LayoutConfig {
            speed_increment: 0.04,
            ..LayoutConfig::default()
        };
        let mut ctx = SimulationContext::new(&config);
        assert!((ctx.speed_up() - 0.04).abs() < 1e-12);
        assert!((ctx.speed_up() - 0.08).abs() < 1e-12);
        assert_eq!(ctx.direction(), Direction::Forward);
        assert!((ctx.set_speed(0.05) - 0.04).abs() < 1e-12);
        ctx.slow_down();
        assert!(ctx.speed().abs() < 1e-12);
        assert_eq!(ctx.status(), &Status::Stopped);
    }

    // --- Simulation tests ---

    #[test]
    fn start_spawns_stopped_at_start_vertex() {
        let sim = simulation(&[("straight20", 5.0, 5.0)]);
        assert_eq!(sim.pose().position, Point::new(5.0, 5.0));
        assert_eq!(sim.context().status(), &Status::Stopped);
        let mut sim = sim;
        assert_eq!(sim.tick(), Frame::Held);
    }

    #[test]
    fn dead_end_forces_speed_to_zero() {
        let mut sim = simulation(&[("straight20", 0.0, 0.0)]);
        sim.context_mut().set_speed(1.0);
        let mut last = Frame::Held;
        for _ in 0..25 {
            last = sim.tick();
        }
        assert!(matches!(last, Frame::Held));
        assert!(sim.context().speed().abs() < f64::EPSILON);
        assert_eq!(sim.context().status(), &Status::DeadEnd);
        assert!((sim.odometer() - 20.0).abs() < 1e-9);
        assert_eq!(sim.pose().position, Point::new(20.0, 0.0));
    }

    #[test]
    fn toggling_turnout_changes_route() {
        let pieces = [("straight20", -20.0, 0.0), ("lhPoints", 0.0, 0.0)];
        let mut sim = simulation(&pieces);
        sim.toggle_turnout(PieceId(1)).unwrap();
        sim.context_mut().set_speed(1.0);
        while sim.context().status() == &Status::Running {
            sim.tick();
        }
        assert!(sim.pose().position.distance(Point::new(20.0, -10.0)) < 1e-6);

        sim.toggle_turnout(PieceId(1)).unwrap();
        sim.respawn().unwrap();
        sim.context_mut().set_speed(1.0);
        while sim.context().status() == &Status::Running {
            sim.tick();
        }
        assert!(sim.pose().position.distance(Point::new(20.0, 0.0)) < 1e-9);
    }

    #[test]
    fn rebuild_after_edit_respawns() {
        let mut sim = simulation(&[("straight20", 0.0, 0.0)]);
        sim.context_mut().set_speed(1.0);
        sim.tick();

        let mut layout = sim.prepared().layout().clone();
        layout.add_piece("straight40", 20.0, 0.0).unwrap();
        sim.rebuild(layout).unwrap();
        assert!(sim.odometer().abs() < f64::EPSILON);
        assert_eq!(sim.context().status(), &Status::Stopped);
        assert_eq!(sim.prepared().graph().edge_count(), 3);
    }

    #[test]
    fn failed_rebuild_keeps_previous_layout() {
        let mut sim = simulation(&[("straight20", 0.0, 0.0)]);
        let mut layout = sim.prepared().layout().clone();
        layout.add_piece("straight20", 200.0, 0.0).unwrap();
        assert!(matches!(
            sim.rebuild(layout).unwrap_err(),
            LayoutError::DisconnectedLayout { .. }
        ));
        assert_eq!(sim.prepared().layout().len(), 1);
    }

    #[test]
    fn scene_frame_sizes_ground_from_bounds() {
        let sim = simulation(&[("straight20", 0.0, 0.0), ("straight40", 20.0, 0.0)]);
        let scene = sim.scene();
        assert_eq!(scene.center, Point::new(30.0, 0.0));
        assert!((scene.ground_width - 80.0).abs() < 1e-9);
        assert!((scene.ground_height - 20.0).abs() < 1e-9);
        assert!((scene.layout_size - 60.0).abs() < 1e-9);
        assert_eq!(scene.recentered(Point::new(60.0, 0.0)), Point::new(30.0, 0.0));
    }
}
