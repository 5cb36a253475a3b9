//! Integration tests: build small layouts end to end and drive a train
//! across them.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use tracksim_core::{
    Branch, Catalog, EdgeKind, EndpointRef, Frame, Layout, LayoutConfig, LayoutError, PieceId,
    Point, Simulation, Status, SystemClock,
};

fn ep(piece: u32, index: usize) -> EndpointRef {
    EndpointRef::new(PieceId(piece), index)
}

fn layout(pieces: &[(&str, f64, f64, f64)]) -> Layout {
    let mut layout = Layout::new(Catalog::builtin());
    for &(name, x, y, rotation) in pieces {
        let id = layout.add_piece(name, x, y).unwrap();
        if rotation != 0.0 {
            layout.rotate_piece(id, rotation).unwrap();
        }
    }
    layout
}

fn simulation(pieces: &[(&str, f64, f64, f64)]) -> Simulation {
    let config = LayoutConfig::default();
    let prepared = tracksim_core::prepare(layout(pieces), &config).expect("layout should build");
    Simulation::start(prepared, config).unwrap()
}

/// Tick until the train halts, collecting every position it moved to.
fn drive_to_halt(sim: &mut Simulation, limit: usize) -> Vec<Point> {
    let mut positions = Vec::new();
    for _ in 0..limit {
        if sim.context().status() != &Status::Running {
            break;
        }
        if let Frame::Moved(movement) = sim.tick() {
            positions.push(movement.pose.position);
        }
    }
    positions
}

const LINE: [(&str, f64, f64, f64); 2] = [
    ("straight20", 0.0, 0.0, 0.0),
    ("straight40", 20.0, 0.0, 0.0),
];

const SIDING: [(&str, f64, f64, f64); 3] = [
    ("straight20", -20.0, 0.0, 0.0),
    ("lhPoints", 0.0, 0.0, 0.0),
    ("straight20", 20.0, 0.0, 0.0),
];

const OVAL: [(&str, f64, f64, f64); 4] = [
    ("rad40curve90", 0.0, 0.0, 0.0),
    ("rad40curve90", 40.0, 40.0, 90.0),
    ("rad40curve90", 0.0, 80.0, 180.0),
    ("rad40curve90", -40.0, 40.0, 270.0),
];

#[test]
fn train_runs_the_full_line() {
    let mut sim = simulation(&LINE);
    assert_eq!(
        sim.prepared().graph().count_edges(EdgeKind::External),
        1,
        "exactly one joint between the two straights"
    );

    sim.context_mut().set_speed(1.0);
    let positions = drive_to_halt(&mut sim, 200);

    for pair in positions.windows(2) {
        assert!(pair[1].x >= pair[0].x - 1e-9, "train went backwards");
        assert!(pair[1].y.abs() < 1e-9);
    }
    assert!((sim.odometer() - 60.0).abs() < 1e-6);
    assert!(sim.pose().position.distance(Point::new(60.0, 0.0)) < 1e-9);
    assert_eq!(sim.context().status(), &Status::DeadEnd);
    assert!(sim.context().speed().abs() < f64::EPSILON);
}

#[test]
fn turnout_selects_the_route() {
    let mut sim = simulation(&SIDING);
    sim.context_mut().set_speed(1.0);
    drive_to_halt(&mut sim, 200);
    assert!(sim.pose().position.distance(Point::new(40.0, 0.0)) < 1e-9);

    assert_eq!(sim.toggle_turnout(PieceId(1)).unwrap(), Branch::Second);
    sim.respawn().unwrap();
    sim.context_mut().set_speed(1.0);
    drive_to_halt(&mut sim, 200);
    assert!(sim.pose().position.distance(Point::new(20.0, -10.0)) < 1e-6);
    assert_eq!(sim.state().current(), ep(1, 2));
}

#[test]
fn backing_off_the_branch_never_touches_the_main_line() {
    let mut sim = simulation(&SIDING);
    sim.toggle_turnout(PieceId(1)).unwrap();
    sim.context_mut().set_speed(1.0);
    drive_to_halt(&mut sim, 200);

    sim.context_mut().set_speed(-1.0);
    let positions = drive_to_halt(&mut sim, 200);
    assert!(!positions.is_empty());
    for p in positions.iter().filter(|p| p.x > 1.0) {
        assert!(p.y < 0.0, "train leaked onto the main line at {p:?}");
    }
    assert!(sim.pose().position.distance(Point::new(-20.0, 0.0)) < 1e-6);
    assert_eq!(sim.context().status(), &Status::DeadEnd);
}

#[test]
fn reversing_mid_rail_continues_from_the_same_spot() {
    let mut sim = simulation(&[("straight80", 0.0, 0.0, 0.0)]);
    sim.context_mut().set_speed(1.0);
    for _ in 0..23 {
        sim.tick();
    }
    assert!(sim.pose().position.distance(Point::new(23.0, 0.0)) < 1e-9);

    sim.context_mut().set_speed(-1.0);
    sim.tick();
    assert!(sim.pose().position.distance(Point::new(22.0, 0.0)) < 1e-9);

    sim.context_mut().set_speed(1.0);
    for _ in 0..3 {
        sim.tick();
    }
    assert!(sim.pose().position.distance(Point::new(25.0, 0.0)) < 1e-9);
}

#[test]
fn closed_loop_never_dead_ends() {
    let mut sim = simulation(&OVAL);
    assert!(sim.prepared().graph().vertices().all(|v| sim.prepared().graph().degree(v) == 2));

    sim.context_mut().set_speed(1.0);
    for _ in 0..1000 {
        assert!(sim.tick().dead_end().is_none());
    }
    // Spans shorter than a full step are clamped, so less than one unit
    // per frame can be covered.
    assert!(sim.odometer() > 900.0);
    assert!(sim.odometer() <= 1000.0 + 1e-9);
}

#[test]
fn three_way_joint_is_rejected() {
    let result = tracksim_core::prepare(
        layout(&[
            ("straight20", 0.0, 0.0, 0.0),
            ("straight20", 20.0, 0.0, 0.0),
            ("straight40", 20.0, 0.0, 0.0),
        ]),
        &LayoutConfig::default(),
    );
    assert!(matches!(result, Err(LayoutError::AmbiguousEndpoint { .. })));
}

#[test]
fn saved_layout_round_trips_into_the_same_graph() {
    let original = layout(&SIDING);
    let json = original.to_json().unwrap();
    let restored = Layout::from_json(Catalog::builtin(), &json).unwrap();
    assert_eq!(restored.to_saved(), original.to_saved());

    let config = LayoutConfig::default();
    let a = tracksim_core::prepare(original, &config).unwrap();
    let b = tracksim_core::prepare(restored, &config).unwrap();
    assert_eq!(a.graph().edge_count(), b.graph().edge_count());
    assert_eq!(a.start(), b.start());
    assert_eq!(a.bounds(), b.bounds());
}

#[test]
fn diagnostics_describe_the_build() {
    let (prepared, diagnostics) = tracksim_core::prepare_with_diagnostics(
        layout(&SIDING),
        &LayoutConfig::default(),
        &SystemClock,
    )
    .unwrap();
    assert_eq!(diagnostics.summary.pieces, 3);
    assert_eq!(diagnostics.summary.turnouts, 1);
    assert_eq!(diagnostics.summary.edges, prepared.graph().edge_count());
    // Two straights plus both turnout routes.
    assert_eq!(diagnostics.summary.directed_segments, 8);

    let report = diagnostics.report();
    assert!(report.contains("1 turnouts"));
}
