//! Integration test: build a closed oval, run a train
//! around it, and export the result to SVG.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::PathBuf;

use tracksim_core::{Catalog, Layout, LayoutConfig, PieceId, Simulation};

#[test]
fn oval_layout_to_svg() {
    let mut layout = Layout::new(Catalog::builtin());
    for (name, x, y, rotation) in [
        ("rad40curve90", 0.0, 0.0, 0.0),
        ("rad40curve90", 40.0, 40.0, 90.0),
        ("rad40curve90", 0.0, 80.0, 180.0),
        ("rad40curve90", -40.0, 40.0, 270.0),
    ] {
        let id = layout.add_piece(name, x, y).unwrap();
        layout.rotate_piece(id, rotation).unwrap();
    }

    let config = LayoutConfig::default();
    let prepared = tracksim_core::prepare(layout, &config).expect("oval should build");
    let mut sim = Simulation::start(prepared, config).unwrap();
    sim.context_mut().set_speed(1.0);
    for _ in 0..100 {
        sim.tick();
    }
    eprintln!(
        "Train at {:?} after {:.1} units",
        sim.pose().position,
        sim.odometer()
    );

    let json = sim.prepared().layout().to_json().unwrap();
    let metadata = tracksim_export::SvgMetadata {
        title: Some("oval"),
        description: Some("four quarter curves"),
        layout_json: Some(&json),
    };
    let svg = tracksim_export::to_svg(sim.prepared(), &metadata, Some(sim.pose()));

    assert!(svg.contains("<svg"));
    assert_eq!(svg.matches("<path").count(), 4);
    assert!(svg.contains(r#"id="train""#));
    assert!(svg.contains("</svg>"));
    assert!(!svg.contains(&format!(r#"data-piece="{}""#, PieceId(4))));

    // Write SVG to a temp location so we can inspect it.
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    let target = workspace_root.join("target");
    if target.is_dir() {
        let output_path = target.join("oval-output.svg");
        std::fs::write(&output_path, &svg).unwrap();
        eprintln!("SVG written to {output_path:?} ({} bytes)", svg.len());
    }
}
