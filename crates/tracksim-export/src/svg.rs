//! SVG export serializer.
//!
//! Draws a prepared layout as an SVG string using the [`svg`] crate for
//! document construction, XML escaping, and path data formatting.
//!
//! Every rail becomes one `<path>` built from its forward world points
//! (`from < to`), so each rail is drawn once even though annotation
//! stores both directions. Turnout routes that are not currently set are
//! stroked in [`INACTIVE_STROKE`]. An optional train pose is drawn as a
//! marker with a short heading tick.
//!
//! Optional [`SvgMetadata`] embeds `<title>`, `<desc>`, and a structured
//! `<metadata>` element.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Description, Element, Group, Line, Path, Title};
use svg::node::{Node, Text, Value};

use tracksim_core::turnout::turnout_branches;
use tracksim_core::{PieceInstance, Polyline, PreparedLayout, TrainPose};

/// Space added around the layout bounds in the `viewBox`.
pub const VIEW_MARGIN: f64 = 10.0;
/// Stroke colour of routes the train can currently take.
pub const ACTIVE_STROKE: &str = "black";
/// Stroke colour of turnout routes that are set against.
pub const INACTIVE_STROKE: &str = "red";
/// Rail stroke width in layout units.
const RAIL_WIDTH: f64 = 2.0;
/// Radius of the train marker.
const TRAIN_RADIUS: f64 = 3.0;
/// Length of the heading tick drawn from the train marker.
const HEADING_TICK: f64 = 6.0;

/// Metadata to embed in the SVG document.
///
/// All fields are optional. Text values are XML-escaped automatically by
/// the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Saved-layout or config JSON, emitted inside `<metadata>` wrapped
    /// in a namespaced `<tracksim:layout>` element so exported drawings
    /// can be reloaded.
    pub layout_json: Option<&'a str>,
}

/// Build an SVG path `d` attribute string from a polyline.
///
/// Uses `M` for the first point and `L` for subsequent points.
/// Returns an empty string for polylines with fewer than 2 points.
///
/// # Examples
///
/// ```
/// use tracksim_core::{Point, Polyline};
/// use tracksim_export::build_path_data;
///
/// let polyline = Polyline::new(vec![
///     Point::new(10.0, 20.0),
///     Point::new(30.0, 40.0),
/// ]);
/// assert_eq!(build_path_data(&polyline), "M10,20 L30,40");
/// ```
#[must_use]
pub fn build_path_data(polyline: &Polyline) -> String {
    let points = polyline.points();
    if points.len() < 2 {
        return String::new();
    }

    let first = &points[0];
    let mut data = Data::new().move_to((first.x, first.y));
    for p in &points[1..] {
        data = data.line_to((p.x, p.y));
    }
    String::from(Value::from(data))
}

/// Rails of `piece` to draw, each once, with its stroke.
///
/// Turnouts are drawn from their branch projection so the route that is
/// set against stands out; other pieces draw every forward sequence.
fn piece_rails(piece: &PieceInstance) -> Vec<(&Polyline, &'static str)> {
    if let Some(branches) = turnout_branches(piece) {
        return vec![
            (branches.active, ACTIVE_STROKE),
            (branches.inactive, INACTIVE_STROKE),
        ];
    }
    piece
        .segments()
        .filter(|&((from, to), _)| from < to)
        .map(|(_, points)| (points, ACTIVE_STROKE))
        .collect()
}

/// Serialize a prepared layout into an SVG document string.
///
/// The `viewBox` covers the bounds of every world point plus
/// [`VIEW_MARGIN`] on each side. Rails are grouped under
/// `<g id="track">`, one `<path>` per rail carrying a `data-piece`
/// attribute. When `train` is given it is drawn under `<g id="train">`.
#[must_use]
pub fn to_svg(
    prepared: &PreparedLayout,
    metadata: &SvgMetadata<'_>,
    train: Option<TrainPose>,
) -> String {
    let bounds = prepared.bounds();
    let (min_x, min_y) = if bounds.is_empty() {
        (0.0, 0.0)
    } else {
        (bounds.min_x, bounds.min_y)
    };
    let width = 2.0f64.mul_add(VIEW_MARGIN, bounds.width());
    let height = 2.0f64.mul_add(VIEW_MARGIN, bounds.height());

    let mut doc = Document::new()
        .set("width", width)
        .set("height", height)
        .set(
            "viewBox",
            (min_x - VIEW_MARGIN, min_y - VIEW_MARGIN, width, height),
        );

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }

    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if let Some(layout_json) = metadata.layout_json {
        let mut layout_el = Element::new("tracksim:layout");
        layout_el.assign("xmlns:tracksim", "urn:tracksim:layout:1");
        layout_el.append(Text::new(layout_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(layout_el);
        doc = doc.add(metadata_el);
    }

    let mut track = Group::new()
        .set("id", "track")
        .set("fill", "none")
        .set("stroke-width", RAIL_WIDTH)
        .set("stroke-linecap", "round");
    for piece in prepared.layout().pieces() {
        for (points, stroke) in piece_rails(piece) {
            let d = build_path_data(points);
            if d.is_empty() {
                continue;
            }
            track = track.add(
                Path::new()
                    .set("d", d)
                    .set("stroke", stroke)
                    .set("data-piece", piece.id().to_string()),
            );
        }
    }
    doc = doc.add(track);

    if let Some(pose) = train {
        let p = pose.position;
        let (sin, cos) = pose.heading.sin_cos();
        let tick = Line::new()
            .set("x1", p.x)
            .set("y1", p.y)
            .set("x2", HEADING_TICK.mul_add(cos, p.x))
            .set("y2", HEADING_TICK.mul_add(sin, p.y))
            .set("stroke", "blue")
            .set("stroke-width", RAIL_WIDTH);
        let marker = Circle::new()
            .set("cx", p.x)
            .set("cy", p.y)
            .set("r", TRAIN_RADIUS)
            .set("fill", "blue");
        doc = doc.add(Group::new().set("id", "train").add(marker).add(tick));
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tracksim_core::{Branch, Catalog, Layout, LayoutConfig, PieceId, Point};

    use super::*;

    fn prepared(pieces: &[(&str, f64, f64)]) -> PreparedLayout {
        let mut layout = Layout::new(Catalog::builtin());
        for &(name, x, y) in pieces {
            layout.add_piece(name, x, y).unwrap();
        }
        tracksim_core::prepare(layout, &LayoutConfig::default()).unwrap()
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    // --- build_path_data ---

    #[test]
    fn build_path_data_empty_polyline() {
        assert_eq!(build_path_data(&Polyline::new(vec![])), "");
    }

    #[test]
    fn build_path_data_single_point() {
        let polyline = Polyline::new(vec![Point::new(5.0, 5.0)]);
        assert_eq!(build_path_data(&polyline), "");
    }

    #[test]
    fn build_path_data_three_points() {
        let polyline = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, -5.5),
        ]);
        assert_eq!(build_path_data(&polyline), "M0,0 L10,0 L10,-5.5");
    }

    // --- to_svg ---

    #[test]
    fn one_path_per_rail() {
        let svg = to_svg(
            &prepared(&[("straight20", 0.0, 0.0), ("straight40", 20.0, 0.0)]),
            &no_meta(),
            None,
        );
        assert!(svg.starts_with("<?xml"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains(r#"data-piece="piece-1""#));
        assert!(!svg.contains(INACTIVE_STROKE));
    }

    #[test]
    fn view_box_covers_bounds_plus_margin() {
        let svg = to_svg(&prepared(&[("straight20", 0.0, 0.0)]), &no_meta(), None);
        assert!(svg.contains(r#"viewBox="-10 -10 40 20""#), "{svg}");
    }

    #[test]
    fn inactive_turnout_route_is_red() {
        let mut layout = prepared(&[("lhPoints", 0.0, 0.0)]);
        let svg = to_svg(&layout, &no_meta(), None);
        assert_eq!(svg.matches("<path").count(), 2);
        assert_eq!(svg.matches(r#"stroke="red""#).count(), 1);

        layout.set_turnout(PieceId(0), Branch::Second).unwrap();
        let rails = piece_rails(&layout.layout().pieces()[0]);
        let red: Vec<Point> = rails
            .iter()
            .filter(|(_, stroke)| *stroke == INACTIVE_STROKE)
            .filter_map(|(points, _)| points.last().copied())
            .collect();
        assert_eq!(red.len(), 1);
        assert!(red[0].distance(Point::new(20.0, 0.0)) < 1e-9);
    }

    #[test]
    fn plain_pieces_draw_forward_rails_only() {
        let layout = prepared(&[("straight20", 0.0, 0.0)]);
        let rails = piece_rails(&layout.layout().pieces()[0]);
        assert_eq!(rails.len(), 1);
        assert_eq!(rails[0].0.first(), Some(&Point::new(0.0, 0.0)));
        assert_eq!(rails[0].1, ACTIVE_STROKE);
    }

    #[test]
    fn train_marker_is_optional() {
        let layout = prepared(&[("straight20", 0.0, 0.0)]);
        assert!(!to_svg(&layout, &no_meta(), None).contains(r#"id="train""#));

        let pose = TrainPose {
            position: Point::new(5.0, 0.0),
            heading: 0.0,
        };
        let svg = to_svg(&layout, &no_meta(), Some(pose));
        assert!(svg.contains(r#"id="train""#));
        assert!(svg.contains(r#"cx="5""#));
        assert!(svg.contains(r#"x2="11""#));
    }

    #[test]
    fn metadata_is_escaped() {
        let meta = SvgMetadata {
            title: Some("Yard <east>"),
            description: Some("step=1 & threshold=2"),
            layout_json: Some(r#"{"pieces":[]}"#),
        };
        let svg = to_svg(&prepared(&[("straight20", 0.0, 0.0)]), &meta, None);
        assert!(svg.contains("<title>Yard &lt;east&gt;</title>"));
        assert!(svg.contains("step=1 &amp; threshold=2"));
        assert!(svg.contains(r#"xmlns:tracksim="urn:tracksim:layout:1""#));
    }
}
