//! tracksim-export: Pure layout serializers (sans-IO)
//!
//! Converts prepared layouts into output formats. Currently supports SVG.

pub mod svg;

pub use svg::{SvgMetadata, build_path_data, to_svg};
