//! lanesight-export: Pure format serializers (sans-IO)
//!
//! Turns pipeline output into text: validation log rows and lane
//! overlays as SVG. Nothing here touches the filesystem.

pub mod log;
pub mod svg;

pub use log::{LogError, header, parse_row, summary_line, to_log, to_row};
pub use svg::{SvgMetadata, build_path_data, role_color, role_rgb, to_overlay_svg};
