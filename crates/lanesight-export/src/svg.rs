//! SVG export of lane overlays.
//!
//! Each overlay polyline becomes a `<path>` in image pixel coordinates
//! (`viewBox` = frame size), so the SVG can be laid directly over the
//! frame it came from. Documents are built with the [`svg`] crate, which
//! handles XML escaping and path data formatting.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Path, Title};
use svg::node::{Node, Text, Value};

use lanesight_pipeline::{Dimensions, Overlay, OverlayRole, Polyline};

/// Stroke width for boundary lines, in pixels.
const BOUNDARY_STROKE_WIDTH: u32 = 6;
/// Stroke width for the center line, in pixels.
const CENTER_STROKE_WIDTH: u32 = 4;

/// Metadata to embed in the SVG document. All fields are optional.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Emitted as `<title>`, typically the frame id.
    pub title: Option<&'a str>,

    /// Emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized lane configuration, emitted inside
    /// `<metadata><lanesight:config>` so overlays record the settings
    /// that produced them.
    pub config_json: Option<&'a str>,
}

/// Stroke color for each overlay role, as `[r, g, b]`. Raster and SVG
/// output share this palette.
#[must_use]
pub const fn role_rgb(role: OverlayRole) -> [u8; 3] {
    match role {
        OverlayRole::Left => [0xff, 0x3b, 0x30],
        OverlayRole::Right => [0x0a, 0x84, 0xff],
        OverlayRole::Center => [0x30, 0xd1, 0x58],
    }
}

/// [`role_rgb`] as an SVG `#rrggbb` color.
#[must_use]
pub fn role_color(role: OverlayRole) -> String {
    let [r, g, b] = role_rgb(role);
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Build an SVG path `d` attribute string from a polyline.
///
/// Returns an empty string for polylines with fewer than 2 points.
///
/// # Examples
///
/// ```
/// use lanesight_pipeline::{Point, Polyline};
/// use lanesight_export::build_path_data;
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
    let Some((first, rest)) = points.split_first() else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }

    let mut data = Data::new().move_to((first.x, first.y));
    for p in rest {
        data = data.line_to((p.x, p.y));
    }
    String::from(Value::from(data))
}

/// Serialize an overlay as a standalone SVG document sized to the frame.
///
/// Lines run outside the frame are kept; the `viewBox` clips them.
/// An empty overlay still yields a valid document with no paths.
#[must_use]
pub fn to_overlay_svg(
    overlay: &Overlay,
    dimensions: Dimensions,
    metadata: &SvgMetadata<'_>,
) -> String {
    let (w, h) = (dimensions.width, dimensions.height);
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("lanesight:config");
        config_el.assign("xmlns:lanesight", "https://lanesight.dev/ns/1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    for (role, polyline) in overlay.lines() {
        let d = build_path_data(polyline);
        if d.is_empty() {
            continue;
        }
        let width = match role {
            OverlayRole::Center => CENTER_STROKE_WIDTH,
            OverlayRole::Left | OverlayRole::Right => BOUNDARY_STROKE_WIDTH,
        };
        let mut path = Path::new()
            .set("id", role.name())
            .set("d", d)
            .set("fill", "none")
            .set("stroke", role_color(role))
            .set("stroke-width", width)
            .set("stroke-linecap", "round");
        if role == OverlayRole::Center {
            path = path.set("stroke-dasharray", "24 16");
        }
        doc = doc.add(path);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
