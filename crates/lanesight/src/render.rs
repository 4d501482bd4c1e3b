//! Overlay rendering onto camera frames via tiny-skia.

use image::{Rgba, RgbaImage};
use lanesight_export::role_rgb;
use lanesight_pipeline::{Dimensions, Overlay, OverlayRole, Polyline};
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, StrokeDash, Transform};

/// Boundary stroke width at working resolution.
const BOUNDARY_WIDTH: f64 = 6.0;
/// Center stroke width at working resolution.
const CENTER_WIDTH: f64 = 4.0;

#[allow(clippy::cast_possible_truncation)]
fn build_path(polyline: &Polyline, scale_x: f64, scale_y: f64) -> Option<tiny_skia::Path> {
    let (first, rest) = polyline.points().split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to((first.x * scale_x) as f32, (first.y * scale_y) as f32);
    for p in rest {
        pb.line_to((p.x * scale_x) as f32, (p.y * scale_y) as f32);
    }
    pb.finish()
}

/// Draw `overlay` (in working-resolution coordinates) over `frame`.
///
/// Stroke widths scale with the frame so overlays look the same at any
/// native resolution.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn render_overlay(frame: &RgbaImage, overlay: &Overlay, working: Dimensions) -> RgbaImage {
    let (width, height) = frame.dimensions();
    let Some(mut pixmap) = Pixmap::new(width, height) else {
        return frame.clone();
    };

    // Premultiply into the pixmap.
    for (dst, src) in pixmap.data_mut().chunks_exact_mut(4).zip(frame.pixels()) {
        let [r, g, b, a] = src.0;
        let premul = |c: u8| (u16::from(c) * u16::from(a) / 255) as u8;
        dst.copy_from_slice(&[premul(r), premul(g), premul(b), a]);
    }

    let scale_x = f64::from(width) / f64::from(working.width.max(1));
    let scale_y = f64::from(height) / f64::from(working.height.max(1));

    for (role, polyline) in overlay.lines() {
        let Some(path) = build_path(polyline, scale_x, scale_y) else {
            continue;
        };
        let [r, g, b] = role_rgb(role);
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, 255);
        paint.anti_alias = true;

        let base = match role {
            OverlayRole::Center => CENTER_WIDTH,
            OverlayRole::Left | OverlayRole::Right => BOUNDARY_WIDTH,
        };
        let stroke_width = (base * scale_x) as f32;
        let dash = (role == OverlayRole::Center)
            .then(|| StrokeDash::new(vec![stroke_width * 6.0, stroke_width * 4.0], 0.0))
            .flatten();
        let stroke = Stroke {
            width: stroke_width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            dash,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }

    // Un-premultiply back to straight RGBA.
    let data = pixmap.data();
    let mut img = RgbaImage::new(width, height);
    for (pixel, px) in img.pixels_mut().zip(data.chunks_exact(4)) {
        let a = px[3];
        *pixel = if a == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            let un = |c: u8| (u16::from(c) * 255 / u16::from(a)).min(255) as u8;
            Rgba([un(px[0]), un(px[1]), un(px[2]), a])
        };
    }
    img
}
