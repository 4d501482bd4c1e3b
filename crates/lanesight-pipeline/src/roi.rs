//! Region of interest: the road area below a fractional row cutoff.

use image::GrayImage;

/// First row (inclusive) searched for lane evidence.
#[must_use]
pub fn first_row(height: u32, y_min: f64) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let row = (f64::from(height) * y_min.clamp(0.0, 1.0)).ceil() as u32;
    row.min(height)
}

/// Copy of `edges` with every row above the region of interest cleared.
#[must_use = "returns the masked edge map"]
pub fn mask_edges(edges: &GrayImage, y_min: f64) -> GrayImage {
    let start = first_row(edges.height(), y_min);
    let mut out = edges.clone();
    for y in 0..start {
        for x in 0..out.width() {
            out.put_pixel(x, y, image::Luma([0]));
        }
    }
    out
}
