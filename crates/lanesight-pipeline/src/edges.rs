//! Canny edge extraction.
//!
//! Runs Sobel gradients, non-maximum suppression, and hysteresis on an
//! already-blurred grayscale frame. The blur stage is owned by
//! [`crate::preprocess`], so unlike `imageproc::edges::canny` no
//! additional smoothing is applied here.
//!
//! Hysteresis checks all eight neighbours and bounds-checks each one,
//! which upstream `imageproc` 0.26 does not
//! (<https://github.com/image-rs/imageproc/issues/705>).

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// Minimum allowed Canny threshold.
///
/// A threshold of zero marks every pixel with any gradient, flooding the
/// Hough accumulator.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Value written for edge pixels.
pub const EDGE: u8 = 255;

/// Detect edges. Returns a binary map: [`EDGE`] for edges, 0 elsewhere.
///
/// Thresholds are clamped to at least [`MIN_THRESHOLD`] and `low` to at
/// most `high`.
#[must_use = "returns the binary edge map"]
pub fn extract_edges(blurred: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);

    let (w, h) = blurred.dimensions();
    if w < 3 || h < 3 {
        return GrayImage::new(w, h);
    }

    let gx = horizontal_sobel(blurred);
    let gy = vertical_sobel(blurred);
    let magnitude = Image::from_fn(w, h, |x, y| {
        let dx = f32::from(gx.get_pixel(x, y).0[0]);
        let dy = f32::from(gy.get_pixel(x, y).0[0]);
        Luma([dx.hypot(dy)])
    });

    let thinned = non_maximum_suppression(&magnitude, &gx, &gy);
    hysteresis(&thinned, low, high)
}

/// Count edge pixels.
#[must_use]
pub fn edge_pixel_count(edges: &GrayImage) -> usize {
    edges.pixels().filter(|p| p.0[0] > 0).count()
}

/// Quantized gradient direction, in degrees modulo 180.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Horizontal,
    Diagonal,
    Vertical,
    AntiDiagonal,
}

impl Direction {
    fn from_gradient(dx: f32, dy: f32) -> Self {
        let mut angle = dy.atan2(dx).to_degrees();
        if angle < 0.0 {
            angle += 180.0;
        }
        if (22.5..67.5).contains(&angle) {
            Self::Diagonal
        } else if (67.5..112.5).contains(&angle) {
            Self::Vertical
        } else if (112.5..157.5).contains(&angle) {
            Self::AntiDiagonal
        } else {
            Self::Horizontal
        }
    }

    /// The two neighbours across the edge for an interior pixel.
    const fn neighbours(self, x: u32, y: u32) -> [(u32, u32); 2] {
        match self {
            Self::Horizontal => [(x - 1, y), (x + 1, y)],
            Self::Diagonal => [(x + 1, y + 1), (x - 1, y - 1)],
            Self::Vertical => [(x, y - 1), (x, y + 1)],
            Self::AntiDiagonal => [(x - 1, y + 1), (x + 1, y - 1)],
        }
    }
}

fn non_maximum_suppression(
    magnitude: &Image<Luma<f32>>,
    gx: &Image<Luma<i16>>,
    gy: &Image<Luma<i16>>,
) -> Image<Luma<f32>> {
    let (w, h) = magnitude.dimensions();
    let mut out = Image::from_pixel(w, h, Luma([0.0_f32]));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let direction = Direction::from_gradient(
                f32::from(gx.get_pixel(x, y).0[0]),
                f32::from(gy.get_pixel(x, y).0[0]),
            );
            let value = magnitude.get_pixel(x, y).0[0];
            let [a, b] = direction.neighbours(x, y);
            if value >= magnitude.get_pixel(a.0, a.1).0[0]
                && value >= magnitude.get_pixel(b.0, b.1).0[0]
            {
                out.put_pixel(x, y, Luma([value]));
            }
        }
    }
    out
}

/// Keep strong pixels and any weak pixels 8-connected to them.
fn hysteresis(input: &Image<Luma<f32>>, low: f32, high: f32) -> GrayImage {
    let (w, h) = input.dimensions();
    let mut out = GrayImage::new(w, h);
    let mut stack = Vec::new();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if input.get_pixel(x, y).0[0] < high || out.get_pixel(x, y).0[0] != 0 {
                continue;
            }
            out.put_pixel(x, y, Luma([EDGE]));
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBOURS {
                    let (Some(nx), Some(ny)) =
                        (cx.checked_add_signed(dx), cy.checked_add_signed(dy))
                    else {
                        continue;
                    };
                    if nx >= w || ny >= h {
                        continue;
                    }
                    if input.get_pixel(nx, ny).0[0] >= low && out.get_pixel(nx, ny).0[0] == 0 {
                        out.put_pixel(nx, ny, Luma([EDGE]));
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
    out
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
