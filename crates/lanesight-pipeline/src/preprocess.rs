//! Frame preprocessing: resize, grayscale, Gaussian blur.
//!
//! Every frame is brought to the configured working resolution first so
//! that all downstream geometry (region of interest, BEV corners, center
//! offset, validation) is expressed in one pixel space.

use image::GrayImage;
use image::imageops::FilterType;

use crate::config::BlurConfig;
use crate::types::{Dimensions, RgbaImage};

/// Output of [`preprocess`].
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Grayscale frame at working resolution, before blur.
    pub gray: GrayImage,
    /// Blurred grayscale frame, ready for edge extraction.
    pub blurred: GrayImage,
}

/// Resize to `target` (bilinear) unless the frame already matches.
#[must_use = "returns the resized image"]
pub fn resize_to(image: &RgbaImage, target: Dimensions) -> Option<RgbaImage> {
    if image.width() == target.width && image.height() == target.height {
        return None;
    }
    Some(image::imageops::resize(
        image,
        target.width,
        target.height,
        FilterType::Triangle,
    ))
}

/// Build a normalized 1-D Gaussian kernel of odd length `size`.
///
/// A size of 1 or a non-positive sigma yields the identity kernel.
#[must_use]
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    if size <= 1 || sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = i64::from(size / 2);
    let denom = 2.0 * sigma * sigma;
    #[allow(clippy::cast_precision_loss)]
    let weights: Vec<f32> = (-radius..=radius)
        .map(|i| {
            let d = i as f32;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Blur a grayscale image with a separable Gaussian of explicit kernel size.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, blur: &BlurConfig) -> GrayImage {
    let kernel = gaussian_kernel(blur.kernel_size, blur.sigma);
    if kernel.len() == 1 {
        return image.clone();
    }
    imageproc::filter::separable_filter_equal(image, &kernel)
}

/// Resize, convert to single-channel luminance, and blur.
#[must_use]
pub fn preprocess(image: &RgbaImage, target: Dimensions, blur: &BlurConfig) -> Preprocessed {
    let gray = resize_to(image, target).map_or_else(
        || image::DynamicImage::ImageRgba8(image.clone()).to_luma8(),
        |resized| image::DynamicImage::ImageRgba8(resized).to_luma8(),
    );
    let blurred = gaussian_blur(&gray, blur);
    Preprocessed { gray, blurred }
}
