//! Pipeline configuration and startup validation.
//!
//! [`LaneConfig`] is the plain, serializable parameter set. It is loaded
//! once before the pipeline starts and never mutated afterwards. Every
//! consumer takes a [`ValidatedConfig`], which can only be obtained
//! through [`LaneConfig::validate`], so invalid combinations fail fast
//! at load time instead of surfacing mid-stream.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, Point};

/// Target working resolution that every frame is resized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Working width in pixels.
    pub width: u32,
    /// Working height in pixels.
    pub height: u32,
}

impl ImageConfig {
    /// Default working width (simulator camera width).
    pub const DEFAULT_WIDTH: u32 = 1280;
    /// Default working height (simulator camera height).
    pub const DEFAULT_HEIGHT: u32 = 720;

    /// The working resolution as [`Dimensions`].
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
        }
    }
}

/// Gaussian blur applied before edge detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Kernel width and height in pixels. Must be odd and positive.
    pub kernel_size: u32,
    /// Standard deviation of the Gaussian. Must be positive.
    pub sigma: f32,
}

impl BlurConfig {
    /// Default kernel size.
    pub const DEFAULT_KERNEL_SIZE: u32 = 5;
    /// Default sigma.
    pub const DEFAULT_SIGMA: f32 = 1.4;
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            kernel_size: Self::DEFAULT_KERNEL_SIZE,
            sigma: Self::DEFAULT_SIGMA,
        }
    }
}

/// Canny edge detector thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Gradient magnitude above which a pixel may extend an edge.
    pub low_threshold: f32,
    /// Gradient magnitude above which a pixel starts an edge.
    /// Must be strictly greater than `low_threshold`.
    pub high_threshold: f32,
}

impl EdgeConfig {
    /// Default low threshold.
    pub const DEFAULT_LOW: f32 = 50.0;
    /// Default high threshold.
    pub const DEFAULT_HIGH: f32 = 150.0;
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            low_threshold: Self::DEFAULT_LOW,
            high_threshold: Self::DEFAULT_HIGH,
        }
    }
}

/// Line segment detector (Hough) parameters and region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Radial resolution of the accumulator in pixels.
    pub rho_step: f64,
    /// Angular resolution of the accumulator in degrees.
    pub theta_step_degrees: f64,
    /// Minimum accumulator votes for a line candidate.
    pub vote_threshold: u32,
    /// Shortest segment that is reported, in pixels.
    pub min_length: f64,
    /// Largest gap between collinear pieces that are still joined, in pixels.
    pub max_gap: f64,
    /// Only rows at or below `roi_y_min * height` are searched.
    pub roi_y_min: f64,
}

impl SegmentConfig {
    /// Default radial resolution.
    pub const DEFAULT_RHO_STEP: f64 = 1.0;
    /// Default angular resolution.
    pub const DEFAULT_THETA_STEP_DEGREES: f64 = 1.0;
    /// Default vote threshold.
    pub const DEFAULT_VOTE_THRESHOLD: u32 = 50;
    /// Default minimum segment length.
    pub const DEFAULT_MIN_LENGTH: f64 = 40.0;
    /// Default maximum gap.
    pub const DEFAULT_MAX_GAP: f64 = 20.0;
    /// Default region-of-interest cutoff.
    pub const DEFAULT_ROI_Y_MIN: f64 = 0.6;
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            rho_step: Self::DEFAULT_RHO_STEP,
            theta_step_degrees: Self::DEFAULT_THETA_STEP_DEGREES,
            vote_threshold: Self::DEFAULT_VOTE_THRESHOLD,
            min_length: Self::DEFAULT_MIN_LENGTH,
            max_gap: Self::DEFAULT_MAX_GAP,
            roi_y_min: Self::DEFAULT_ROI_Y_MIN,
        }
    }
}

/// Segment classification parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Segments whose `|dy/dx|` is below this are treated as horizontal
    /// artifacts and discarded.
    pub min_abs_slope: f64,
}

impl FitConfig {
    /// Default minimum absolute slope.
    pub const DEFAULT_MIN_ABS_SLOPE: f64 = 0.3;
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            min_abs_slope: Self::DEFAULT_MIN_ABS_SLOPE,
        }
    }
}

/// Temporal tracking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Weight of the previous estimate in the exponential moving average,
    /// in `[0, 1]`.
    pub alpha: f64,
    /// Consecutive frames a tracked side may go undetected before it is dropped.
    pub max_missing_frames: u32,
}

impl TrackingConfig {
    /// Default smoothing factor.
    pub const DEFAULT_ALPHA: f64 = 0.8;
    /// Default missing-frame budget.
    pub const DEFAULT_MAX_MISSING_FRAMES: u32 = 20;
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            alpha: Self::DEFAULT_ALPHA,
            max_missing_frames: Self::DEFAULT_MAX_MISSING_FRAMES,
        }
    }
}

/// Center line synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CenterConfig {
    /// Horizontal offset in working-resolution pixels applied to the
    /// only tracked side to synthesize a center line.
    pub single_side_offset_px: f64,
}

impl CenterConfig {
    /// Default offset: half of a typical lane width at the bottom of a
    /// 1280x720, 90° FOV frame.
    pub const DEFAULT_SINGLE_SIDE_OFFSET_PX: f64 = 350.0;
}

impl Default for CenterConfig {
    fn default() -> Self {
        Self {
            single_side_offset_px: Self::DEFAULT_SINGLE_SIDE_OFFSET_PX,
        }
    }
}

/// A point given as fractions of the working resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    /// Fraction of the width, `0.0` at the left edge.
    pub x: f64,
    /// Fraction of the height, `0.0` at the top edge.
    pub y: f64,
}

impl NormalizedPoint {
    /// Create a normalized point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale to pixel coordinates.
    #[must_use]
    pub fn to_pixels(self, dimensions: Dimensions) -> Point {
        Point::new(
            self.x * f64::from(dimensions.width),
            self.y * f64::from(dimensions.height),
        )
    }
}

/// Bird's-eye-view projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BevConfig {
    /// Whether segments are fitted in BEV space.
    pub enabled: bool,
    /// BEV rectangle width in pixels.
    pub width: u32,
    /// BEV rectangle height in pixels.
    pub height: u32,
    /// Source trapezoid: bottom-left, bottom-right, right-horizon, left-horizon.
    pub source: [NormalizedPoint; 4],
}

impl BevConfig {
    /// Default BEV width.
    pub const DEFAULT_WIDTH: u32 = 400;
    /// Default BEV height.
    pub const DEFAULT_HEIGHT: u32 = 600;
    /// Default source trapezoid.
    pub const DEFAULT_SOURCE: [NormalizedPoint; 4] = [
        NormalizedPoint::new(0.15, 0.95),
        NormalizedPoint::new(0.85, 0.95),
        NormalizedPoint::new(0.58, 0.62),
        NormalizedPoint::new(0.42, 0.62),
    ];

    /// BEV rectangle as [`Dimensions`].
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }
}

impl Default for BevConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            source: Self::DEFAULT_SOURCE,
        }
    }
}

/// Periodic validation against ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Directory that receives the validation log.
    pub output_dir: PathBuf,
    /// Largest mean pixel error that still passes.
    pub pixel_threshold: f64,
    /// Number of capture ticks before the engine stops.
    pub num_captures: u32,
    /// Seconds between capture ticks.
    pub interval_seconds: f64,
    /// Seconds of simulation time to wait before the first capture.
    pub start_after_seconds: f64,
    /// Number of evenly spaced rows (within the region of interest) at
    /// which tracked and reference lines are compared.
    pub scan_lines: u32,
}

impl ValidationConfig {
    /// Default pass threshold in pixels.
    pub const DEFAULT_PIXEL_THRESHOLD: f64 = 30.0;
    /// Default capture count.
    pub const DEFAULT_NUM_CAPTURES: u32 = 20;
    /// Default capture interval.
    pub const DEFAULT_INTERVAL_SECONDS: f64 = 10.0;
    /// Default warm-up.
    pub const DEFAULT_START_AFTER_SECONDS: f64 = 5.0;
    /// Default number of evaluation rows.
    pub const DEFAULT_SCAN_LINES: u32 = 10;
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("validation"),
            pixel_threshold: Self::DEFAULT_PIXEL_THRESHOLD,
            num_captures: Self::DEFAULT_NUM_CAPTURES,
            interval_seconds: Self::DEFAULT_INTERVAL_SECONDS,
            start_after_seconds: Self::DEFAULT_START_AFTER_SECONDS,
            scan_lines: Self::DEFAULT_SCAN_LINES,
        }
    }
}

/// Which overlay polylines are produced for the display collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DisplayConfig {
    /// Draw the left boundary.
    pub show_left: bool,
    /// Draw the right boundary.
    pub show_right: bool,
    /// Draw the center line.
    pub show_center: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_left: true,
            show_right: true,
            show_center: true,
        }
    }
}

/// The full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Working resolution.
    pub image: ImageConfig,
    /// Pre-edge blur.
    pub blur: BlurConfig,
    /// Canny thresholds.
    pub edges: EdgeConfig,
    /// Hough segment detection and region of interest.
    pub segments: SegmentConfig,
    /// Segment classification.
    pub fit: FitConfig,
    /// Temporal smoothing.
    pub tracking: TrackingConfig,
    /// Center line synthesis.
    pub center: CenterConfig,
    /// Bird's-eye-view projection.
    pub bev: BevConfig,
    /// Ground-truth validation.
    pub validation: ValidationConfig,
    /// Overlay output.
    pub display: DisplayConfig,
}

/// A configuration value that failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A pixel dimension was zero.
    #[error("{name} must be positive, got {width}x{height}")]
    EmptyDimensions {
        /// Which dimensions.
        name: &'static str,
        /// Configured width.
        width: u32,
        /// Configured height.
        height: u32,
    },

    /// The blur kernel size was zero or even.
    #[error("blur kernel size must be odd and positive, got {0}")]
    KernelSize(u32),

    /// A value that must be strictly positive (and finite) was not.
    #[error("{name} must be positive and finite, got {value}")]
    NotPositive {
        /// Parameter name.
        name: &'static str,
        /// Configured value.
        value: f64,
    },

    /// A value that must be zero or more (and finite) was not.
    #[error("{name} must be non-negative and finite, got {value}")]
    Negative {
        /// Parameter name.
        name: &'static str,
        /// Configured value.
        value: f64,
    },

    /// A value fell outside its allowed range.
    #[error("{name} must be within ({min}, {max}], got {value}")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Exclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
        /// Configured value.
        value: f64,
    },

    /// Canny thresholds were out of order.
    #[error("edge high threshold ({high}) must exceed low threshold ({low})")]
    ThresholdOrder {
        /// Configured low threshold.
        low: f32,
        /// Configured high threshold.
        high: f32,
    },

    /// A fraction fell outside its allowed range.
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange {
        /// Parameter name.
        name: &'static str,
        /// Configured value.
        value: f64,
    },

    /// A BEV source corner lies outside the frame or the corners do not
    /// form a bottom/top trapezoid.
    #[error("malformed BEV source points: {0}")]
    BevSource(String),
}

impl LaneConfig {
    /// Check every invariant and freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        check_dimensions("image size", self.image.width, self.image.height)?;

        if self.blur.kernel_size == 0 || self.blur.kernel_size % 2 == 0 {
            return Err(ConfigError::KernelSize(self.blur.kernel_size));
        }
        check_positive("blur sigma", f64::from(self.blur.sigma))?;

        check_non_negative("edge low threshold", f64::from(self.edges.low_threshold))?;
        if self.edges.high_threshold.is_nan() || self.edges.high_threshold <= self.edges.low_threshold {
            return Err(ConfigError::ThresholdOrder {
                low: self.edges.low_threshold,
                high: self.edges.high_threshold,
            });
        }

        check_positive("segment rho step", self.segments.rho_step)?;
        let theta = self.segments.theta_step_degrees;
        if theta.is_nan() || theta <= 0.0 || theta > 90.0 {
            return Err(ConfigError::OutOfRange {
                name: "segment theta step (degrees)",
                min: 0.0,
                max: 90.0,
                value: theta,
            });
        }
        check_positive("segment vote threshold", f64::from(self.segments.vote_threshold))?;
        check_positive("segment min length", self.segments.min_length)?;
        check_non_negative("segment max gap", self.segments.max_gap)?;
        check_unit("region-of-interest y_min", self.segments.roi_y_min)?;
        if self.segments.roi_y_min >= 1.0 {
            return Err(ConfigError::OutOfUnitRange {
                name: "region-of-interest y_min (must leave rows to search)",
                value: self.segments.roi_y_min,
            });
        }

        check_non_negative("fit min abs slope", self.fit.min_abs_slope)?;

        check_unit("tracking alpha", self.tracking.alpha)?;

        check_non_negative("center single-side offset", self.center.single_side_offset_px)?;

        check_dimensions("BEV size", self.bev.width, self.bev.height)?;
        check_bev_source(&self.bev.source)?;

        check_non_negative("validation pixel threshold", self.validation.pixel_threshold)?;
        check_positive("validation interval", self.validation.interval_seconds)?;
        check_non_negative("validation warm-up", self.validation.start_after_seconds)?;
        check_positive("validation scan lines", f64::from(self.validation.scan_lines))?;

        Ok(ValidatedConfig(self))
    }
}

fn check_dimensions(name: &'static str, width: u32, height: u32) -> Result<(), ConfigError> {
    if width == 0 || height == 0 {
        return Err(ConfigError::EmptyDimensions {
            name,
            width,
            height,
        });
    }
    Ok(())
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

fn check_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

/// Corners must lie inside the frame, with the two bottom corners
/// below the two horizon corners and each pair ordered left to right.
fn check_bev_source(source: &[NormalizedPoint; 4]) -> Result<(), ConfigError> {
    for (i, p) in source.iter().enumerate() {
        if !(0.0..=1.0).contains(&p.x) || !(0.0..=1.0).contains(&p.y) {
            return Err(ConfigError::BevSource(format!(
                "corner {i} ({}, {}) lies outside the frame",
                p.x, p.y
            )));
        }
    }
    let [bottom_left, bottom_right, right_horizon, left_horizon] = *source;
    if bottom_left.x >= bottom_right.x || left_horizon.x >= right_horizon.x {
        return Err(ConfigError::BevSource(
            "left corners must lie left of right corners".to_string(),
        ));
    }
    if bottom_left.y <= left_horizon.y || bottom_right.y <= right_horizon.y {
        return Err(ConfigError::BevSource(
            "bottom corners must lie below horizon corners".to_string(),
        ));
    }
    Ok(())
}

/// A [`LaneConfig`] that passed [`LaneConfig::validate`].
///
/// Dereferences to the inner config for read access; there is no way
/// to mutate it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedConfig(LaneConfig);

impl ValidatedConfig {
    /// The validated configuration.
    #[must_use]
    pub const fn get(&self) -> &LaneConfig {
        &self.0
    }

    /// Consume and return the inner configuration.
    #[must_use]
    pub fn into_inner(self) -> LaneConfig {
        self.0
    }
}

impl std::ops::Deref for ValidatedConfig {
    type Target = LaneConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
