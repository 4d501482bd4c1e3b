//! lanesight-pipeline: Lane detection, tracking and validation core (sans-IO).
//!
//! Turns camera frames into tracked lane boundaries through:
//! resize -> grayscale -> blur -> Canny -> region of interest ->
//! Hough segments -> per-side fit (optionally in bird's-eye view) ->
//! temporal smoothing -> center line.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! rasters and returns structured data. Frame sources, ground truth
//! files and log files live in `lanesight-io`.

pub mod bev;
pub mod center;
pub mod config;
pub mod diagnostics;
pub mod edges;
pub mod fit;
pub mod hough;
pub mod pipeline;
pub mod preprocess;
pub mod roi;
pub mod shared;
pub mod tracker;
pub mod types;
pub mod validation;

pub use bev::{BevProjection, Homography, HomographyError, Projector, ProjectorKind};
pub use center::{Overlay, OverlayRole};
pub use config::{ConfigError, LaneConfig, ValidatedConfig};
pub use diagnostics::FrameDiagnostics;
pub use fit::FittedLanes;
pub use pipeline::{FrameOutput, LanePipeline, StagedFrame};
pub use shared::SharedLaneState;
pub use tracker::LaneTracker;
pub use types::{
    CenterLine, CenterSource, Dimensions, Frame, GrayImage, LaneLine, LaneSide, LaneState,
    LineSegment, PipelineError, Point, Polyline, RgbaImage,
};
pub use validation::{
    GroundTruthSample, GroundTruthSource, ReferenceLine, TickOutcome, ValidationEngine,
    ValidationRecord, ValidationSink, ValidationSummary,
};

/// Detect lanes in a single still image.
///
/// Runs every stage once with a fresh tracker, so the result is the raw
/// per-image fit with its center line; there is no smoothing.
///
/// # Pipeline steps
///
/// 1. Resize to working resolution, grayscale, Gaussian blur
/// 2. Canny edge detection
/// 3. Region-of-interest mask and Hough segment detection
/// 4. Per-side line fit (bird's-eye view when enabled)
/// 5. Center line
///
/// # Errors
///
/// Returns [`PipelineError::EmptyFrame`] if `image` has zero width or height.
pub fn detect_lanes(image: &RgbaImage, config: &ValidatedConfig) -> Result<LaneState, PipelineError> {
    let dimensions = Dimensions::new(image.width(), image.height());
    if dimensions.width == 0 || dimensions.height == 0 {
        return Err(PipelineError::EmptyFrame {
            frame_id: 0,
            dimensions,
        });
    }
    let working = config.image.dimensions();

    // 1. Resize, grayscale, blur.
    let pre = preprocess::preprocess(image, working, &config.blur);

    // 2. Canny edge detection.
    let edges = edges::extract_edges(
        &pre.blurred,
        config.edges.low_threshold,
        config.edges.high_threshold,
    );

    // 3. Region of interest and Hough.
    let first_row = roi::first_row(working.height, config.segments.roi_y_min);
    let masked = roi::mask_edges(&edges, config.segments.roi_y_min);
    let segments = hough::detect_segments(
        &masked,
        first_row,
        &hough::HoughParams::from_config(&config.segments),
    );

    // 4. Per-side fit.
    let projector = ProjectorKind::from_config(&config.bev, working);
    let fitted = fit::fit_lanes(&segments, working, &projector, &config.fit);

    // 5. Center line.
    Ok(center::with_center(
        LaneState {
            left: fitted.left,
            right: fitted.right,
            ..LaneState::default()
        },
        config.center.single_side_offset_px,
    ))
}
