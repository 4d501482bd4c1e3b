//! Shared types for the lanesight pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can construct frames
/// without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// A sequence of connected points, used for overlay geometry and
/// polyline ground-truth references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Horizontal position of the polyline at row `y`, by linear
    /// interpolation between the two vertices that bracket `y`.
    ///
    /// Returns `None` when `y` lies outside the polyline's vertical
    /// extent or the bracketing edge is horizontal.
    #[must_use]
    pub fn x_at(&self, y: f64) -> Option<f64> {
        self.0.windows(2).find_map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            let (lo, hi) = if a.y <= b.y { (a.y, b.y) } else { (b.y, a.y) };
            if y < lo || y > hi {
                return None;
            }
            let dy = b.y - a.y;
            if dy.abs() < f64::EPSILON {
                return None;
            }
            let t = (y - a.y) / dy;
            Some((b.x - a.x).mul_add(t, a.x))
        })
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single camera frame delivered by the simulator.
///
/// Frames are owned by the pipeline call that processes them and
/// dropped once the last stage has consumed them.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixels at the camera's native resolution.
    pub image: RgbaImage,
    /// Monotonically increasing frame id.
    pub frame_id: u64,
    /// Capture time in seconds (simulation clock).
    pub timestamp: f64,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub const fn new(image: RgbaImage, frame_id: u64, timestamp: f64) -> Self {
        Self {
            image,
            frame_id,
            timestamp,
        }
    }

    /// Native dimensions of the frame.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }
}

/// A straight line segment produced by the segment detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    /// First endpoint.
    pub start: Point,
    /// Second endpoint.
    pub end: Point,
}

impl LineSegment {
    /// Create a segment from its two endpoints.
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Image-space slope `dy/dx`, or `None` for a vertical segment.
    ///
    /// Image rows grow downward, so a left lane boundary rising toward
    /// the horizon has a negative slope.
    #[must_use]
    pub fn slope(&self) -> Option<f64> {
        let dx = self.end.x - self.start.x;
        if dx.abs() < f64::EPSILON {
            return None;
        }
        Some((self.end.y - self.start.y) / dx)
    }

    /// Euclidean length in pixels.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Midpoint of the segment.
    #[must_use]
    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
        )
    }
}

/// Which lane boundary a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneSide {
    /// Boundary to the left of the ego vehicle.
    Left,
    /// Boundary to the right of the ego vehicle.
    Right,
}

impl fmt::Display for LaneSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// A straight lane line in image space.
///
/// Lane boundaries are never horizontal, so the line is parameterized
/// by row: `x = slope * y + intercept`. `slope` is therefore `dx/dy`,
/// which has the same sign as the image-space `dy/dx` of the boundary
/// and is zero for a vertical line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaneLine {
    /// Which boundary this line describes.
    pub side: LaneSide,
    /// Horizontal change per row (`dx/dy`).
    pub slope: f64,
    /// Column where the line crosses row 0.
    pub intercept: f64,
    /// Number of detected segments supporting the line.
    pub support: u32,
}

impl LaneLine {
    /// Create a lane line from its row-form parameters.
    #[must_use]
    pub const fn new(side: LaneSide, slope: f64, intercept: f64, support: u32) -> Self {
        Self {
            side,
            slope,
            intercept,
            support,
        }
    }

    /// Build the line through two points, or `None` if they share a row.
    #[must_use]
    pub fn through(side: LaneSide, a: Point, b: Point, support: u32) -> Option<Self> {
        let dy = b.y - a.y;
        if dy.abs() < f64::EPSILON {
            return None;
        }
        let slope = (b.x - a.x) / dy;
        let intercept = slope.mul_add(-a.y, a.x);
        Some(Self::new(side, slope, intercept, support))
    }

    /// Column of the line at row `y`.
    #[must_use]
    pub fn x_at(&self, y: f64) -> f64 {
        self.slope.mul_add(y, self.intercept)
    }
}

/// How a center line was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterSource {
    /// Midline between tracked left and right boundaries.
    Midline,
    /// Fixed lateral offset from the only tracked boundary.
    Offset(LaneSide),
}

/// The lane center line, in the same row form as [`LaneLine`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterLine {
    /// Horizontal change per row (`dx/dy`).
    pub slope: f64,
    /// Column where the line crosses row 0.
    pub intercept: f64,
    /// Which boundaries the line was derived from.
    pub source: CenterSource,
}

impl CenterLine {
    /// Column of the line at row `y`.
    #[must_use]
    pub fn x_at(&self, y: f64) -> f64 {
        self.slope.mul_add(y, self.intercept)
    }
}

/// The tracked lane state carried from frame to frame.
///
/// Absent sides are `None`; `center` is present exactly when at least
/// one side is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneState {
    /// Id of the last frame folded into this state.
    pub frame_id: u64,
    /// Capture time of that frame in seconds.
    pub timestamp: f64,
    /// Smoothed left boundary, if tracked.
    pub left: Option<LaneLine>,
    /// Smoothed right boundary, if tracked.
    pub right: Option<LaneLine>,
    /// Derived center line.
    pub center: Option<CenterLine>,
    /// Consecutive frames without a fresh left detection.
    pub left_missing: u32,
    /// Consecutive frames without a fresh right detection.
    pub right_missing: u32,
}

impl LaneState {
    /// The tracked line for `side`, if any.
    #[must_use]
    pub const fn line(&self, side: LaneSide) -> Option<&LaneLine> {
        match side {
            LaneSide::Left => self.left.as_ref(),
            LaneSide::Right => self.right.as_ref(),
        }
    }

    /// The missing-frame counter for `side`.
    #[must_use]
    pub const fn missing(&self, side: LaneSide) -> u32 {
        match side {
            LaneSide::Left => self.left_missing,
            LaneSide::Right => self.right_missing,
        }
    }

    /// Whether any lane boundary is currently tracked.
    #[must_use]
    pub const fn has_lane(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }
}

/// Errors surfaced by the pipeline.
///
/// Per-frame detection gaps are never errors; they show up as absent
/// lines in [`LaneState`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A frame with zero width or height was submitted.
    #[error("frame {frame_id} has empty dimensions {dimensions}")]
    EmptyFrame {
        /// Id of the offending frame.
        frame_id: u64,
        /// Its dimensions.
        dimensions: Dimensions,
    },

    /// An edge map handed straight to the detector is not at working
    /// resolution.
    #[error("edge map is {actual}, expected {expected}")]
    DimensionMismatch {
        /// Working resolution.
        expected: Dimensions,
        /// Size of the submitted map.
        actual: Dimensions,
    },

    /// The validation log sink rejected a write or flush.
    #[error("validation sink failed: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn polyline_x_at_interpolates() {
        let pl = Polyline::new(vec![Point::new(100.0, 700.0), Point::new(300.0, 500.0)]);
        let x = pl.x_at(600.0).unwrap();
        assert!((x - 200.0).abs() < 1e-9, "got {x}");
    }

    #[test]
    fn polyline_x_at_outside_extent_is_none() {
        let pl = Polyline::new(vec![Point::new(100.0, 700.0), Point::new(300.0, 500.0)]);
        assert!(pl.x_at(400.0).is_none());
        assert!(pl.x_at(701.0).is_none());
        assert!(Polyline::new(vec![]).x_at(0.0).is_none());
    }

    #[test]
    fn segment_slope_sign_matches_image_convention() {
        let left = LineSegment::new(Point::new(100.0, 600.0), Point::new(300.0, 400.0));
        let right = LineSegment::new(Point::new(1100.0, 600.0), Point::new(900.0, 400.0));
        assert!((left.slope().unwrap() + 1.0).abs() < 1e-12);
        assert!((right.slope().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn vertical_segment_has_no_slope() {
        let seg = LineSegment::new(Point::new(5.0, 0.0), Point::new(5.0, 10.0));
        assert!(seg.slope().is_none());
        assert!((seg.length() - 10.0).abs() < f64::EPSILON);
        assert_eq!(seg.midpoint(), Point::new(5.0, 5.0));
    }

    #[test]
    fn lane_line_through_points() {
        let line =
            LaneLine::through(LaneSide::Left, Point::new(100.0, 600.0), Point::new(300.0, 400.0), 1)
                .unwrap();
        assert!((line.slope + 1.0).abs() < 1e-12);
        assert!((line.intercept - 700.0).abs() < 1e-9);
        assert!((line.x_at(500.0) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn lane_line_through_same_row_is_none() {
        let line =
            LaneLine::through(LaneSide::Right, Point::new(0.0, 10.0), Point::new(5.0, 10.0), 1);
        assert!(line.is_none());
    }

    #[test]
    fn lane_state_accessors() {
        let state = LaneState {
            right: Some(LaneLine::new(LaneSide::Right, 1.0, 0.0, 3)),
            left_missing: 4,
            ..LaneState::default()
        };
        assert!(state.line(LaneSide::Left).is_none());
        assert_eq!(state.line(LaneSide::Right).map(|l| l.support), Some(3));
        assert_eq!(state.missing(LaneSide::Left), 4);
        assert!(state.has_lane());
        assert!(!LaneState::default().has_lane());
    }

    #[test]
    fn lane_state_serde_round_trip() {
        let state = LaneState {
            frame_id: 7,
            timestamp: 0.35,
            left: Some(LaneLine::new(LaneSide::Left, -1.0, 700.0, 2)),
            right: None,
            center: Some(CenterLine {
                slope: -1.0,
                intercept: 1050.0,
                source: CenterSource::Offset(LaneSide::Left),
            }),
            left_missing: 0,
            right_missing: 3,
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: LaneState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn error_display() {
        let err = PipelineError::EmptyFrame {
            frame_id: 3,
            dimensions: Dimensions::new(0, 720),
        };
        assert_eq!(err.to_string(), "frame 3 has empty dimensions 0x720");
    }
}
