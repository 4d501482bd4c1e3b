//! Per-frame diagnostics: timing and counts for each stage.
//!
//! Every call to [`LanePipeline::process_staged`](crate::LanePipeline::process_staged)
//! collects these alongside the lane state, for threshold tuning and for
//! spotting which stage eats the frame budget.
//!
//! Timestamps are taken with `web-time`; durations are serialized as
//! fractional seconds since `std::time::Duration` has no serde impls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration must be finite and non-negative"))
    }
}

/// Diagnostics for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDiagnostics {
    /// Frame the numbers belong to.
    pub frame_id: u64,
    /// Resize, grayscale, blur.
    pub preprocess: StageDiagnostics,
    /// Canny.
    pub edge_detection: StageDiagnostics,
    /// Region-of-interest mask and Hough.
    pub segment_detection: StageDiagnostics,
    /// Classification, projection, per-side fit.
    pub fitting: StageDiagnostics,
    /// Temporal smoothing and center line.
    pub tracking: StageDiagnostics,
    /// Wall-clock duration of the whole frame.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of the stage.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific counts.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Resize and blur.
    Preprocess {
        /// Width of the incoming frame.
        source_width: u32,
        /// Height of the incoming frame.
        source_height: u32,
        /// Working width.
        width: u32,
        /// Working height.
        height: u32,
        /// Whether a resize happened.
        resized: bool,
        /// Blur kernel size.
        kernel_size: u32,
        /// Blur sigma.
        sigma: f32,
    },
    /// Canny.
    EdgeDetection {
        /// Low threshold as configured.
        low_threshold: f32,
        /// High threshold as configured.
        high_threshold: f32,
        /// Edge pixels in the whole frame.
        edge_pixel_count: usize,
        /// Pixels in the frame.
        total_pixel_count: u64,
    },
    /// Hough inside the region of interest.
    SegmentDetection {
        /// First searched row.
        roi_first_row: u32,
        /// Edge pixels inside the region of interest.
        roi_edge_pixel_count: usize,
        /// Segments found.
        segment_count: usize,
    },
    /// Per-side fit.
    Fitting {
        /// Fitting space (`identity` or `bev`).
        projector: String,
        /// Segments supporting the left fit, if any.
        left_support: Option<u32>,
        /// Segments supporting the right fit, if any.
        right_support: Option<u32>,
    },
    /// Tracker output.
    Tracking {
        /// Left side is tracked.
        left_tracked: bool,
        /// Right side is tracked.
        right_tracked: bool,
        /// Left missing counter.
        left_missing: u32,
        /// Right missing counter.
        right_missing: u32,
        /// A center line exists.
        has_center: bool,
    },
}

impl FrameDiagnostics {
    /// Format as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Frame {} Diagnostics\n{}", self.frame_id, "=".repeat(60)));
        lines.push(format!("Total duration: {:.3}ms", duration_ms(self.total_duration)));
        lines.push(String::new());
        lines.push(format!(
            "{:<20} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Preprocess", &self.preprocess),
            ("Edge Detection", &self.edge_detection),
            ("Segment Detection", &self.segment_detection),
            ("Fitting", &self.fitting),
            ("Tracking", &self.tracking),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<20} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_side(support: Option<u32>) -> String {
    support.map_or_else(|| "-".to_string(), |n| format!("{n} seg"))
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Preprocess {
            source_width,
            source_height,
            width,
            height,
            resized,
            kernel_size,
            sigma,
        } => {
            let size = if *resized {
                format!("{source_width}x{source_height} -> {width}x{height}")
            } else {
                format!("{width}x{height}")
            };
            format!("{size} blur k={kernel_size} sigma={sigma:.2}")
        }
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixel_count > 0 {
                *edge_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixel_count} ({density:.1}%)"
            )
        }
        StageMetrics::SegmentDetection {
            roi_first_row,
            roi_edge_pixel_count,
            segment_count,
        } => format!("rows>={roi_first_row} edges={roi_edge_pixel_count} segments={segment_count}"),
        StageMetrics::Fitting {
            projector,
            left_support,
            right_support,
        } => format!(
            "{projector} left={} right={}",
            format_side(*left_support),
            format_side(*right_support)
        ),
        StageMetrics::Tracking {
            left_tracked,
            right_tracked,
            left_missing,
            right_missing,
            has_center,
        } => format!(
            "left={} ({left_missing} missed) right={} ({right_missing} missed) center={}",
            yes_no(*left_tracked),
            yes_no(*right_tracked),
            yes_no(*has_center),
        ),
    }
}

const fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}
