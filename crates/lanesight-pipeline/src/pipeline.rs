//! The per-frame lane pipeline.
//!
//! [`LanePipeline`] owns everything that lives longer than one frame:
//! the validated configuration, the projector chosen at startup, and the
//! [`LaneTracker`]. Frames go through it one at a time via `&mut self`,
//! so at most one frame is ever in flight and the tracker has exactly
//! one mutator.
//!
//! ```text
//! Frame -> preprocess -> edges -> ROI mask -> Hough -> fit (projector)
//!       -> tracker -> center line -> overlay
//! ```

use web_time::Instant;

use crate::bev::ProjectorKind;
use crate::center::{Overlay, with_center};
use crate::config::ValidatedConfig;
use crate::diagnostics::{FrameDiagnostics, StageDiagnostics, StageMetrics};
use crate::edges::{edge_pixel_count, extract_edges};
use crate::fit::{FittedLanes, fit_lanes, project_segments};
use crate::hough::{HoughParams, detect_segments};
use crate::shared::SharedLaneState;
use crate::tracker::LaneTracker;
use crate::types::{Dimensions, Frame, GrayImage, LaneState, LineSegment, PipelineError};
use crate::validation::ValidationEngine;

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    /// Tracked state after this frame, center line included.
    pub state: LaneState,
    /// This frame's raw fit, before smoothing.
    pub fitted: FittedLanes,
    /// Segments found in the region of interest.
    pub segments: Vec<LineSegment>,
    /// Renderable geometry for the display collaborator.
    pub overlay: Overlay,
}

/// [`FrameOutput`] plus every intermediate, for debug views and tuning.
#[derive(Debug, Clone)]
pub struct StagedFrame {
    /// The regular output.
    pub output: FrameOutput,
    /// Grayscale at working resolution.
    pub gray: GrayImage,
    /// Blurred grayscale.
    pub blurred: GrayImage,
    /// Full-frame edge map.
    pub edges: GrayImage,
    /// Edge map with rows above the region of interest cleared.
    pub masked_edges: GrayImage,
    /// Segments mapped into the fitting space.
    pub projected_segments: Vec<LineSegment>,
    /// Timings and counts.
    pub diagnostics: FrameDiagnostics,
}

/// Intermediate results from the edge map onward.
struct Detection {
    output: FrameOutput,
    masked_edges: GrayImage,
    projected_segments: Vec<LineSegment>,
    segment_detection: StageDiagnostics,
    fitting: StageDiagnostics,
    tracking: StageDiagnostics,
}

/// Stateful lane detection pipeline.
#[derive(Debug)]
pub struct LanePipeline {
    config: ValidatedConfig,
    projector: ProjectorKind,
    hough: HoughParams,
    first_row: u32,
    tracker: LaneTracker,
    state: LaneState,
    shared: SharedLaneState,
}

impl LanePipeline {
    /// Build a pipeline. A degenerate BEV trapezoid disables BEV for the
    /// run (see [`ProjectorKind::from_config`]).
    #[must_use]
    pub fn new(config: ValidatedConfig) -> Self {
        let working = config.image.dimensions();
        let projector = ProjectorKind::from_config(&config.bev, working);
        if projector.is_bev() {
            tracing::info!(
                "fitting in bird's-eye view ({})",
                config.bev.dimensions()
            );
        }
        let first_row = crate::roi::first_row(working.height, config.segments.roi_y_min);
        Self {
            hough: HoughParams::from_config(&config.segments),
            tracker: LaneTracker::new(&config.tracking),
            projector,
            first_row,
            state: LaneState::default(),
            shared: SharedLaneState::default(),
            config,
        }
    }

    /// The configuration the pipeline was built with.
    #[must_use]
    pub const fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// The fitting-space projector chosen at startup.
    #[must_use]
    pub const fn projector(&self) -> &ProjectorKind {
        &self.projector
    }

    /// Working resolution every frame is resized to.
    #[must_use]
    pub const fn working_dimensions(&self) -> Dimensions {
        self.config.get().image.dimensions()
    }

    /// First row of the region of interest at working resolution.
    #[must_use]
    pub const fn roi_first_row(&self) -> u32 {
        self.first_row
    }

    /// State after the most recent frame.
    #[must_use]
    pub const fn state(&self) -> &LaneState {
        &self.state
    }

    /// Handle that always holds the latest complete state.
    #[must_use]
    pub fn shared_state(&self) -> SharedLaneState {
        self.shared.clone()
    }

    /// A validation engine matching this pipeline's geometry.
    #[must_use]
    pub fn validation_engine(&self) -> ValidationEngine {
        ValidationEngine::new(
            &self.config.validation,
            self.working_dimensions(),
            self.first_row,
        )
    }

    /// Overlay for the current state.
    #[must_use]
    pub fn overlay(&self) -> Overlay {
        overlay_for(&self.state, self.first_row, self.working_dimensions(), &self.config)
    }

    /// Drop all tracked lanes.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.state = LaneState::default();
        self.shared.publish(self.state.clone());
    }

    /// Process one frame.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyFrame`] for a zero-sized frame. Detection
    /// gaps are not errors.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameOutput, PipelineError> {
        self.process_staged(frame).map(|staged| staged.output)
    }

    /// Process one frame and keep every intermediate.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyFrame`] for a zero-sized frame.
    pub fn process_staged(&mut self, frame: &Frame) -> Result<StagedFrame, PipelineError> {
        let source = frame.dimensions();
        if source.width == 0 || source.height == 0 {
            return Err(PipelineError::EmptyFrame {
                frame_id: frame.frame_id,
                dimensions: source,
            });
        }
        let total_start = Instant::now();
        let working = self.working_dimensions();

        let start = Instant::now();
        let pre = crate::preprocess::preprocess(&frame.image, working, &self.config.blur);
        let preprocess = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Preprocess {
                source_width: source.width,
                source_height: source.height,
                width: working.width,
                height: working.height,
                resized: source != working,
                kernel_size: self.config.blur.kernel_size,
                sigma: self.config.blur.sigma,
            },
        };

        let start = Instant::now();
        let edges = extract_edges(
            &pre.blurred,
            self.config.edges.low_threshold,
            self.config.edges.high_threshold,
        );
        let edge_detection = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::EdgeDetection {
                low_threshold: self.config.edges.low_threshold,
                high_threshold: self.config.edges.high_threshold,
                edge_pixel_count: edge_pixel_count(&edges),
                total_pixel_count: working.pixel_count(),
            },
        };

        let detection = self.detect(&edges, frame.frame_id, frame.timestamp);

        Ok(StagedFrame {
            output: detection.output,
            gray: pre.gray,
            blurred: pre.blurred,
            edges,
            masked_edges: detection.masked_edges,
            projected_segments: detection.projected_segments,
            diagnostics: FrameDiagnostics {
                frame_id: frame.frame_id,
                preprocess,
                edge_detection,
                segment_detection: detection.segment_detection,
                fitting: detection.fitting,
                tracking: detection.tracking,
                total_duration: total_start.elapsed(),
            },
        })
    }

    /// Run segment detection, fitting and tracking on a ready-made edge
    /// map at working resolution.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DimensionMismatch`] if `edges` is not at working
    /// resolution.
    pub fn process_edges(
        &mut self,
        edges: &GrayImage,
        frame_id: u64,
        timestamp: f64,
    ) -> Result<FrameOutput, PipelineError> {
        let actual = Dimensions::new(edges.width(), edges.height());
        let expected = self.working_dimensions();
        if actual != expected {
            return Err(PipelineError::DimensionMismatch { expected, actual });
        }
        Ok(self.detect(edges, frame_id, timestamp).output)
    }

    fn detect(&mut self, edges: &GrayImage, frame_id: u64, timestamp: f64) -> Detection {
        let working = self.working_dimensions();

        let start = Instant::now();
        let masked_edges = crate::roi::mask_edges(edges, self.config.segments.roi_y_min);
        let segments = detect_segments(&masked_edges, self.first_row, &self.hough);
        let segment_detection = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::SegmentDetection {
                roi_first_row: self.first_row,
                roi_edge_pixel_count: edge_pixel_count(&masked_edges),
                segment_count: segments.len(),
            },
        };

        let start = Instant::now();
        let fitted = fit_lanes(&segments, working, &self.projector, &self.config.fit);
        let projected_segments = project_segments(&segments, &self.projector);
        let fitting = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Fitting {
                projector: (if self.projector.is_bev() { "bev" } else { "identity" }).to_string(),
                left_support: fitted.left.map(|l| l.support),
                right_support: fitted.right.map(|r| r.support),
            },
        };

        let start = Instant::now();
        let tracked = self.tracker.update(&fitted, frame_id, timestamp);
        let state = with_center(tracked, self.config.center.single_side_offset_px);
        let overlay = overlay_for(&state, self.first_row, working, &self.config);
        let tracking = StageDiagnostics {
            duration: start.elapsed(),
            metrics: StageMetrics::Tracking {
                left_tracked: state.left.is_some(),
                right_tracked: state.right.is_some(),
                left_missing: state.left_missing,
                right_missing: state.right_missing,
                has_center: state.center.is_some(),
            },
        };

        tracing::debug!(
            frame_id,
            segments = segments.len(),
            fitted = fitted.count(),
            left = state.left.is_some(),
            right = state.right.is_some(),
            "frame processed"
        );

        self.state = state.clone();
        self.shared.publish(state.clone());

        Detection {
            output: FrameOutput {
                state,
                fitted,
                segments,
                overlay,
            },
            masked_edges,
            projected_segments,
            segment_detection,
            fitting,
            tracking,
        }
    }
}

fn overlay_for(
    state: &LaneState,
    first_row: u32,
    working: Dimensions,
    config: &ValidatedConfig,
) -> Overlay {
    let bottom = f64::from(working.height.saturating_sub(1));
    let top = f64::from(first_row).min(bottom);
    Overlay::from_state(state, top, bottom, &config.display)
}
