//! Temporal lane tracking.
//!
//! [`LaneTracker`] is the only stage with memory. It is a plain owned
//! value: the pipeline holds it and passes `&mut` into every frame, so
//! independent pipelines never share tracking state.
//!
//! Per side, on every frame:
//!
//! - fresh detection: `smoothed = α·previous + (1 − α)·fresh` on slope and
//!   intercept (the first detection is taken as-is), missing counter := 0;
//! - no detection while tracked: missing counter += 1, the last smoothed
//!   line is held while the counter ≤ `max_missing_frames`, and the side
//!   is dropped (counter reset) as soon as it exceeds it;
//! - no detection while absent: nothing changes.

use crate::config::TrackingConfig;
use crate::fit::FittedLanes;
use crate::types::{LaneLine, LaneSide, LaneState};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SideTrack {
    line: Option<LaneLine>,
    missing: u32,
}

impl SideTrack {
    fn update(&mut self, fresh: Option<LaneLine>, alpha: f64, max_missing: u32) {
        match (fresh, self.line) {
            (Some(fresh), Some(previous)) => {
                let blend = |p: f64, f: f64| alpha.mul_add(p, (1.0 - alpha) * f);
                self.line = Some(LaneLine::new(
                    fresh.side,
                    blend(previous.slope, fresh.slope),
                    blend(previous.intercept, fresh.intercept),
                    fresh.support,
                ));
                self.missing = 0;
            }
            (Some(fresh), None) => {
                self.line = Some(fresh);
                self.missing = 0;
            }
            (None, Some(_)) => {
                self.missing += 1;
                if self.missing > max_missing {
                    self.line = None;
                    self.missing = 0;
                }
            }
            (None, None) => {}
        }
    }
}

/// Exponential smoothing with a bounded missing-frame budget.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneTracker {
    alpha: f64,
    max_missing: u32,
    left: SideTrack,
    right: SideTrack,
}

impl LaneTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            alpha: config.alpha,
            max_missing: config.max_missing_frames,
            left: SideTrack::default(),
            right: SideTrack::default(),
        }
    }

    /// Fold one frame's fitter output into the tracked state.
    ///
    /// The returned state has no center line; that is derived afterwards
    /// by [`crate::center::center_line`].
    pub fn update(&mut self, fitted: &FittedLanes, frame_id: u64, timestamp: f64) -> LaneState {
        self.left.update(fitted.left, self.alpha, self.max_missing);
        self.right.update(fitted.right, self.alpha, self.max_missing);
        LaneState {
            frame_id,
            timestamp,
            left: self.left.line,
            right: self.right.line,
            center: None,
            left_missing: self.left.missing,
            right_missing: self.right.missing,
        }
    }

    /// Currently tracked line for `side`.
    #[must_use]
    pub const fn line(&self, side: LaneSide) -> Option<LaneLine> {
        match side {
            LaneSide::Left => self.left.line,
            LaneSide::Right => self.right.line,
        }
    }

    /// Current missing counter for `side`.
    #[must_use]
    pub const fn missing(&self, side: LaneSide) -> u32 {
        match side {
            LaneSide::Left => self.left.missing,
            LaneSide::Right => self.right.missing,
        }
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.left = SideTrack::default();
        self.right = SideTrack::default();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tracker(alpha: f64, max_missing: u32) -> LaneTracker {
        LaneTracker::new(&TrackingConfig {
            alpha,
            max_missing_frames: max_missing,
        })
    }

    fn left(slope: f64, intercept: f64) -> FittedLanes {
        FittedLanes {
            left: Some(LaneLine::new(LaneSide::Left, slope, intercept, 1)),
            right: None,
        }
    }

    fn right(slope: f64, intercept: f64) -> FittedLanes {
        FittedLanes {
            left: None,
            right: Some(LaneLine::new(LaneSide::Right, slope, intercept, 1)),
        }
    }

    #[test]
    fn first_detection_is_taken_directly() {
        let mut t = tracker(0.8, 20);
        let state = t.update(&left(-1.0, 700.0), 1, 0.05);
        let line = state.left.unwrap();
        assert!((line.slope + 1.0).abs() < f64::EPSILON);
        assert!((line.intercept - 700.0).abs() < f64::EPSILON);
        assert_eq!(state.frame_id, 1);
        assert!(state.right.is_none());
    }

    #[test]
    fn second_detection_is_blended() {
        let mut t = tracker(0.8, 20);
        t.update(&left(-1.0, 700.0), 1, 0.0);
        let state = t.update(&left(-2.0, 800.0), 2, 0.0);
        let line = state.left.unwrap();
        assert!((line.slope - -1.2).abs() < 1e-12, "slope {}", line.slope);
        assert!((line.intercept - 720.0).abs() < 1e-9);
    }

    #[test]
    fn alpha_one_freezes_first_detection() {
        let mut t = tracker(1.0, 20);
        t.update(&left(-1.0, 700.0), 1, 0.0);
        let state = t.update(&left(-3.0, 900.0), 2, 0.0);
        assert!((state.left.unwrap().intercept - 700.0).abs() < f64::EPSILON);
    }

    #[test]
    fn constant_detections_converge_for_every_alpha() {
        for alpha in [0.0, 0.2, 0.5, 0.8, 0.95] {
            let mut t = tracker(alpha, 20);
            t.update(&left(-0.5, 400.0), 0, 0.0);
            let mut state = LaneState::default();
            for frame in 1..=400 {
                state = t.update(&left(-1.0, 700.0), frame, 0.0);
            }
            let line = state.left.unwrap();
            assert!((line.slope + 1.0).abs() < 1e-6, "alpha {alpha}: slope {}", line.slope);
            assert!((line.intercept - 700.0).abs() < 1e-6, "alpha {alpha}");
        }
    }

    #[test]
    fn held_line_is_unchanged_while_missing() {
        let mut t = tracker(0.8, 3);
        let first = t.update(&left(-1.0, 700.0), 1, 0.0).left;
        for frame in 2..=4 {
            let state = t.update(&FittedLanes::default(), frame, 0.0);
            assert_eq!(state.left, first, "frame {frame}");
            assert_eq!(state.left_missing, u32::try_from(frame - 1).unwrap());
        }
        let dropped = t.update(&FittedLanes::default(), 5, 0.0);
        assert!(dropped.left.is_none());
        assert_eq!(dropped.left_missing, 0);
    }

    #[test]
    fn right_side_absent_exactly_at_frame_26() {
        let mut t = tracker(0.8, 20);
        for frame in 1..=30_u64 {
            let fitted = if frame <= 5 {
                right(1.0, 500.0)
            } else {
                FittedLanes::default()
            };
            let state = t.update(&fitted, frame, 0.0);
            if frame <= 25 {
                assert!(state.right.is_some(), "right dropped early at frame {frame}");
            } else {
                assert!(state.right.is_none(), "right still held at frame {frame}");
            }
        }
    }

    #[test]
    fn redetection_resets_counter() {
        let mut t = tracker(0.5, 2);
        t.update(&right(1.0, 500.0), 1, 0.0);
        t.update(&FittedLanes::default(), 2, 0.0);
        t.update(&FittedLanes::default(), 3, 0.0);
        let state = t.update(&right(1.0, 500.0), 4, 0.0);
        assert_eq!(state.right_missing, 0);
        t.update(&FittedLanes::default(), 5, 0.0);
        t.update(&FittedLanes::default(), 6, 0.0);
        assert!(t.line(LaneSide::Right).is_some());
        t.update(&FittedLanes::default(), 7, 0.0);
        assert!(t.line(LaneSide::Right).is_none());
    }

    #[test]
    fn absent_side_stays_absent_with_zero_counter() {
        let mut t = tracker(0.8, 1);
        for frame in 0..10 {
            let state = t.update(&FittedLanes::default(), frame, 0.0);
            assert!(!state.has_lane());
            assert_eq!(state.left_missing, 0);
            assert_eq!(state.right_missing, 0);
        }
    }

    #[test]
    fn sides_are_independent() {
        let mut t = tracker(0.8, 0);
        t.update(
            &FittedLanes {
                left: Some(LaneLine::new(LaneSide::Left, -1.0, 700.0, 1)),
                right: Some(LaneLine::new(LaneSide::Right, 1.0, 500.0, 1)),
            },
            1,
            0.0,
        );
        let state = t.update(&left(-1.0, 700.0), 2, 0.0);
        assert!(state.left.is_some());
        assert!(state.right.is_none());
    }

    #[test]
    fn reset_clears_tracks() {
        let mut t = tracker(0.8, 20);
        t.update(&left(-1.0, 700.0), 1, 0.0);
        t.reset();
        assert!(t.line(LaneSide::Left).is_none());
        assert_eq!(t.missing(LaneSide::Left), 0);
    }
}
