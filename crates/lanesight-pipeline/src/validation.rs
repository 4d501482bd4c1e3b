//! Periodic validation of the tracked lanes against ground truth.
//!
//! The [`ValidationEngine`] runs on its own cadence: the caller polls it
//! with the current time (simulation or wall clock, in seconds) and the
//! latest complete [`LaneState`]. The first capture happens at
//! `start_after_seconds`, then one every `interval_seconds`, until
//! `num_captures` ticks have elapsed. A tick whose ground truth is
//! unavailable is skipped without writing a record but still consumes
//! one capture, so the engine always terminates.
//!
//! Records go to a [`ValidationSink`]; the sink is finalized exactly once,
//! right after the last capture.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;
use crate::types::{Dimensions, LaneState, PipelineError, Polyline};

/// Reference geometry for one lane boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceLine {
    /// Row-form line `x = slope * y + intercept`.
    Line {
        /// `dx/dy`.
        slope: f64,
        /// Column at row 0.
        intercept: f64,
    },
    /// Sampled boundary points, interpolated linearly.
    Polyline(Polyline),
}

impl ReferenceLine {
    /// Column of the reference at row `y`, if defined there.
    #[must_use]
    pub fn x_at(&self, y: f64) -> Option<f64> {
        match self {
            Self::Line { slope, intercept } => Some(slope.mul_add(y, *intercept)),
            Self::Polyline(polyline) => polyline.x_at(y),
        }
    }
}

/// Ground truth for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthSample {
    /// Frame the sample belongs to.
    pub frame_id: u64,
    /// Left boundary reference.
    #[serde(default)]
    pub left: Option<ReferenceLine>,
    /// Right boundary reference.
    #[serde(default)]
    pub right: Option<ReferenceLine>,
}

/// Supplies ground truth on demand. `None` means unavailable.
pub trait GroundTruthSource {
    /// Ground truth for `frame_id`.
    fn sample(&self, frame_id: u64) -> Option<GroundTruthSample>;
}

impl GroundTruthSource for HashMap<u64, GroundTruthSample> {
    fn sample(&self, frame_id: u64) -> Option<GroundTruthSample> {
        self.get(&frame_id).cloned()
    }
}

impl GroundTruthSource for BTreeMap<u64, GroundTruthSample> {
    fn sample(&self, frame_id: u64) -> Option<GroundTruthSample> {
        self.get(&frame_id).cloned()
    }
}

/// One scored capture. Written once, never modified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Frame that was scored.
    pub frame_id: u64,
    /// Capture time of that frame, in seconds.
    pub timestamp: f64,
    /// Mean absolute horizontal error in pixels.
    pub pixel_error: f64,
    /// Threshold the error was compared against.
    pub threshold: f64,
    /// `pixel_error <= threshold`.
    pub passed: bool,
}

/// Append-only destination for [`ValidationRecord`]s.
pub trait ValidationSink {
    /// Error raised by the underlying storage.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one record.
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn append(&mut self, record: &ValidationRecord) -> Result<(), Self::Error>;

    /// Flush everything. Called once after the last capture.
    ///
    /// # Errors
    ///
    /// Storage failures.
    fn finalize(&mut self) -> Result<(), Self::Error>;
}

impl ValidationSink for Vec<ValidationRecord> {
    type Error = std::convert::Infallible;

    fn append(&mut self, record: &ValidationRecord) -> Result<(), Self::Error> {
        self.push(*record);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Rows (inclusive range `top..=bottom`) at which lines are compared.
#[must_use]
pub fn scan_rows(top: f64, bottom: f64, count: u32) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![bottom],
        n => (0..n)
            .map(|i| (bottom - top).mul_add(f64::from(i) / f64::from(n - 1), top))
            .collect(),
    }
}

/// Mean absolute horizontal error between `state` and `truth` over `rows`.
///
/// Every boundary present in `truth` is compared with the tracked
/// boundary of the same side. When both boundaries are present the
/// tracked center is also compared with their midpoint. A reference
/// without a tracked counterpart costs `miss_penalty` per row. Returns
/// `None` when `truth` defines no comparable row at all.
#[must_use]
pub fn pixel_error(state: &LaneState, truth: &GroundTruthSample, rows: &[f64], miss_penalty: f64) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0_u32;
    let mut add = |tracked: Option<f64>, reference: f64| {
        sum += tracked.map_or(miss_penalty, |x| (x - reference).abs());
        n += 1;
    };

    for &y in rows {
        let left_ref = truth.left.as_ref().and_then(|r| r.x_at(y));
        let right_ref = truth.right.as_ref().and_then(|r| r.x_at(y));
        if let Some(reference) = left_ref {
            add(state.left.map(|l| l.x_at(y)), reference);
        }
        if let Some(reference) = right_ref {
            add(state.right.map(|r| r.x_at(y)), reference);
        }
        if let (Some(l), Some(r)) = (left_ref, right_ref) {
            add(state.center.map(|c| c.x_at(y)), (l + r) / 2.0);
        }
    }

    (n > 0).then(|| sum / f64::from(n))
}

/// What a single [`ValidationEngine::poll`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// A record was scored and appended.
    Recorded(ValidationRecord),
    /// Ground truth was unavailable; nothing was written.
    Skipped {
        /// Frame whose ground truth was missing.
        frame_id: u64,
    },
}

/// Totals over a validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Capture ticks that fired (recorded plus skipped).
    pub captures: u32,
    /// Ticks skipped for lack of ground truth.
    pub skipped: u32,
    /// Records within threshold.
    pub passed: u32,
    /// Records over threshold.
    pub failed: u32,
    /// Mean pixel error over written records.
    pub mean_error: Option<f64>,
}

impl ValidationSummary {
    /// Number of records written.
    #[must_use]
    pub const fn recorded(&self) -> u32 {
        self.passed + self.failed
    }
}

/// Timer-driven validation against ground truth.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    threshold: f64,
    start: f64,
    interval: f64,
    num_captures: u32,
    rows: Vec<f64>,
    miss_penalty: f64,
    next_due: f64,
    summary: ValidationSummary,
    error_sum: f64,
    finished: bool,
}

impl ValidationEngine {
    /// Create an engine for frames of size `frame` whose region of
    /// interest starts at row `first_row`.
    #[must_use]
    pub fn new(config: &ValidationConfig, frame: Dimensions, first_row: u32) -> Self {
        let bottom = f64::from(frame.height.saturating_sub(1));
        let top = f64::from(first_row).min(bottom);
        Self {
            threshold: config.pixel_threshold,
            start: config.start_after_seconds,
            interval: config.interval_seconds,
            num_captures: config.num_captures,
            rows: scan_rows(top, bottom, config.scan_lines),
            miss_penalty: f64::from(frame.width),
            next_due: config.start_after_seconds,
            summary: ValidationSummary::default(),
            error_sum: 0.0,
            finished: config.num_captures == 0,
        }
    }

    /// Whether all captures are done and the sink has been finalized.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Time at which the next capture fires, if any remain.
    #[must_use]
    pub const fn next_due(&self) -> Option<f64> {
        if self.finished { None } else { Some(self.next_due) }
    }

    /// Totals so far.
    #[must_use]
    pub fn summary(&self) -> ValidationSummary {
        let mut summary = self.summary;
        let recorded = summary.recorded();
        summary.mean_error = (recorded > 0).then(|| self.error_sum / f64::from(recorded));
        summary
    }

    /// Fire a capture if one is due at time `now`.
    ///
    /// Returns `Ok(None)` when nothing is due, the run is over, or `now`
    /// is not finite. Ticks missed because polling was late are dropped,
    /// not replayed; the next one stays on the `start + k * interval` grid.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Sink`] if appending or finalizing fails.
    pub fn poll<G, S>(
        &mut self,
        now: f64,
        state: &LaneState,
        truth: &G,
        sink: &mut S,
    ) -> Result<Option<TickOutcome>, PipelineError>
    where
        G: GroundTruthSource + ?Sized,
        S: ValidationSink + ?Sized,
    {
        if self.finished || !now.is_finite() || now < self.next_due {
            return Ok(None);
        }
        if self.summary.captures == 0 {
            tracing::info!(
                "validation started at t={now:.2}s ({} captures every {:.1}s)",
                self.num_captures,
                self.interval
            );
        }
        let elapsed = ((now - self.start) / self.interval).floor() + 1.0;
        self.next_due = elapsed.mul_add(self.interval, self.start);
        self.summary.captures += 1;

        let scored = truth
            .sample(state.frame_id)
            .and_then(|sample| pixel_error(state, &sample, &self.rows, self.miss_penalty));

        let outcome = if let Some(error) = scored {
            let record = ValidationRecord {
                frame_id: state.frame_id,
                timestamp: state.timestamp,
                pixel_error: error,
                threshold: self.threshold,
                passed: error <= self.threshold,
            };
            sink.append(&record).map_err(|e| PipelineError::Sink(Box::new(e)))?;
            if record.passed {
                self.summary.passed += 1;
            } else {
                self.summary.failed += 1;
            }
            self.error_sum += error;
            tracing::debug!(
                frame_id = record.frame_id,
                pixel_error = record.pixel_error,
                passed = record.passed,
                "validation capture"
            );
            TickOutcome::Recorded(record)
        } else {
            self.summary.skipped += 1;
            tracing::warn!("no ground truth for frame {}, validation tick skipped", state.frame_id);
            TickOutcome::Skipped {
                frame_id: state.frame_id,
            }
        };

        if self.summary.captures >= self.num_captures {
            self.finish(sink)?;
        }
        Ok(Some(outcome))
    }

    fn finish<S: ValidationSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), PipelineError> {
        self.finished = true;
        sink.finalize().map_err(|e| PipelineError::Sink(Box::new(e)))?;
        let summary = self.summary();
        tracing::info!(
            "validation finished: {} captures, {} passed, {} failed, {} skipped, mean error {}",
            summary.captures,
            summary.passed,
            summary.failed,
            summary.skipped,
            summary
                .mean_error
                .map_or_else(|| "n/a".to_string(), |e| format!("{e:.2}px")),
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::center::with_center;
    use crate::types::{LaneLine, LaneSide, Point};

    const FRAME: Dimensions = Dimensions::new(1280, 720);

    fn config(num_captures: u32, interval: f64) -> ValidationConfig {
        ValidationConfig {
            num_captures,
            interval_seconds: interval,
            start_after_seconds: 5.0,
            ..ValidationConfig::default()
        }
    }

    fn tracked() -> LaneState {
        with_center(
            LaneState {
                frame_id: 7,
                timestamp: 0.35,
                left: Some(LaneLine::new(LaneSide::Left, -1.0, 700.0, 1)),
                right: Some(LaneLine::new(LaneSide::Right, 1.0, 500.0, 1)),
                ..LaneState::default()
            },
            350.0,
        )
    }

    fn exact_truth(frame_id: u64) -> GroundTruthSample {
        GroundTruthSample {
            frame_id,
            left: Some(ReferenceLine::Line {
                slope: -1.0,
                intercept: 700.0,
            }),
            right: Some(ReferenceLine::Line {
                slope: 1.0,
                intercept: 500.0,
            }),
        }
    }

    struct AlwaysTruth;

    impl GroundTruthSource for AlwaysTruth {
        fn sample(&self, frame_id: u64) -> Option<GroundTruthSample> {
            Some(exact_truth(frame_id))
        }
    }

    struct NoTruth;

    impl GroundTruthSource for NoTruth {
        fn sample(&self, _: u64) -> Option<GroundTruthSample> {
            None
        }
    }

    #[test]
    fn scan_rows_are_even_and_inclusive() {
        assert_eq!(scan_rows(432.0, 719.0, 1), vec![719.0]);
        let rows = scan_rows(400.0, 700.0, 4);
        assert_eq!(rows.len(), 4);
        for (row, expected) in rows.iter().zip([400.0, 500.0, 600.0, 700.0]) {
            assert!((row - expected).abs() < 1e-9, "{row} vs {expected}");
        }
        assert!(scan_rows(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn exact_match_has_zero_error() {
        let rows = scan_rows(432.0, 719.0, 10);
        let error = pixel_error(&tracked(), &exact_truth(7), &rows, 1280.0).unwrap();
        assert!(error.abs() < 1e-9, "error {error}");
    }

    #[test]
    fn constant_shift_is_reported_in_pixels() {
        let rows = scan_rows(432.0, 719.0, 10);
        let truth = GroundTruthSample {
            frame_id: 7,
            left: Some(ReferenceLine::Line {
                slope: -1.0,
                intercept: 712.0,
            }),
            right: Some(ReferenceLine::Line {
                slope: 1.0,
                intercept: 512.0,
            }),
        };
        let error = pixel_error(&tracked(), &truth, &rows, 1280.0).unwrap();
        assert!((error - 12.0).abs() < 1e-9, "error {error}");
    }

    #[test]
    fn missing_tracked_side_costs_penalty() {
        let mut state = tracked();
        state.right = None;
        let state = with_center(state, 350.0);
        let truth = GroundTruthSample {
            frame_id: 7,
            left: None,
            right: Some(ReferenceLine::Line {
                slope: 1.0,
                intercept: 500.0,
            }),
        };
        let error = pixel_error(&state, &truth, &[600.0], 1280.0).unwrap();
        assert!((error - 1280.0).abs() < f64::EPSILON);
    }

    #[test]
    fn polyline_reference_outside_rows_is_unavailable() {
        let truth = GroundTruthSample {
            frame_id: 7,
            left: Some(ReferenceLine::Polyline(Polyline::new(vec![
                Point::new(300.0, 100.0),
                Point::new(200.0, 200.0),
            ]))),
            right: None,
        };
        assert!(pixel_error(&tracked(), &truth, &[600.0, 700.0], 1280.0).is_none());
    }

    #[test]
    fn nothing_before_warm_up() {
        let mut engine = ValidationEngine::new(&config(3, 10.0), FRAME, 432);
        let mut log = Vec::new();
        assert_eq!(engine.poll(4.99, &tracked(), &AlwaysTruth, &mut log).unwrap(), None);
        assert!(log.is_empty());
        assert_eq!(engine.next_due(), Some(5.0));
    }

    #[test]
    fn exactly_num_captures_records_then_stops() {
        let mut engine = ValidationEngine::new(&config(20, 10.0), FRAME, 432);
        let mut log = Vec::new();
        let mut t = 0.0;
        while t < 1000.0 {
            engine.poll(t, &tracked(), &AlwaysTruth, &mut log).unwrap();
            t += 0.05;
        }
        assert_eq!(log.len(), 20);
        assert!(engine.is_finished());
        assert_eq!(engine.next_due(), None);
        let summary = engine.summary();
        assert_eq!(summary.captures, 20);
        assert_eq!(summary.passed, 20);
        assert!(summary.mean_error.unwrap().abs() < 1e-9);
    }

    #[test]
    fn late_polls_do_not_replay_missed_ticks() {
        let mut engine = ValidationEngine::new(&config(5, 10.0), FRAME, 432);
        let mut log = Vec::new();
        engine.poll(5.0, &tracked(), &AlwaysTruth, &mut log).unwrap();
        engine.poll(47.0, &tracked(), &AlwaysTruth, &mut log).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(engine.next_due(), Some(55.0));
        assert_eq!(engine.poll(50.0, &tracked(), &AlwaysTruth, &mut log).unwrap(), None);
    }

    #[test]
    fn epoch_scale_clock_jumps_straight_to_the_grid() {
        let mut engine = ValidationEngine::new(&config(3, 0.05), FRAME, 432);
        let mut log = Vec::new();
        let now = 1.8e9 + 0.012;
        let outcome = engine.poll(now, &tracked(), &AlwaysTruth, &mut log).unwrap();
        assert!(matches!(outcome, Some(TickOutcome::Recorded(_))));
        let next = engine.next_due().unwrap();
        assert!(next > now && next - now <= 0.05 + 1e-6);
        let steps = (next - 5.0) / 0.05;
        assert!((steps - steps.round()).abs() < 1e-3);
    }

    #[test]
    fn non_finite_time_is_ignored() {
        let mut engine = ValidationEngine::new(&config(3, 10.0), FRAME, 432);
        let mut log = Vec::new();
        for now in [f64::NAN, f64::INFINITY] {
            assert_eq!(engine.poll(now, &tracked(), &AlwaysTruth, &mut log).unwrap(), None);
        }
        assert!(log.is_empty());
        assert_eq!(engine.next_due(), Some(5.0));
    }

    #[test]
    fn missing_truth_skips_without_record() {
        let mut engine = ValidationEngine::new(&config(2, 1.0), FRAME, 432);
        let mut log = Vec::new();
        let outcome = engine.poll(5.0, &tracked(), &NoTruth, &mut log).unwrap();
        assert_eq!(outcome, Some(TickOutcome::Skipped { frame_id: 7 }));
        assert!(log.is_empty());
        let outcome = engine.poll(6.0, &tracked(), &AlwaysTruth, &mut log).unwrap();
        assert!(matches!(outcome, Some(TickOutcome::Recorded(_))));
        assert!(engine.is_finished());
        let summary = engine.summary();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.recorded(), 1);
    }

    #[test]
    fn threshold_decides_pass() {
        let mut engine = ValidationEngine::new(
            &ValidationConfig {
                pixel_threshold: 5.0,
                ..config(1, 1.0)
            },
            FRAME,
            432,
        );
        let mut state = tracked();
        state.left = Some(LaneLine::new(LaneSide::Left, -1.0, 720.0, 1));
        let state = with_center(state, 350.0);
        let mut log = Vec::new();
        let Some(TickOutcome::Recorded(record)) =
            engine.poll(5.0, &state, &AlwaysTruth, &mut log).unwrap()
        else {
            panic!("expected a record");
        };
        assert!(!record.passed);
        assert!((record.threshold - 5.0).abs() < f64::EPSILON);
        assert_eq!(engine.summary().failed, 1);
    }

    #[test]
    fn map_sources_look_up_by_frame() {
        let mut map: HashMap<u64, GroundTruthSample> = HashMap::new();
        map.insert(7, exact_truth(7));
        assert!(map.sample(7).is_some());
        assert!(map.sample(8).is_none());
        let tree: BTreeMap<_, _> = map.into_iter().collect();
        assert_eq!(tree.sample(7), Some(exact_truth(7)));
    }

    #[test]
    fn reference_line_serde_shape() {
        let json = serde_json::to_string(&ReferenceLine::Line {
            slope: 1.0,
            intercept: 2.0,
        })
        .unwrap();
        assert_eq!(json, r#"{"line":{"slope":1.0,"intercept":2.0}}"#);
    }
}
