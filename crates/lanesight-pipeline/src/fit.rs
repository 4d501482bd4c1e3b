//! Segment classification and per-side line fitting.
//!
//! Classification happens in image space, where slope sign and frame
//! half are meaningful. Fitting happens in the [`Projector`]'s space and
//! the result is mapped back to an image-space [`LaneLine`]. Homographies
//! preserve straight lines, so the round trip is exact up to rounding.

use crate::bev::Projector;
use crate::config::FitConfig;
use crate::types::{Dimensions, LaneLine, LaneSide, LineSegment, Point};

/// At most one freshly fitted line per side for a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FittedLanes {
    /// Left boundary candidate.
    pub left: Option<LaneLine>,
    /// Right boundary candidate.
    pub right: Option<LaneLine>,
}

impl FittedLanes {
    /// Number of sides with a fitted line.
    #[must_use]
    pub fn count(&self) -> usize {
        usize::from(self.left.is_some()) + usize::from(self.right.is_some())
    }
}

/// Assign a segment to a lane side, or `None` if it is not a boundary.
///
/// Negative `dy/dx` with a midpoint in the left half is [`LaneSide::Left`];
/// positive `dy/dx` with a midpoint in the right half is
/// [`LaneSide::Right`]. Vertical segments and segments flatter than
/// `min_abs_slope` are discarded.
#[must_use]
pub fn classify(segment: &LineSegment, frame_width: u32, min_abs_slope: f64) -> Option<LaneSide> {
    let slope = segment.slope()?;
    if slope.abs() < min_abs_slope {
        return None;
    }
    let half = f64::from(frame_width) / 2.0;
    let mid = segment.midpoint().x;
    if slope < 0.0 && mid < half {
        Some(LaneSide::Left)
    } else if slope > 0.0 && mid >= half {
        Some(LaneSide::Right)
    } else {
        None
    }
}

/// Map segment endpoints into `projector`'s space, dropping segments
/// with an endpoint at infinity.
#[must_use]
pub fn project_segments<P: Projector>(segments: &[LineSegment], projector: &P) -> Vec<LineSegment> {
    segments
        .iter()
        .filter_map(|s| Some(LineSegment::new(projector.project(s.start)?, projector.project(s.end)?)))
        .collect()
}

/// Length-weighted running mean of row-form line parameters.
#[derive(Debug, Default)]
struct SideAccumulator {
    slope: f64,
    intercept: f64,
    weight: f64,
    count: u32,
}

impl SideAccumulator {
    fn add(&mut self, a: Point, b: Point) {
        let dy = b.y - a.y;
        if dy.abs() < f64::EPSILON {
            return;
        }
        let slope = (b.x - a.x) / dy;
        let intercept = slope.mul_add(-a.y, a.x);
        let weight = a.distance(b);
        self.slope = slope.mul_add(weight, self.slope);
        self.intercept = intercept.mul_add(weight, self.intercept);
        self.weight += weight;
        self.count += 1;
    }

    fn finish<P: Projector>(&self, side: LaneSide, projector: &P) -> Option<LaneLine> {
        if self.count == 0 || self.weight <= f64::EPSILON {
            return None;
        }
        let slope = self.slope / self.weight;
        let intercept = self.intercept / self.weight;
        let bottom = f64::from(projector.space().height);
        let top = projector.unproject(Point::new(intercept, 0.0))?;
        let base = projector.unproject(Point::new(slope.mul_add(bottom, intercept), bottom))?;
        LaneLine::through(side, top, base, self.count)
    }
}

/// Classify `segments` and fit one line per side.
///
/// A side with no classified segments is absent from the result. This
/// is the normal "no detection" outcome, not an error.
#[must_use]
pub fn fit_lanes<P: Projector>(
    segments: &[LineSegment],
    frame: Dimensions,
    projector: &P,
    config: &FitConfig,
) -> FittedLanes {
    let mut left = SideAccumulator::default();
    let mut right = SideAccumulator::default();

    for segment in segments {
        let Some(side) = classify(segment, frame.width, config.min_abs_slope) else {
            continue;
        };
        let (Some(a), Some(b)) = (projector.project(segment.start), projector.project(segment.end))
        else {
            continue;
        };
        match side {
            LaneSide::Left => left.add(a, b),
            LaneSide::Right => right.add(a, b),
        }
    }

    FittedLanes {
        left: left.finish(LaneSide::Left, projector),
        right: right.finish(LaneSide::Right, projector),
    }
}
