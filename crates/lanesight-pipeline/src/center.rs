//! Center line synthesis and overlay geometry.
//!
//! Both functions here are pure: they read a [`LaneState`] and return
//! new data. Drawing is left to the caller.

use serde::{Deserialize, Serialize};

use crate::config::DisplayConfig;
use crate::types::{CenterLine, CenterSource, LaneLine, LaneSide, LaneState, Point, Polyline};

/// Derive the center line from the tracked boundaries.
///
/// - Both sides: the exact midline (mean slope and mean intercept).
/// - One side: that side shifted toward the lane by `single_side_offset`
///   pixels (right of a left boundary, left of a right boundary).
/// - No side: `None`.
#[must_use]
pub fn center_line(
    left: Option<&LaneLine>,
    right: Option<&LaneLine>,
    single_side_offset: f64,
) -> Option<CenterLine> {
    match (left, right) {
        (Some(l), Some(r)) => Some(CenterLine {
            slope: (l.slope + r.slope) / 2.0,
            intercept: (l.intercept + r.intercept) / 2.0,
            source: CenterSource::Midline,
        }),
        (Some(l), None) => Some(CenterLine {
            slope: l.slope,
            intercept: l.intercept + single_side_offset,
            source: CenterSource::Offset(LaneSide::Left),
        }),
        (None, Some(r)) => Some(CenterLine {
            slope: r.slope,
            intercept: r.intercept - single_side_offset,
            source: CenterSource::Offset(LaneSide::Right),
        }),
        (None, None) => None,
    }
}

/// Fill in `state.center` from its boundaries.
#[must_use]
pub fn with_center(mut state: LaneState, single_side_offset: f64) -> LaneState {
    state.center = center_line(state.left.as_ref(), state.right.as_ref(), single_side_offset);
    state
}

/// Renderable lane geometry for one frame.
///
/// Each polyline runs from the top of the region of interest to the
/// bottom row of the frame. A line is absent when its lane is not
/// tracked or its display flag is off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// Left boundary.
    pub left: Option<Polyline>,
    /// Right boundary.
    pub right: Option<Polyline>,
    /// Center line.
    pub center: Option<Polyline>,
}

impl Overlay {
    /// Build the overlay for `state` between rows `top` and `bottom`.
    #[must_use]
    pub fn from_state(state: &LaneState, top: f64, bottom: f64, display: &DisplayConfig) -> Self {
        let span = |x_at: &dyn Fn(f64) -> f64| {
            Polyline::new(vec![Point::new(x_at(top), top), Point::new(x_at(bottom), bottom)])
        };
        Self {
            left: state
                .left
                .filter(|_| display.show_left)
                .map(|l| span(&|y| l.x_at(y))),
            right: state
                .right
                .filter(|_| display.show_right)
                .map(|r| span(&|y| r.x_at(y))),
            center: state
                .center
                .filter(|_| display.show_center)
                .map(|c| span(&|y| c.x_at(y))),
        }
    }

    /// All present polylines, tagged by role.
    pub fn lines(&self) -> impl Iterator<Item = (OverlayRole, &Polyline)> {
        [
            (OverlayRole::Left, self.left.as_ref()),
            (OverlayRole::Right, self.right.as_ref()),
            (OverlayRole::Center, self.center.as_ref()),
        ]
        .into_iter()
        .filter_map(|(role, line)| line.map(|l| (role, l)))
    }

    /// Whether nothing would be drawn.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none() && self.center.is_none()
    }
}

/// Which lane line an overlay polyline represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlayRole {
    /// Left boundary.
    Left,
    /// Right boundary.
    Right,
    /// Center line.
    Center,
}

impl OverlayRole {
    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Center => "center",
        }
    }
}
