//! Bird's-eye-view projection.
//!
//! Segment fitting runs in a [`Projector`]'s space. The
//! [`ProjectorKind::Identity`] projector leaves image coordinates alone;
//! [`ProjectorKind::Bev`] maps the configured road trapezoid onto an
//! upright rectangle with a planar homography so that parallel lane
//! boundaries become parallel (near-vertical) lines.
//!
//! The BEV rectangle corners are assigned as follows:
//!
//! | source corner   | BEV corner |
//! |-----------------|------------|
//! | bottom-left     | `(0, H)`   |
//! | bottom-right    | `(W, H)`   |
//! | right-horizon   | `(W, 0)`   |
//! | left-horizon    | `(0, 0)`   |

use nalgebra::{DMatrix, Matrix3, Vector3};

use crate::config::BevConfig;
use crate::types::{Dimensions, Point};

/// Homogeneous `w` values closer to zero than this map to infinity.
const W_EPSILON: f64 = 1e-9;

/// Why a homography could not be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HomographyError {
    /// Three of the four source or destination points are collinear.
    #[error("three of the four correspondence points are collinear")]
    Degenerate,

    /// The estimated matrix has no inverse.
    #[error("homography matrix is singular")]
    Singular,
}

/// A planar homography together with its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Estimate `H` with `dst ~ H·src` from four correspondences (DLT).
    ///
    /// # Errors
    ///
    /// [`HomographyError::Degenerate`] if any three points on either side
    /// are collinear, [`HomographyError::Singular`] if the result cannot
    /// be inverted.
    pub fn from_correspondences(src: &[Point; 4], dst: &[Point; 4]) -> Result<Self, HomographyError> {
        if has_collinear_triple(src) || has_collinear_triple(dst) {
            return Err(HomographyError::Degenerate);
        }

        let (src_norm, src_t) = normalize(src);
        let (dst_norm, dst_t) = normalize(dst);

        // 8 equations padded with a zero row so the SVD yields a full V.
        let mut a = DMatrix::<f64>::zeros(9, 9);
        for (i, (s, d)) in src_norm.iter().zip(&dst_norm).enumerate() {
            let (x, y, u, v) = (s.x, s.y, d.x, d.y);
            let (r0, r1) = (2 * i, 2 * i + 1);

            a[(r0, 0)] = -x;
            a[(r0, 1)] = -y;
            a[(r0, 2)] = -1.0;
            a[(r0, 6)] = u * x;
            a[(r0, 7)] = u * y;
            a[(r0, 8)] = u;

            a[(r1, 3)] = -x;
            a[(r1, 4)] = -y;
            a[(r1, 5)] = -1.0;
            a[(r1, 6)] = v * x;
            a[(r1, 7)] = v * y;
            a[(r1, 8)] = v;
        }

        let svd = a.svd(false, true);
        let v_t = svd.v_t.ok_or(HomographyError::Singular)?;
        let smallest = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .ok_or(HomographyError::Singular)?;
        let h = v_t.row(smallest);

        let normalized = Matrix3::from_fn(|r, c| h[3 * r + c]);
        let dst_t_inv = dst_t.try_inverse().ok_or(HomographyError::Singular)?;
        let mut forward = dst_t_inv * normalized * src_t;
        let scale = forward[(2, 2)];
        if scale.abs() <= f64::EPSILON {
            return Err(HomographyError::Singular);
        }
        forward /= scale;

        let inverse = forward.try_inverse().ok_or(HomographyError::Singular)?;
        Ok(Self { forward, inverse })
    }

    /// The forward matrix, normalized so `H[2,2] = 1`.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// Map `p` forward. `None` when it lands at infinity.
    #[must_use]
    pub fn apply(&self, p: Point) -> Option<Point> {
        apply(&self.forward, p)
    }

    /// Map `p` backward. `None` when it lands at infinity.
    #[must_use]
    pub fn apply_inverse(&self, p: Point) -> Option<Point> {
        apply(&self.inverse, p)
    }
}

fn apply(m: &Matrix3<f64>, p: Point) -> Option<Point> {
    let v = m * Vector3::new(p.x, p.y, 1.0);
    let w = v[2];
    if !w.is_finite() || w.abs() <= W_EPSILON || !v[0].is_finite() || !v[1].is_finite() {
        return None;
    }
    Some(Point::new(v[0] / w, v[1] / w))
}

/// Hartley normalization: centroid to the origin, mean distance `sqrt(2)`.
fn normalize(points: &[Point; 4]) -> ([Point; 4], Matrix3<f64>) {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let centroid = Point::new(cx, cy);
    let mean = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / 4.0;
    let s = if mean > f64::EPSILON {
        std::f64::consts::SQRT_2 / mean
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    (points.map(|p| Point::new(s * (p.x - cx), s * (p.y - cy))), t)
}

fn has_collinear_triple(points: &[Point; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[i, j, k]| {
        let (a, b, c) = (points[i], points[j], points[k]);
        let cross = (b.x - a.x).mul_add(c.y - a.y, -(b.y - a.y) * (c.x - a.x));
        let scale = a.distance(b).max(a.distance(c)).max(1.0);
        cross.abs() <= 1e-9 * scale * scale
    })
}

/// Coordinate space that lane lines are fitted in.
pub trait Projector {
    /// Image point to fitting space.
    fn project(&self, p: Point) -> Option<Point>;

    /// Fitting-space point back to the image.
    fn unproject(&self, p: Point) -> Option<Point>;

    /// Extent of the fitting space.
    fn space(&self) -> Dimensions;
}

/// Image trapezoid to upright BEV rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BevProjection {
    homography: Homography,
    space: Dimensions,
}

impl BevProjection {
    /// Build from the BEV section, scaling the fractional source corners
    /// to `image`.
    ///
    /// # Errors
    ///
    /// Propagates [`HomographyError`] for a degenerate trapezoid.
    pub fn new(bev: &BevConfig, image: Dimensions) -> Result<Self, HomographyError> {
        let src = bev.source.map(|p| p.to_pixels(image));
        let (w, h) = (f64::from(bev.width), f64::from(bev.height));
        let dst = [
            Point::new(0.0, h),
            Point::new(w, h),
            Point::new(w, 0.0),
            Point::new(0.0, 0.0),
        ];
        Ok(Self {
            homography: Homography::from_correspondences(&src, &dst)?,
            space: bev.dimensions(),
        })
    }
}

impl Projector for BevProjection {
    fn project(&self, p: Point) -> Option<Point> {
        self.homography.apply(p)
    }

    fn unproject(&self, p: Point) -> Option<Point> {
        self.homography.apply_inverse(p)
    }

    fn space(&self) -> Dimensions {
        self.space
    }
}

/// Selects the fitting space at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectorKind {
    /// Fit directly in image coordinates of the given size.
    Identity(Dimensions),
    /// Fit in bird's-eye view.
    Bev(BevProjection),
}

impl ProjectorKind {
    /// Pick the projector for `bev` at working resolution `image`.
    ///
    /// A degenerate BEV trapezoid is logged and replaced by the identity
    /// projector so the pipeline keeps running.
    #[must_use]
    pub fn from_config(bev: &BevConfig, image: Dimensions) -> Self {
        if !bev.enabled {
            return Self::Identity(image);
        }
        match BevProjection::new(bev, image) {
            Ok(projection) => Self::Bev(projection),
            Err(e) => {
                tracing::warn!("BEV projection disabled: {e}");
                Self::Identity(image)
            }
        }
    }

    /// Whether fitting happens in BEV space.
    #[must_use]
    pub const fn is_bev(&self) -> bool {
        matches!(self, Self::Bev(_))
    }
}

impl Projector for ProjectorKind {
    fn project(&self, p: Point) -> Option<Point> {
        match self {
            Self::Identity(_) => Some(p),
            Self::Bev(bev) => bev.project(p),
        }
    }

    fn unproject(&self, p: Point) -> Option<Point> {
        match self {
            Self::Identity(_) => Some(p),
            Self::Bev(bev) => bev.unproject(p),
        }
    }

    fn space(&self) -> Dimensions {
        match self {
            Self::Identity(dimensions) => *dimensions,
            Self::Bev(bev) => bev.space(),
        }
    }
}
