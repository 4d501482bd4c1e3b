//! Line segment detection with a progressive probabilistic Hough transform.
//!
//! Lines are parameterized in normal form `x·cosθ + y·sinθ = ρ` with
//! `θ ∈ [0, π)`. Every edge pixel inside the region of interest votes
//! once per θ bin. Accumulator peaks are then visited strongest first:
//! the candidate line is walked pixel by pixel, edge pixels along it are
//! grouped into runs separated by at most `max_gap`, and runs at least
//! `min_length` long become segments. Pixels claimed by a segment no
//! longer support later peaks.
//!
//! Peak order is fully determined by (votes, accumulator index), so the
//! same edge map always yields the same segments in the same order.

use std::collections::HashSet;
use std::f64::consts::PI;

use image::GrayImage;

use crate::config::SegmentConfig;
use crate::types::{LineSegment, Point};

/// Detector parameters in working units (pixels, radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    /// Radial bin width in pixels.
    pub rho_step: f64,
    /// Angular bin width in radians.
    pub theta_step: f64,
    /// Minimum votes for a peak and minimum live support for a walk.
    pub vote_threshold: u32,
    /// Minimum reported segment length.
    pub min_length: f64,
    /// Maximum gap bridged inside one segment.
    pub max_gap: f64,
}

impl HoughParams {
    /// Convert from the serialized configuration section.
    #[must_use]
    pub fn from_config(config: &SegmentConfig) -> Self {
        Self {
            rho_step: config.rho_step,
            theta_step: config.theta_step_degrees.to_radians(),
            vote_threshold: config.vote_threshold,
            min_length: config.min_length,
            max_gap: config.max_gap,
        }
    }
}

/// Detect line segments among edge pixels at or below `first_row`.
#[must_use]
pub fn detect_segments(edges: &GrayImage, first_row: u32, params: &HoughParams) -> Vec<LineSegment> {
    let (w, h) = edges.dimensions();
    if w == 0 || first_row >= h {
        return Vec::new();
    }

    let pixels: Vec<(u32, u32)> = (first_row..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .filter(|&(x, y)| edges.get_pixel(x, y).0[0] > 0)
        .collect();
    if pixels.is_empty() {
        return Vec::new();
    }

    let mut acc = Accumulator::new(w, h, params);
    for &(x, y) in &pixels {
        acc.vote(x, y);
    }

    let area = Area {
        width: w,
        height: h,
        first_row,
    };
    let mut consumed = vec![false; w as usize * h as usize];
    let mut segments = Vec::new();

    for peak in acc.peaks(params.vote_threshold) {
        let (theta, rho) = acc.line(peak);
        let hits = walk(edges, &area, &consumed, theta, rho, params.rho_step);
        if hits.len() < params.vote_threshold as usize {
            continue;
        }
        for run in split_runs(&hits, params.max_gap) {
            let (first, last) = (run[0], run[run.len() - 1]);
            let segment = LineSegment::new(first.point(), last.point());
            if segment.length() < params.min_length {
                continue;
            }
            for hit in run {
                consumed[area.index(hit.x, hit.y)] = true;
            }
            segments.push(segment);
        }
    }
    segments
}

struct Accumulator {
    n_theta: usize,
    n_rho: usize,
    rho_offset: i64,
    rho_step: f64,
    theta_step: f64,
    cos: Vec<f64>,
    sin: Vec<f64>,
    votes: Vec<u32>,
}

impl Accumulator {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn new(width: u32, height: u32, params: &HoughParams) -> Self {
        let n_theta = ((PI / params.theta_step).round() as usize).max(1);
        let diagonal = f64::from(width).hypot(f64::from(height));
        let rho_offset = (diagonal / params.rho_step).ceil() as i64;
        let n_rho = (2 * rho_offset + 1) as usize;
        let (sin, cos): (Vec<f64>, Vec<f64>) = (0..n_theta)
            .map(|k| (k as f64 * params.theta_step).sin_cos())
            .unzip();
        Self {
            n_theta,
            n_rho,
            rho_offset,
            rho_step: params.rho_step,
            theta_step: params.theta_step,
            cos,
            sin,
            votes: vec![0; n_theta * n_rho],
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn vote(&mut self, x: u32, y: u32) {
        let (xf, yf) = (f64::from(x), f64::from(y));
        for k in 0..self.n_theta {
            let rho = xf.mul_add(self.cos[k], yf * self.sin[k]);
            let bin = (rho / self.rho_step).round() as i64 + self.rho_offset;
            if (0..self.n_rho as i64).contains(&bin) {
                self.votes[k * self.n_rho + bin as usize] += 1;
            }
        }
    }

    /// Cells with at least `threshold` votes that dominate their 3x3
    /// neighbourhood, strongest first. Plateaus keep their lowest index.
    fn peaks(&self, threshold: u32) -> Vec<usize> {
        let mut peaks: Vec<usize> = (0..self.votes.len())
            .filter(|&i| self.votes[i] >= threshold.max(1) && self.is_local_max(i))
            .collect();
        peaks.sort_by(|&a, &b| self.votes[b].cmp(&self.votes[a]).then(a.cmp(&b)));
        peaks
    }

    fn is_local_max(&self, index: usize) -> bool {
        let value = self.votes[index];
        let (k, r) = (index / self.n_rho, index % self.n_rho);
        for dk in [-1_isize, 0, 1] {
            for dr in [-1_isize, 0, 1] {
                if dk == 0 && dr == 0 {
                    continue;
                }
                let (Some(nk), Some(nr)) = (k.checked_add_signed(dk), r.checked_add_signed(dr))
                else {
                    continue;
                };
                if nk >= self.n_theta || nr >= self.n_rho {
                    continue;
                }
                let neighbour_index = nk * self.n_rho + nr;
                let neighbour = self.votes[neighbour_index];
                if neighbour > value || (neighbour == value && neighbour_index < index) {
                    return false;
                }
            }
        }
        true
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    fn line(&self, index: usize) -> (f64, f64) {
        let (k, r) = (index / self.n_rho, index % self.n_rho);
        let theta = k as f64 * self.theta_step;
        let rho = (r as i64 - self.rho_offset) as f64 * self.rho_step;
        (theta, rho)
    }
}

/// The searchable rectangle: full width, rows `first_row..height`.
struct Area {
    width: u32,
    height: u32,
    first_row: u32,
}

impl Area {
    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn pixel(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        let (rx, ry) = (x.round(), y.round());
        if rx < 0.0 || ry < f64::from(self.first_row) {
            return None;
        }
        let (px, py) = (rx as u32, ry as u32);
        (px < self.width && py < self.height).then_some((px, py))
    }

    /// Parameter range of `origin + t·direction` inside the area
    /// (Liang–Barsky clipping).
    fn clip(&self, origin: Point, direction: Point) -> Option<(f64, f64)> {
        let bounds = [
            (origin.x, direction.x, 0.0, f64::from(self.width - 1)),
            (
                origin.y,
                direction.y,
                f64::from(self.first_row),
                f64::from(self.height - 1),
            ),
        ];
        let (mut t0, mut t1) = (f64::NEG_INFINITY, f64::INFINITY);
        for (p, d, lo, hi) in bounds {
            if d.abs() < 1e-12 {
                if p < lo - 0.5 || p > hi + 0.5 {
                    return None;
                }
                continue;
            }
            let (a, b) = ((lo - p) / d, (hi - p) / d);
            t0 = t0.max(a.min(b));
            t1 = t1.min(a.max(b));
        }
        (t0 <= t1).then_some((t0, t1))
    }
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    t: f64,
    x: u32,
    y: u32,
}

impl Hit {
    fn point(self) -> Point {
        Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// Live edge pixels within half a ρ bin of the line, ordered along it.
#[allow(clippy::cast_possible_truncation)]
fn walk(
    edges: &GrayImage,
    area: &Area,
    consumed: &[bool],
    theta: f64,
    rho: f64,
    rho_step: f64,
) -> Vec<Hit> {
    let (sin, cos) = theta.sin_cos();
    let origin = Point::new(rho * cos, rho * sin);
    let direction = Point::new(-sin, cos);
    let Some((t0, t1)) = area.clip(origin, direction) else {
        return Vec::new();
    };

    let reach = (rho_step / 2.0).ceil().max(1.0) as i32;
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    let mut t = t0;
    while t <= t1 {
        let cx = direction.x.mul_add(t, origin.x);
        let cy = direction.y.mul_add(t, origin.y);
        for offset in -reach..=reach {
            let o = f64::from(offset);
            let Some((x, y)) = area.pixel(cos.mul_add(o, cx), sin.mul_add(o, cy)) else {
                continue;
            };
            let index = area.index(x, y);
            if edges.get_pixel(x, y).0[0] == 0 || consumed[index] || !seen.insert(index) {
                continue;
            }
            let along = (f64::from(x) - origin.x)
                .mul_add(direction.x, (f64::from(y) - origin.y) * direction.y);
            hits.push(Hit { t: along, x, y });
        }
        t += 1.0;
    }
    hits.sort_by(|a, b| a.t.total_cmp(&b.t));
    hits
}

/// Split ordered hits wherever consecutive hits are more than `max_gap` apart.
fn split_runs(hits: &[Hit], max_gap: f64) -> Vec<&[Hit]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..hits.len() {
        if hits[i].t - hits[i - 1].t > max_gap + 1.0 {
            runs.push(&hits[start..i]);
            start = i;
        }
    }
    if start < hits.len() {
        runs.push(&hits[start..]);
    }
    runs
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Luma;

    fn params() -> HoughParams {
        HoughParams::from_config(&SegmentConfig::default())
    }

    fn draw(edges: &mut GrayImage, from: (u32, u32), to: (u32, u32)) {
        let steps = from.0.abs_diff(to.0).max(from.1.abs_diff(to.1));
        for i in 0..=steps {
            let f = f64::from(i) / f64::from(steps.max(1));
            let x = (f64::from(to.0) - f64::from(from.0)).mul_add(f, f64::from(from.0));
            let y = (f64::from(to.1) - f64::from(from.1)).mul_add(f, f64::from(from.1));
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            edges.put_pixel(x.round() as u32, y.round() as u32, Luma([255]));
        }
    }

    fn assert_near(p: Point, x: f64, y: f64) {
        assert!(
            (p.x - x).abs() <= 2.0 && (p.y - y).abs() <= 2.0,
            "expected ({x}, {y}), got ({}, {})",
            p.x,
            p.y
        );
    }

    #[test]
    fn empty_map_yields_nothing() {
        let edges = GrayImage::new(200, 100);
        assert!(detect_segments(&edges, 0, &params()).is_empty());
    }

    #[test]
    fn diagonal_line_found_once() {
        let mut edges = GrayImage::new(400, 400);
        draw(&mut edges, (100, 350), (300, 150));
        let segments = detect_segments(&edges, 0, &params());
        assert_eq!(segments.len(), 1, "{segments:?}");
        let s = segments[0];
        let (top, bottom) = if s.start.y < s.end.y { (s.start, s.end) } else { (s.end, s.start) };
        assert_near(top, 300.0, 150.0);
        assert_near(bottom, 100.0, 350.0);
        assert!((s.slope().unwrap() + 1.0).abs() < 0.02);
    }

    #[test]
    fn vertical_line_found() {
        let mut edges = GrayImage::new(100, 200);
        draw(&mut edges, (40, 20), (40, 180));
        let segments = detect_segments(&edges, 0, &params());
        assert_eq!(segments.len(), 1);
        assert!(segments[0].slope().is_none());
        assert!((segments[0].length() - 160.0).abs() <= 2.0);
    }

    #[test]
    fn pixels_above_first_row_are_ignored() {
        let mut edges = GrayImage::new(200, 200);
        draw(&mut edges, (20, 10), (180, 10));
        assert!(detect_segments(&edges, 100, &params()).is_empty());
        assert_eq!(detect_segments(&edges, 0, &params()).len(), 1);
    }

    #[test]
    fn segment_clipped_to_region_of_interest() {
        let mut edges = GrayImage::new(300, 300);
        draw(&mut edges, (50, 50), (250, 250));
        let segments = detect_segments(&edges, 150, &params());
        assert_eq!(segments.len(), 1);
        let s = segments[0];
        assert!(s.start.y >= 150.0 && s.end.y >= 150.0);
        assert!((s.length() - 100.0 * 2.0_f64.sqrt()).abs() <= 3.0);
    }

    #[test]
    fn small_gap_bridged_large_gap_split() {
        let mut edges = GrayImage::new(400, 100);
        draw(&mut edges, (10, 50), (150, 50));
        draw(&mut edges, (160, 50), (250, 50));
        let joined = detect_segments(&edges, 0, &params());
        assert_eq!(joined.len(), 1);
        assert!((joined[0].length() - 240.0).abs() <= 1.0);

        let mut split = GrayImage::new(400, 100);
        draw(&mut split, (10, 50), (150, 50));
        draw(&mut split, (200, 50), (390, 50));
        let segments = detect_segments(&split, 0, &params());
        assert_eq!(segments.len(), 2, "{segments:?}");
    }

    #[test]
    fn short_runs_dropped() {
        let mut edges = GrayImage::new(400, 100);
        draw(&mut edges, (10, 50), (200, 50));
        draw(&mut edges, (300, 50), (320, 50));
        let segments = detect_segments(&edges, 0, &params());
        assert_eq!(segments.len(), 1);
        assert!(segments[0].start.x < 250.0 && segments[0].end.x < 250.0);
    }

    #[test]
    fn detection_is_deterministic() {
        let mut edges = GrayImage::new(640, 360);
        draw(&mut edges, (50, 350), (250, 220));
        draw(&mut edges, (590, 350), (390, 220));
        draw(&mut edges, (100, 300), (500, 300));
        let a = detect_segments(&edges, 200, &params());
        let b = detect_segments(&edges, 200, &params());
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }
}
