//! Fixed-count contour resampling.
//!
//! The boundary is parameterized by vertex *index*, not arc length: sample
//! `t` lands at fractional index `t * (m - 1)` of the `m` input vertices.
//! Dense stretches of the traced boundary therefore receive proportionally
//! more samples than long straight runs.

use crate::types::{Contour, Point};

/// Minimum number of resampled boundary points.
pub const MIN_POINTS: usize = 10;

/// Boundary points at full warp strength.
pub const POINTS_AT_FULL_STRENGTH: f64 = 50.0;

/// Number of samples for a given warp strength: `max(10, round(50 * s))`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn point_count(strength: f64) -> usize {
    let n = (POINTS_AT_FULL_STRENGTH * strength).round();
    if n.is_finite() && n > 0.0 {
        (n as usize).max(MIN_POINTS)
    } else {
        MIN_POINTS
    }
}

/// Resample `contour` to exactly `count` points, uniformly in index space.
///
/// Consecutive duplicate vertices are collapsed first. The first and last
/// samples are the first and last input vertices, and orientation is
/// preserved. A single-point contour yields `count` copies of that point;
/// an empty contour yields an empty one.
#[must_use = "returns the resampled contour"]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn resample(contour: &Contour, count: usize) -> Contour {
    let source = Contour::deduplicated(contour.points().iter().copied());
    let points = source.points();
    let Some(&first) = points.first() else {
        return Contour::new(Vec::new());
    };
    if points.len() == 1 || count < 2 {
        return Contour::new(vec![first; count]);
    }

    let last_index = (points.len() - 1) as f64;
    let steps = (count - 1) as f64;
    let samples = (0..count)
        .map(|i| {
            let position = i as f64 / steps * last_index;
            let lower = (position.floor() as usize).min(points.len() - 2);
            let frac = position - lower as f64;
            points[lower].lerp(points[lower + 1], frac)
        })
        .collect::<Vec<Point>>();
    Contour::new(samples)
}
