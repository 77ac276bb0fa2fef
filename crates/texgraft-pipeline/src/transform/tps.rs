//! Thin-plate-spline interpolation.
//!
//! The spline passes exactly through every control point and minimizes
//! bending energy elsewhere. Control points are centered and scaled to
//! unit extent before solving so the kernel matrix stays well
//! conditioned for pixel-sized inputs.

use nalgebra::{DMatrix, Vector2};

use super::DegenerateTransform;
use crate::types::Point;

/// Control points closer than this (in pixels) are merged.
const MERGE_DISTANCE: f64 = 1e-9;

/// Radial basis `r² ln r`, written as `½ r² ln r²` on the squared
/// distance.
fn kernel(r2: f64) -> f64 {
    if r2 <= 0.0 { 0.0 } else { 0.5 * r2 * r2.ln() }
}

/// A fitted 2D thin-plate spline.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinPlateSpline {
    /// Control points in normalized coordinates.
    controls: Vec<Vector2<f64>>,
    /// One kernel weight per control point, per output axis.
    weights: Vec<Vector2<f64>>,
    /// Affine part: constant, x and y coefficients, per output axis.
    affine: [Vector2<f64>; 3],
    center: Vector2<f64>,
    scale: f64,
}

impl ThinPlateSpline {
    /// Fit a spline with `evaluate(controls[i]) == targets[i]`.
    ///
    /// Repeated control points keep their first target.
    ///
    /// # Errors
    ///
    /// [`DegenerateTransform::TooFewPoints`] below three distinct control
    /// points, [`DegenerateTransform::Collinear`] when they lie on a line,
    /// [`DegenerateTransform::Singular`] or
    /// [`DegenerateTransform::NonFinite`] when the system cannot be solved.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(controls: &[Point], targets: &[Point]) -> Result<Self, DegenerateTransform> {
        if controls.len() != targets.len() {
            return Err(DegenerateTransform::LengthMismatch {
                source_len: targets.len(),
                destination_len: controls.len(),
            });
        }

        let mut pairs: Vec<(Point, Point)> = Vec::with_capacity(controls.len());
        for (&c, &t) in controls.iter().zip(targets) {
            if pairs
                .iter()
                .all(|(seen, _)| seen.distance_squared(c) > MERGE_DISTANCE * MERGE_DISTANCE)
            {
                pairs.push((c, t));
            }
        }
        if pairs.len() < 3 {
            return Err(DegenerateTransform::TooFewPoints {
                needed: 3,
                got: pairs.len(),
            });
        }
        let unique: Vec<Point> = pairs.iter().map(|(c, _)| *c).collect();
        if super::is_collinear(&unique) {
            return Err(DegenerateTransform::Collinear);
        }

        let n = pairs.len();
        let center = Vector2::new(
            unique.iter().map(|p| p.x).sum::<f64>() / n as f64,
            unique.iter().map(|p| p.y).sum::<f64>() / n as f64,
        );
        let extent = unique
            .iter()
            .map(|p| (p.x - center.x).abs().max((p.y - center.y).abs()))
            .fold(0.0_f64, f64::max);
        let scale = if extent > 0.0 { 1.0 / extent } else { 1.0 };
        let normalized: Vec<Vector2<f64>> = unique
            .iter()
            .map(|p| (Vector2::new(p.x, p.y) - center) * scale)
            .collect();

        // [ K  P ] [w]   [v]
        // [ Pᵀ 0 ] [a] = [0]
        let size = n + 3;
        let mut system = DMatrix::<f64>::zeros(size, size);
        let mut rhs = DMatrix::<f64>::zeros(size, 2);
        for (i, ci) in normalized.iter().enumerate() {
            for (j, cj) in normalized.iter().enumerate().skip(i + 1) {
                let k = kernel((ci - cj).norm_squared());
                system[(i, j)] = k;
                system[(j, i)] = k;
            }
            for (col, value) in [1.0, ci.x, ci.y].into_iter().enumerate() {
                system[(i, n + col)] = value;
                system[(n + col, i)] = value;
            }
            rhs[(i, 0)] = pairs[i].1.x;
            rhs[(i, 1)] = pairs[i].1.y;
        }

        let solution = system.lu().solve(&rhs).ok_or(DegenerateTransform::Singular)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(DegenerateTransform::NonFinite);
        }

        let weights = (0..n)
            .map(|i| Vector2::new(solution[(i, 0)], solution[(i, 1)]))
            .collect();
        let affine = [0, 1, 2].map(|k| Vector2::new(solution[(n + k, 0)], solution[(n + k, 1)]));

        Ok(Self {
            controls: normalized,
            weights,
            affine,
            center,
            scale,
        })
    }

    /// Number of (distinct) control points.
    #[must_use]
    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    /// Evaluate the spline at `p`.
    #[must_use]
    pub fn evaluate(&self, p: Point) -> Point {
        let q = (Vector2::new(p.x, p.y) - self.center) * self.scale;
        let mut out = self.affine[0] + self.affine[1] * q.x + self.affine[2] * q.y;
        for (c, w) in self.controls.iter().zip(&self.weights) {
            out += w * kernel((q - c).norm_squared());
        }
        Point::new(out.x, out.y)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn ring(n: u32, r: f64) -> Vec<Point> {
        (0..n)
            .map(|i| {
                let t = std::f64::consts::TAU * f64::from(i) / f64::from(n);
                Point::new(r.mul_add(t.cos(), 50.0), r.mul_add(t.sin(), 40.0))
            })
            .collect()
    }

    #[test]
    fn interpolates_control_points() {
        let controls = ring(24, 20.0);
        let targets: Vec<Point> = controls
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let wobble = if i % 2 == 0 { 1.5 } else { -1.5 };
                Point::new(p.x + wobble, p.y - wobble)
            })
            .collect();
        let tps = ThinPlateSpline::fit(&controls, &targets).unwrap();
        for (c, t) in controls.iter().zip(&targets) {
            let got = tps.evaluate(*c);
            assert_abs_diff_eq!(got.x, t.x, epsilon = 1e-6);
            assert_abs_diff_eq!(got.y, t.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn affine_targets_reproduce_affine_map_everywhere() {
        let controls = ring(16, 15.0);
        let map = |p: Point| Point::new(1.2f64.mul_add(p.x, 0.3 * p.y) - 7.0, 0.9f64.mul_add(p.y, 4.0));
        let targets: Vec<Point> = controls.iter().map(|&p| map(p)).collect();
        let tps = ThinPlateSpline::fit(&controls, &targets).unwrap();
        let probe = Point::new(47.0, 38.0);
        let got = tps.evaluate(probe);
        let expected = map(probe);
        assert_abs_diff_eq!(got.x, expected.x, epsilon = 1e-6);
        assert_abs_diff_eq!(got.y, expected.y, epsilon = 1e-6);
    }

    #[test]
    fn duplicate_controls_are_merged() {
        let mut controls = ring(8, 10.0);
        controls.push(controls[0]);
        let mut targets = controls.clone();
        targets[8] = Point::new(0.0, 0.0);
        let tps = ThinPlateSpline::fit(&controls, &targets).unwrap();
        assert_eq!(tps.control_count(), 8);
        let got = tps.evaluate(controls[0]);
        assert_abs_diff_eq!(got.x, controls[0].x, epsilon = 1e-6);
    }

    #[test]
    fn collinear_controls_are_rejected() {
        let controls: Vec<Point> = (0..6).map(|i| Point::new(f64::from(i), 0.0)).collect();
        assert_eq!(
            ThinPlateSpline::fit(&controls, &controls).unwrap_err(),
            DegenerateTransform::Collinear
        );
    }

    #[test]
    fn too_few_distinct_controls() {
        let controls = [Point::new(1.0, 1.0), Point::new(1.0, 1.0), Point::new(4.0, 2.0)];
        assert_eq!(
            ThinPlateSpline::fit(&controls, &controls).unwrap_err(),
            DegenerateTransform::TooFewPoints { needed: 3, got: 2 }
        );
    }
}
