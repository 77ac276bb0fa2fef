//! Affine transform by least squares.

use nalgebra::{Matrix2, Matrix2x3, Matrix3, Vector2, Vector3};

use super::DegenerateTransform;
use super::ransac::RansacModel;
use crate::types::Point;

/// A non-singular 2x3 affine map and its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    forward: Matrix2x3<f64>,
    inverse: Matrix2x3<f64>,
}

impl AffineTransform {
    /// Wrap `[A | t]`, rejecting singular or non-finite maps.
    ///
    /// # Errors
    ///
    /// [`DegenerateTransform::NonFinite`] or [`DegenerateTransform::Singular`].
    pub fn new(matrix: Matrix2x3<f64>) -> Result<Self, DegenerateTransform> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(DegenerateTransform::NonFinite);
        }
        let linear: Matrix2<f64> = matrix.fixed_view::<2, 2>(0, 0).into_owned();
        let scale = linear.norm_squared();
        if scale <= f64::EPSILON || linear.determinant().abs() < 1e-12 * scale {
            return Err(DegenerateTransform::Singular);
        }
        let linear_inv = linear.try_inverse().ok_or(DegenerateTransform::Singular)?;
        let translation: Vector2<f64> = matrix.column(2).into_owned();
        let t_inv = -(linear_inv * translation);
        let inverse = Matrix2x3::new(
            linear_inv[(0, 0)],
            linear_inv[(0, 1)],
            t_inv.x,
            linear_inv[(1, 0)],
            linear_inv[(1, 1)],
            t_inv.y,
        );
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(DegenerateTransform::NonFinite);
        }
        Ok(Self {
            forward: matrix,
            inverse,
        })
    }

    /// Source-to-destination matrix.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix2x3<f64> {
        &self.forward
    }

    /// Destination-to-source matrix.
    #[must_use]
    pub const fn inverse(&self) -> &Matrix2x3<f64> {
        &self.inverse
    }

    /// Map a source point into the destination.
    #[must_use]
    pub fn apply(&self, p: Point) -> Point {
        apply(&self.forward, p)
    }

    /// Map a destination point back into the source.
    #[must_use]
    pub fn apply_inverse(&self, p: Point) -> Point {
        apply(&self.inverse, p)
    }
}

fn apply(m: &Matrix2x3<f64>, p: Point) -> Point {
    let v = m * Vector3::new(p.x, p.y, 1.0);
    Point::new(v.x, v.y)
}

/// Solve the normal equations on centered coordinates.
#[allow(clippy::cast_precision_loss)]
fn least_squares(source: &[Point], destination: &[Point]) -> Result<AffineTransform, DegenerateTransform> {
    let n = source.len() as f64;
    let mx = source.iter().map(|p| p.x).sum::<f64>() / n;
    let my = source.iter().map(|p| p.y).sum::<f64>() / n;

    let mut normal = Matrix3::<f64>::zeros();
    let mut rhs_x = Vector3::<f64>::zeros();
    let mut rhs_y = Vector3::<f64>::zeros();
    for (s, d) in source.iter().zip(destination) {
        let row = Vector3::new(s.x - mx, s.y - my, 1.0);
        normal += row * row.transpose();
        rhs_x += row * d.x;
        rhs_y += row * d.y;
    }
    let lu = normal.lu();
    let (Some(ax), Some(ay)) = (lu.solve(&rhs_x), lu.solve(&rhs_y)) else {
        return Err(DegenerateTransform::Singular);
    };

    // Undo the centering: u = a (x - mx) + b (y - my) + c.
    let tx = ax.z - ax.x * mx - ax.y * my;
    let ty = ay.z - ay.x * mx - ay.y * my;
    AffineTransform::new(Matrix2x3::new(ax.x, ax.y, tx, ay.x, ay.y, ty))
}

impl RansacModel for AffineTransform {
    const SAMPLE_SIZE: usize = 3;

    fn fit_minimal(source: &[Point], destination: &[Point]) -> Option<Self> {
        if super::any_triple_collinear(source) || super::any_triple_collinear(destination) {
            return None;
        }
        least_squares(source, destination).ok()
    }

    fn fit_all(source: &[Point], destination: &[Point]) -> Result<Self, DegenerateTransform> {
        if source.len() < Self::SAMPLE_SIZE {
            return Err(DegenerateTransform::TooFewPoints {
                needed: Self::SAMPLE_SIZE,
                got: source.len(),
            });
        }
        least_squares(source, destination)
    }

    fn residual(&self, source: Point, destination: Point) -> f64 {
        self.apply(source).distance(destination)
    }
}
