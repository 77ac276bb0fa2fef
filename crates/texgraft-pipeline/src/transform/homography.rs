//! Projective transform via normalized DLT.

use nalgebra::{Matrix3, SMatrix, SymmetricEigen, Vector3};

use super::DegenerateTransform;
use super::ransac::RansacModel;
use crate::types::Point;

/// Determinant below which a Frobenius-normalized matrix is singular.
const SINGULAR_DET: f64 = 1e-20;

/// Same bound for the unit-norm solution in Hartley-normalized
/// coordinates, where a healthy fit has a determinant of order one.
const SINGULAR_DET_NORMALIZED: f64 = 1e-10;

/// Homogeneous coordinate below which a point is at infinity.
const HORIZON_EPS: f64 = 1e-12;

/// A non-singular 3x3 homography and its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Homography {
    /// Wrap a matrix, rejecting singular or non-finite ones.
    ///
    /// The stored matrix is scaled so `h[(2, 2)] == 1` when possible.
    ///
    /// # Errors
    ///
    /// [`DegenerateTransform::NonFinite`] or [`DegenerateTransform::Singular`].
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, DegenerateTransform> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(DegenerateTransform::NonFinite);
        }
        let norm = matrix.norm();
        if norm <= f64::EPSILON {
            return Err(DegenerateTransform::Singular);
        }
        let unit = matrix / norm;
        if unit.determinant().abs() < SINGULAR_DET {
            return Err(DegenerateTransform::Singular);
        }
        let forward = if unit[(2, 2)].abs() > HORIZON_EPS {
            unit / unit[(2, 2)]
        } else {
            unit
        };
        let inverse = forward.try_inverse().ok_or(DegenerateTransform::Singular)?;
        if inverse.iter().any(|v| !v.is_finite()) {
            return Err(DegenerateTransform::NonFinite);
        }
        Ok(Self { forward, inverse })
    }

    /// Source-to-destination matrix.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix3<f64> {
        &self.forward
    }

    /// Destination-to-source matrix.
    #[must_use]
    pub const fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    /// Map a source point into the destination.
    #[must_use]
    pub fn apply(&self, p: Point) -> Option<Point> {
        project(&self.forward, p)
    }

    /// Map a destination point back into the source.
    #[must_use]
    pub fn apply_inverse(&self, p: Point) -> Option<Point> {
        project(&self.inverse, p)
    }
}

fn project(m: &Matrix3<f64>, p: Point) -> Option<Point> {
    let v = m * Vector3::new(p.x, p.y, 1.0);
    if v.z.abs() < HORIZON_EPS {
        return None;
    }
    Some(Point::new(v.x / v.z, v.y / v.z))
}

/// Translate the centroid to the origin and scale the mean distance from
/// it to `sqrt(2)`.
#[allow(clippy::cast_precision_loss)]
fn normalize_points(points: &[Point]) -> (Matrix3<f64>, Vec<Point>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let centroid = Point::new(cx, cy);
    let mean_dist = points.iter().map(|p| p.distance(centroid)).sum::<f64>() / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    #[rustfmt::skip]
    let t = Matrix3::new(
        s, 0.0, -s * cx,
        0.0, s, -s * cy,
        0.0, 0.0, 1.0,
    );
    let normalized = points
        .iter()
        .map(|p| Point::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (t, normalized)
}

/// Direct linear transform on at least four correspondences.
fn dlt(source: &[Point], destination: &[Point]) -> Result<Homography, DegenerateTransform> {
    let (t_src, src_n) = normalize_points(source);
    let (t_dst, dst_n) = normalize_points(destination);

    // Accumulate AᵀA directly; the null vector of A is the eigenvector of
    // the smallest eigenvalue.
    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (s, d) in src_n.iter().zip(&dst_n) {
        let rows = [
            [0.0, 0.0, 0.0, -s.x, -s.y, -1.0, d.y * s.x, d.y * s.y, d.y],
            [s.x, s.y, 1.0, 0.0, 0.0, 0.0, -d.x * s.x, -d.x * s.y, -d.x],
        ];
        for row in &rows {
            let r = SMatrix::<f64, 9, 1>::from_row_slice(row);
            ata += r * r.transpose();
        }
    }

    let eig = SymmetricEigen::new(ata);
    let smallest = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map_or(0, |(i, _)| i);
    let h = eig.eigenvectors.column(smallest);
    #[rustfmt::skip]
    let h_norm = Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], h[8],
    );
    if h_norm.determinant().abs() < SINGULAR_DET_NORMALIZED {
        return Err(DegenerateTransform::Singular);
    }

    let t_dst_inv = t_dst.try_inverse().ok_or(DegenerateTransform::Singular)?;
    Homography::new(t_dst_inv * h_norm * t_src)
}

impl RansacModel for Homography {
    const SAMPLE_SIZE: usize = 4;

    fn fit_minimal(source: &[Point], destination: &[Point]) -> Option<Self> {
        if super::any_triple_collinear(source) || super::any_triple_collinear(destination) {
            return None;
        }
        dlt(source, destination).ok()
    }

    fn fit_all(source: &[Point], destination: &[Point]) -> Result<Self, DegenerateTransform> {
        if source.len() < Self::SAMPLE_SIZE {
            return Err(DegenerateTransform::TooFewPoints {
                needed: Self::SAMPLE_SIZE,
                got: source.len(),
            });
        }
        dlt(source, destination)
    }

    fn residual(&self, source: Point, destination: Point) -> f64 {
        self.apply(source)
            .map_or(f64::INFINITY, |p| p.distance(destination))
    }
}
