//! Geometric models mapping a source boundary onto a destination boundary.
//!
//! Matrix models ([`Homography`], [`AffineTransform`]) are fitted in the
//! forward direction (source to destination) and carry their inverse for
//! backward warping. The [`ThinPlateSpline`] is fitted from destination
//! points to source points, so it already *is* the backward map.
//!
//! Every estimator is pure: the same points and seed always produce the
//! same model.

mod affine;
mod homography;
mod ransac;
mod tps;

pub use affine::AffineTransform;
pub use homography::Homography;
pub use tps::ThinPlateSpline;

use serde::{Deserialize, Serialize};

use crate::types::{Point, WarpMethod};

/// Why a point set cannot produce a usable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateTransform {
    /// Fewer correspondences than the method needs.
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints {
        /// Minimum for the method.
        needed: usize,
        /// Points supplied (after merging duplicates, for elastic).
        got: usize,
    },

    /// Source and destination sequences differ in length.
    #[error("point count mismatch: {source_len} source vs {destination_len} destination")]
    LengthMismatch {
        /// Source point count.
        source_len: usize,
        /// Destination point count.
        destination_len: usize,
    },

    /// All points of one side lie on a single line.
    #[error("points are collinear")]
    Collinear,

    /// No minimal sample produced a model.
    #[error("no consensus model found")]
    NoConsensus,

    /// The fitted matrix or linear system is singular.
    #[error("fitted model is singular")]
    Singular,

    /// The fitted model contains NaN or infinite coefficients.
    #[error("fitted model is not finite")]
    NonFinite,
}

/// A fitted mapping between the two images.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformModel {
    /// Perspective map, source to destination.
    Projective(Homography),
    /// Affine map, source to destination.
    Affine(AffineTransform),
    /// Spline interpolant, destination to source.
    Elastic(ThinPlateSpline),
}

impl TransformModel {
    /// Method this model was fitted with.
    #[must_use]
    pub const fn method(&self) -> WarpMethod {
        match self {
            Self::Projective(_) => WarpMethod::Projective,
            Self::Affine(_) => WarpMethod::Affine,
            Self::Elastic(_) => WarpMethod::Elastic,
        }
    }

    /// Source position that lands on destination position `p`.
    ///
    /// `None` when `p` maps to infinity (projective horizon).
    #[must_use]
    pub fn source_position(&self, p: Point) -> Option<Point> {
        match self {
            Self::Projective(h) => h.apply_inverse(p),
            Self::Affine(a) => Some(a.apply_inverse(p)),
            Self::Elastic(tps) => Some(tps.evaluate(p)),
        }
    }
}

/// Fit `method` to the correspondences `source[i] -> destination[i]`.
///
/// Projective and affine fits run inside a RANSAC loop seeded with
/// `seed`, then refit on the consensus set.
///
/// # Errors
///
/// Returns [`DegenerateTransform`] when the points cannot support the
/// method (too few, collinear, singular result).
pub fn estimate(
    source: &[Point],
    destination: &[Point],
    method: WarpMethod,
    seed: u64,
) -> Result<TransformModel, DegenerateTransform> {
    if source.len() != destination.len() {
        return Err(DegenerateTransform::LengthMismatch {
            source_len: source.len(),
            destination_len: destination.len(),
        });
    }
    let needed = method.min_points();
    if source.len() < needed {
        return Err(DegenerateTransform::TooFewPoints {
            needed,
            got: source.len(),
        });
    }

    let params = ransac::RansacParams {
        seed,
        ..ransac::RansacParams::default()
    };
    match method {
        WarpMethod::Projective => {
            if is_collinear(source) || is_collinear(destination) {
                return Err(DegenerateTransform::Collinear);
            }
            ransac::fit::<Homography>(source, destination, &params).map(TransformModel::Projective)
        }
        WarpMethod::Affine => {
            if is_collinear(source) || is_collinear(destination) {
                return Err(DegenerateTransform::Collinear);
            }
            ransac::fit::<AffineTransform>(source, destination, &params)
                .map(TransformModel::Affine)
        }
        WarpMethod::Elastic => {
            ThinPlateSpline::fit(destination, source).map(TransformModel::Elastic)
        }
    }
}

/// Ratio of minor to major principal variance below which a point set is
/// treated as a line.
const COLLINEAR_RATIO: f64 = 1e-6;

/// Whether `points` lie (numerically) on one line, or on one point.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn is_collinear(points: &[Point]) -> bool {
    if points.len() < 3 {
        return true;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.x - mx, p.y - my);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    // Eigenvalues of the 2x2 scatter matrix.
    let half_trace = 0.5 * (sxx + syy);
    let spread = (0.5 * (sxx - syy)).hypot(sxy);
    let major = half_trace + spread;
    let minor = half_trace - spread;
    major <= f64::EPSILON || minor <= COLLINEAR_RATIO * major
}

/// Twice the signed area of triangle `abc`.
pub(crate) fn cross(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x).mul_add(c.y - a.y, -((b.y - a.y) * (c.x - a.x)))
}

/// Whether any three of `points` are (nearly) collinear.
pub(crate) fn any_triple_collinear(points: &[Point]) -> bool {
    let scale = points
        .iter()
        .flat_map(|a| points.iter().map(move |b| a.distance_squared(*b)))
        .fold(0.0_f64, f64::max);
    if scale <= f64::EPSILON {
        return true;
    }
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            for k in (j + 1)..points.len() {
                if cross(points[i], points[j], points[k]).abs() <= 1e-9 * scale {
                    return true;
                }
            }
        }
    }
    false
}
