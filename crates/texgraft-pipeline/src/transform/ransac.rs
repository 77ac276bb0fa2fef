//! Seeded adaptive RANSAC shared by the matrix estimators.

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::DegenerateTransform;
use crate::types::Point;

/// A model that can be fitted from a minimal sample and refitted on a
/// consensus set.
pub(crate) trait RansacModel: Sized {
    /// Correspondences in a minimal sample.
    const SAMPLE_SIZE: usize;

    /// Fit from exactly [`SAMPLE_SIZE`](Self::SAMPLE_SIZE) points.
    /// `None` rejects the sample.
    fn fit_minimal(source: &[Point], destination: &[Point]) -> Option<Self>;

    /// Least-squares fit on any number of points.
    fn fit_all(source: &[Point], destination: &[Point]) -> Result<Self, DegenerateTransform>;

    /// Transfer error of one correspondence, in destination pixels.
    fn residual(&self, source: Point, destination: Point) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RansacParams {
    /// Inlier distance in pixels.
    pub threshold: f64,
    /// Desired probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            confidence: 0.995,
            max_iterations: 2000,
            seed: 0,
        }
    }
}

/// Iterations needed to hit `confidence` at the given inlier ratio.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
fn required_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64, cap: usize) -> usize {
    let all_inliers = inlier_ratio.powi(sample_size as i32);
    if all_inliers >= 1.0 {
        return 1;
    }
    if all_inliers <= 0.0 {
        return cap;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - all_inliers).ln();
    if needed.is_finite() && needed >= 0.0 {
        (needed.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}

/// Run RANSAC, then refit on the best consensus set.
///
/// Falls back to the best minimal-sample model when the refit fails.
pub(crate) fn fit<M: RansacModel>(
    source: &[Point],
    destination: &[Point],
    params: &RansacParams,
) -> Result<M, DegenerateTransform> {
    let n = source.len();
    if n < M::SAMPLE_SIZE {
        return Err(DegenerateTransform::TooFewPoints {
            needed: M::SAMPLE_SIZE,
            got: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(M, Vec<bool>, usize)> = None;
    let mut iterations = params.max_iterations;
    let mut iteration = 0;
    let mut sample_source = Vec::with_capacity(M::SAMPLE_SIZE);
    let mut sample_destination = Vec::with_capacity(M::SAMPLE_SIZE);

    while iteration < iterations {
        iteration += 1;

        sample_source.clear();
        sample_destination.clear();
        for i in rand::seq::index::sample(&mut rng, n, M::SAMPLE_SIZE) {
            sample_source.push(source[i]);
            sample_destination.push(destination[i]);
        }
        let Some(model) = M::fit_minimal(&sample_source, &sample_destination) else {
            continue;
        };

        let inliers: Vec<bool> = source
            .iter()
            .zip(destination)
            .map(|(&s, &d)| model.residual(s, d) < params.threshold)
            .collect();
        let count = inliers.iter().filter(|&&b| b).count();

        if best.as_ref().is_none_or(|(_, _, best_count)| count > *best_count) {
            #[allow(clippy::cast_precision_loss)]
            let ratio = count as f64 / n as f64;
            iterations = iterations.min(required_iterations(
                ratio,
                M::SAMPLE_SIZE,
                params.confidence,
                params.max_iterations,
            ));
            best = Some((model, inliers, count));
        }
    }

    let Some((model, inliers, count)) = best else {
        return Err(DegenerateTransform::NoConsensus);
    };
    log::debug!("ransac: {count}/{n} inliers after {iteration} iterations");

    if count < M::SAMPLE_SIZE {
        return Ok(model);
    }
    let (inlier_source, inlier_destination): (Vec<Point>, Vec<Point>) = source
        .iter()
        .zip(destination)
        .zip(&inliers)
        .filter(|(_, keep)| **keep)
        .map(|((&s, &d), _)| (s, d))
        .unzip();
    Ok(M::fit_all(&inlier_source, &inlier_destination).unwrap_or(model))
}
