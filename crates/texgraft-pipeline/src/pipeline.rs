//! Transplant orchestration.
//!
//! A run goes through these states:
//!
//! ```text
//! Init -> RegionsRanked -> per pair { Cleaned -> Resampled -> TransformFitted
//!      -> Warped -> Composited } -> Done
//! ```
//!
//! with two early exits: [`TransplantOutcome::Fallback`] when one side has
//! no usable region, and [`PipelineError::Cancelled`] when the caller's
//! [`Cancellation`] fires.
//!
//! Per-pair preparation (shrink, resample, fit, warp) is independent for
//! every pair and fans out over `rayon` when
//! [`PipelineConfig::parallel`] is set. Compositing is always sequential,
//! in ascending destination rank, onto one canvas, so parallel and
//! sequential runs produce identical bytes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Pixel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::composite::composite;
use crate::diagnostics::{PairReport, PairStatus, SkipReason, TransplantReport};
use crate::mask::{self, CleanOptions};
use crate::provider::{ImageRole, SegmentationProvider};
use crate::rank::{RankedRegion, rank_regions};
use crate::resample::{point_count, resample};
use crate::transform;
use crate::types::{Detection, Dimensions, PipelineConfig, PipelineError};
use crate::warp::{elastic_grid_size, warp};

/// An owned image with pixel type `P`.
pub type Canvas<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// Polled between pipeline steps; returning `true` aborts the run.
pub trait Cancellation {
    /// Whether the caller has asked to stop.
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// A [`Cancellation`] that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

fn check_cancelled<C: Cancellation + ?Sized>(cancel: &C) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        log::info!("transplant cancelled");
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// Why a run returned the destination unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No region on `side` survived the confidence filter and cleaning.
    NoRegions {
        /// The side without regions.
        side: ImageRole,
    },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRegions { side } => write!(f, "no {side} regions detected"),
        }
    }
}

/// Result of a transplant run that did not fail.
#[derive(Debug, Clone)]
pub enum TransplantOutcome<I> {
    /// At least one pair was attempted; see the report for which applied.
    Transplanted {
        /// The composited canvas.
        image: I,
        /// Per-pair diagnostics.
        report: TransplantReport,
    },
    /// Nothing to pair; `image` is the destination, unmodified.
    Fallback {
        /// Copy of the destination image.
        image: I,
        /// Which side had no regions.
        reason: FallbackReason,
    },
}

impl<I> TransplantOutcome<I> {
    /// The output image, whichever way the run ended.
    #[must_use]
    pub const fn image(&self) -> &I {
        match self {
            Self::Transplanted { image, .. } | Self::Fallback { image, .. } => image,
        }
    }

    /// Consume the outcome, keeping only the image.
    #[must_use]
    pub fn into_image(self) -> I {
        match self {
            Self::Transplanted { image, .. } | Self::Fallback { image, .. } => image,
        }
    }

    /// Diagnostics, if any pair was attempted.
    #[must_use]
    pub const fn report(&self) -> Option<&TransplantReport> {
        match self {
            Self::Transplanted { report, .. } => Some(report),
            Self::Fallback { .. } => None,
        }
    }

    /// Returns `true` for [`TransplantOutcome::Fallback`].
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Convert the image, keeping everything else.
    pub fn map<J>(self, f: impl FnOnce(I) -> J) -> TransplantOutcome<J> {
        match self {
            Self::Transplanted { image, report } => TransplantOutcome::Transplanted {
                image: f(image),
                report,
            },
            Self::Fallback { image, reason } => TransplantOutcome::Fallback {
                image: f(image),
                reason,
            },
        }
    }
}

/// Transplant texture from `source` onto `destination`.
///
/// See [`transplant_with_cancel`].
///
/// # Errors
///
/// As [`transplant_with_cancel`], minus cancellation.
pub fn transplant<P>(
    source: &Canvas<P>,
    destination: &Canvas<P>,
    source_detections: &[Detection],
    destination_detections: &[Detection],
    config: &PipelineConfig,
) -> Result<TransplantOutcome<Canvas<P>>, PipelineError>
where
    P: Pixel + Send + Sync,
    P::Subpixel: Send + Sync,
{
    transplant_with_cancel(
        source,
        destination,
        source_detections,
        destination_detections,
        config,
        &NeverCancel,
    )
}

/// Transplant texture from `source` onto `destination`, polling `cancel`
/// before ranking, before pair preparation, and before each composite.
///
/// Destination region `i` (by descending area, up to
/// `config.max_instances`) receives source region `i % n_source`.
///
/// # Errors
///
/// - [`PipelineError::InvalidConfig`] for out-of-range configuration.
/// - [`PipelineError::InvalidInput`] for an empty image or a detection
///   whose mask size differs from its image.
/// - [`PipelineError::Cancelled`] when `cancel` fires; no image is
///   returned.
pub fn transplant_with_cancel<P, C>(
    source: &Canvas<P>,
    destination: &Canvas<P>,
    source_detections: &[Detection],
    destination_detections: &[Detection],
    config: &PipelineConfig,
    cancel: &C,
) -> Result<TransplantOutcome<Canvas<P>>, PipelineError>
where
    P: Pixel + Send + Sync,
    P::Subpixel: Send + Sync,
    C: Cancellation + ?Sized,
{
    let started = Instant::now();
    config.validate()?;
    validate_inputs(ImageRole::Source, Dimensions::of(source), source_detections)?;
    validate_inputs(
        ImageRole::Destination,
        Dimensions::of(destination),
        destination_detections,
    )?;
    check_cancelled(cancel)?;

    // Init -> RegionsRanked
    let ranking_started = Instant::now();
    let source_regions = rank_regions(
        source_detections,
        config.conf_threshold_src,
        &CleanOptions {
            blur_radius: config.blur_radius,
            shrink_factor: 0.0,
            inscribed_circle: config.source_inscribed_circle,
        },
    );
    let destination_regions = rank_regions(
        destination_detections,
        config.conf_threshold_dst,
        &CleanOptions {
            blur_radius: config.blur_radius,
            shrink_factor: 0.0,
            inscribed_circle: false,
        },
    );
    let ranking_duration = ranking_started.elapsed();
    log::debug!(
        "ranked {} source and {} destination regions in {ranking_duration:?}",
        source_regions.len(),
        destination_regions.len(),
    );

    for (side, regions) in [
        (ImageRole::Destination, &destination_regions),
        (ImageRole::Source, &source_regions),
    ] {
        if regions.is_empty() {
            let reason = FallbackReason::NoRegions { side };
            log::info!("{reason}; returning destination unchanged");
            return Ok(TransplantOutcome::Fallback {
                image: destination.clone(),
                reason,
            });
        }
    }

    check_cancelled(cancel)?;

    let canvas_dims = Dimensions::of(destination);
    let jobs: Vec<PairJob> = (0..destination_regions.len().min(config.max_instances))
        .map(|destination_rank| PairJob {
            destination_rank,
            source_rank: destination_rank % source_regions.len(),
        })
        .collect();
    let prepare = |job: &PairJob| {
        prepare_pair(
            source,
            &source_regions[job.source_rank],
            &destination_regions[job.destination_rank],
            canvas_dims,
            config,
        )
    };
    let prepared: Vec<PreparedPair<P>> = if config.parallel {
        jobs.par_iter().map(prepare).collect()
    } else {
        jobs.iter().map(prepare).collect()
    };

    let mut canvas = destination.clone();
    let mut pairs = Vec::with_capacity(jobs.len());
    for (job, pair) in jobs.iter().zip(prepared) {
        check_cancelled(cancel)?;
        let status = match pair.warped {
            Ok(warped) => {
                composite(
                    &mut canvas,
                    &warped,
                    &destination_regions[job.destination_rank].mask,
                    config.alpha,
                )?;
                log::debug!(
                    "pair dst#{} <- src#{}: composited",
                    job.destination_rank,
                    job.source_rank
                );
                PairStatus::Applied
            }
            Err(reason) => {
                log::warn!(
                    "pair dst#{} <- src#{} skipped: {reason}",
                    job.destination_rank,
                    job.source_rank
                );
                PairStatus::Skipped { reason }
            }
        };
        pairs.push(PairReport {
            destination_rank: job.destination_rank,
            source_rank: job.source_rank,
            point_count: pair.point_count,
            status,
            prepare_duration: pair.duration,
        });
    }

    let report = TransplantReport {
        method: config.warp_method,
        canvas: canvas_dims,
        source_regions: source_regions.len(),
        destination_regions: destination_regions.len(),
        pairs,
        ranking_duration,
        total_duration: started.elapsed(),
    };
    log::info!(
        "transplant done: {} applied, {} skipped, {} method, {:.1}ms",
        report.applied_count(),
        report.skipped_count(),
        report.method,
        report.total_duration.as_secs_f64() * 1000.0,
    );
    Ok(TransplantOutcome::Transplanted {
        image: canvas,
        report,
    })
}

/// Reject empty images and masks that do not match their image.
fn validate_inputs(
    role: ImageRole,
    image: Dimensions,
    detections: &[Detection],
) -> Result<(), PipelineError> {
    if image.is_empty() {
        return Err(PipelineError::InvalidInput(format!(
            "{role} image is empty ({image})"
        )));
    }
    if let Some((i, d)) = detections
        .iter()
        .enumerate()
        .find(|(_, d)| d.dimensions() != image)
    {
        return Err(PipelineError::InvalidInput(format!(
            "{role} detection {i} is {}, image is {image}",
            d.dimensions()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct PairJob {
    destination_rank: usize,
    source_rank: usize,
}

struct PreparedPair<P: Pixel> {
    point_count: usize,
    duration: Duration,
    warped: Result<Canvas<P>, SkipReason>,
}

/// Cleaned -> Resampled -> TransformFitted -> Warped, for one pair.
fn prepare_pair<P>(
    source: &Canvas<P>,
    source_region: &RankedRegion,
    destination_region: &RankedRegion,
    canvas: Dimensions,
    config: &PipelineConfig,
) -> PreparedPair<P>
where
    P: Pixel,
{
    let started = Instant::now();
    let count = point_count(config.warp_strength);
    let warped = fit_and_warp(source, source_region, destination_region, canvas, count, config);
    PreparedPair {
        point_count: count,
        duration: started.elapsed(),
        warped,
    }
}

fn fit_and_warp<P>(
    source: &Canvas<P>,
    source_region: &RankedRegion,
    destination_region: &RankedRegion,
    canvas: Dimensions,
    count: usize,
    config: &PipelineConfig,
) -> Result<Canvas<P>, SkipReason>
where
    P: Pixel,
{
    let source_contour = if config.shrink_factor > 0.0 {
        let shrunk = mask::shrink(&source_region.mask, config.shrink_factor);
        mask::largest_outer_contour(&shrunk)
            .filter(|c| c.len() >= 3)
            .ok_or(SkipReason::EmptySourceRegion)?
    } else {
        source_region.contour.clone()
    };

    let source_points = resample(&source_contour, count);
    let destination_points = resample(&destination_region.contour, count);
    let model = transform::estimate(
        source_points.points(),
        destination_points.points(),
        config.warp_method,
        config.ransac_seed,
    )
    .map_err(SkipReason::Degenerate)?;
    log::debug!("fitted {} model on {count} points", model.method());

    Ok(warp(
        source,
        &model,
        canvas,
        elastic_grid_size(config.warp_strength),
    ))
}

/// [`transplant`] on dynamically typed images.
///
/// # Errors
///
/// As [`transplant_with_cancel`].
pub fn transplant_dynamic(
    source: &DynamicImage,
    destination: &DynamicImage,
    source_detections: &[Detection],
    destination_detections: &[Detection],
    config: &PipelineConfig,
) -> Result<TransplantOutcome<DynamicImage>, PipelineError> {
    transplant_dynamic_with_cancel(
        source,
        destination,
        source_detections,
        destination_detections,
        config,
        &NeverCancel,
    )
}

/// [`transplant_with_cancel`] on dynamically typed images.
///
/// The source is converted to the destination's pixel type and the output
/// keeps the destination's color type. Every 8-bit, 16-bit and 32-bit
/// float layout `image` defines is processed at its native precision.
/// Color types added to `image` later go through 8-bit RGBA; such a run
/// returns the destination untouched on fallback and an RGBA8 image
/// otherwise.
///
/// # Errors
///
/// As [`transplant_with_cancel`].
pub fn transplant_dynamic_with_cancel<C>(
    source: &DynamicImage,
    destination: &DynamicImage,
    source_detections: &[Detection],
    destination_detections: &[Detection],
    config: &PipelineConfig,
    cancel: &C,
) -> Result<TransplantOutcome<DynamicImage>, PipelineError>
where
    C: Cancellation + ?Sized,
{
    let (sd, dd) = (source_detections, destination_detections);
    match destination {
        DynamicImage::ImageLuma8(dst) => {
            transplant_with_cancel(&source.to_luma8(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageLuma8))
        }
        DynamicImage::ImageLumaA8(dst) => {
            transplant_with_cancel(&source.to_luma_alpha8(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageLumaA8))
        }
        DynamicImage::ImageRgb8(dst) => {
            transplant_with_cancel(&source.to_rgb8(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageRgb8))
        }
        DynamicImage::ImageRgba8(dst) => {
            transplant_with_cancel(&source.to_rgba8(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageRgba8))
        }
        DynamicImage::ImageLuma16(dst) => {
            transplant_with_cancel(&source.to_luma16(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageLuma16))
        }
        DynamicImage::ImageLumaA16(dst) => {
            transplant_with_cancel(&source.to_luma_alpha16(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageLumaA16))
        }
        DynamicImage::ImageRgb16(dst) => {
            transplant_with_cancel(&source.to_rgb16(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageRgb16))
        }
        DynamicImage::ImageRgba16(dst) => {
            transplant_with_cancel(&source.to_rgba16(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageRgba16))
        }
        DynamicImage::ImageRgb32F(dst) => {
            transplant_with_cancel(&source.to_rgb32f(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageRgb32F))
        }
        DynamicImage::ImageRgba32F(dst) => {
            transplant_with_cancel(&source.to_rgba32f(), dst, sd, dd, config, cancel)
                .map(|o| o.map(DynamicImage::ImageRgba32F))
        }
        other => {
            log::warn!("processing {:?} destination as 8-bit RGBA", other.color());
            let outcome =
                transplant_with_cancel(&source.to_rgba8(), &other.to_rgba8(), sd, dd, config, cancel)?;
            Ok(match outcome {
                TransplantOutcome::Fallback { reason, .. } => TransplantOutcome::Fallback {
                    image: other.clone(),
                    reason,
                },
                transplanted => transplanted.map(DynamicImage::ImageRgba8),
            })
        }
    }
}

/// Segment both images with `provider`, then run
/// [`transplant_dynamic_with_cancel`].
///
/// # Errors
///
/// [`PipelineError::Provider`] (or whatever the provider returns) when
/// segmentation fails, otherwise as [`transplant_with_cancel`].
pub fn transplant_with_provider<S, C>(
    source: &DynamicImage,
    destination: &DynamicImage,
    provider: &S,
    config: &PipelineConfig,
    cancel: &C,
) -> Result<TransplantOutcome<DynamicImage>, PipelineError>
where
    S: SegmentationProvider + ?Sized,
    C: Cancellation + ?Sized,
{
    // Fail on bad configuration before the provider does any work.
    config.validate()?;
    check_cancelled(cancel)?;
    let started = Instant::now();
    let source_detections = provider.segment(source, ImageRole::Source)?;
    let destination_detections = provider.segment(destination, ImageRole::Destination)?;
    log::debug!(
        "segmentation: {} source, {} destination detections in {:?}",
        source_detections.len(),
        destination_detections.len(),
        started.elapsed(),
    );
    transplant_dynamic_with_cancel(
        source,
        destination,
        &source_detections,
        &destination_detections,
        config,
        cancel,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma, Rgb, RgbImage};

    use super::*;
    use crate::types::WarpMethod;

    fn rect_detection(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Detection {
        Detection::from_binary(
            &GrayImage::from_fn(w, h, |x, y| {
                Luma([u8::from((x0..=x1).contains(&x) && (y0..=y1).contains(&y))])
            }),
            0.9,
        )
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            blur_radius: 0,
            source_inscribed_circle: false,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn fallback_names_the_empty_side() {
        let img = RgbImage::from_pixel(20, 20, Rgb([1, 2, 3]));
        let region = rect_detection(20, 20, 4, 4, 15, 15);

        let out = transplant(&img, &img, &[region.clone()], &[], &config()).unwrap();
        assert!(matches!(
            out,
            TransplantOutcome::Fallback {
                reason: FallbackReason::NoRegions {
                    side: ImageRole::Destination
                },
                ..
            }
        ));

        let out = transplant(&img, &img, &[], &[region], &config()).unwrap();
        assert!(out.is_fallback());
        assert!(out.report().is_none());
        assert_eq!(out.into_image(), img);
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let img = RgbImage::new(4, 4);
        let bad = PipelineConfig {
            alpha: 2.0,
            ..config()
        };
        let err = transplant(&img, &img, &[], &[], &bad).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn empty_image_is_invalid_input() {
        let empty = RgbImage::new(0, 0);
        let img = RgbImage::new(4, 4);
        let err = transplant(&empty, &img, &[], &[], &config()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(ref m) if m.contains("source")));
    }

    #[test]
    fn pairs_cycle_through_source_regions() {
        let src = RgbImage::from_pixel(40, 40, Rgb([200, 10, 10]));
        let dst = RgbImage::from_pixel(40, 40, Rgb([10, 10, 200]));
        let source = vec![rect_detection(40, 40, 5, 5, 30, 30)];
        let destination = vec![
            rect_detection(40, 40, 2, 2, 17, 17),
            rect_detection(40, 40, 22, 22, 35, 35),
            rect_detection(40, 40, 2, 22, 12, 32),
        ];
        let cfg = PipelineConfig {
            max_instances: 2,
            warp_method: WarpMethod::Affine,
            ..config()
        };
        let out = transplant(&src, &dst, &source, &destination, &cfg).unwrap();
        let report = out.report().unwrap();
        let ranks: Vec<(usize, usize)> = report
            .pairs
            .iter()
            .map(|p| (p.destination_rank, p.source_rank))
            .collect();
        assert_eq!(ranks, vec![(0, 0), (1, 0)]);
        assert_eq!(report.destination_regions, 3);
    }

    #[test]
    fn cancelled_before_start() {
        let img = RgbImage::new(8, 8);
        let flag = AtomicBool::new(true);
        let err = transplant_with_cancel(&img, &img, &[], &[], &config(), &flag).unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    fn gradient16(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageLuma16(image::ImageBuffer::from_fn(w, h, |x, y| {
            Luma([(1000 + 7 * x + 13 * y) as u16])
        }))
    }

    #[test]
    fn dynamic_keeps_destination_color_type() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([90, 90, 90])));
        let dst = gradient16(16, 16);
        let det = vec![rect_detection(16, 16, 3, 3, 12, 12)];
        let out = transplant_dynamic(&src, &dst, &det, &det, &config()).unwrap();
        assert_eq!(out.image().color(), image::ColorType::L16);
        assert_eq!(out.image().width(), 16);
    }

    #[test]
    fn sixteen_bit_fallback_is_byte_identical() {
        let src = DynamicImage::new_rgb8(16, 16);
        let dst = gradient16(16, 16);
        let region = rect_detection(16, 16, 3, 3, 12, 12);
        let out = transplant_dynamic(&src, &dst, &[region], &[], &config()).unwrap();
        assert!(out.is_fallback());
        assert_eq!(out.into_image(), dst);
    }

    #[test]
    fn sixteen_bit_alpha_zero_is_byte_identical() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([250, 5, 5])));
        let dst = gradient16(16, 16);
        let det = vec![rect_detection(16, 16, 3, 3, 12, 12)];
        let cfg = PipelineConfig {
            alpha: 0.0,
            ..config()
        };
        let out = transplant_dynamic(&src, &dst, &det, &det, &cfg).unwrap();
        assert_eq!(out.report().unwrap().applied_count(), 1);
        assert_eq!(out.into_image(), dst);
    }

    #[test]
    fn sixteen_bit_pixels_outside_mask_are_untouched() {
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([250, 250, 250])));
        let dst = gradient16(16, 16);
        let det = vec![rect_detection(16, 16, 3, 3, 12, 12)];
        let cfg = PipelineConfig {
            alpha: 1.0,
            ..config()
        };
        let out = transplant_dynamic(&src, &dst, &det, &det, &cfg).unwrap();
        let (out, dst) = (out.into_image().to_luma16(), dst.to_luma16());
        for (x, y, pixel) in out.enumerate_pixels() {
            let inside = (3..=12).contains(&x) && (3..=12).contains(&y);
            if inside {
                assert_eq!(pixel.0[0], 250 * 257, "at ({x},{y})");
            } else {
                assert_eq!(pixel, dst.get_pixel(x, y), "at ({x},{y})");
            }
        }
    }

    #[test]
    fn float_destination_is_processed_natively() {
        let src = DynamicImage::ImageRgb32F(image::Rgb32FImage::from_pixel(16, 16, Rgb([0.5, 0.5, 0.5])));
        let dst = DynamicImage::ImageRgb32F(image::Rgb32FImage::from_fn(16, 16, |x, y| {
            Rgb([x as f32 / 100.0, y as f32 / 100.0, 0.123_456])
        }));
        let det = vec![rect_detection(16, 16, 3, 3, 12, 12)];
        let cfg = PipelineConfig {
            alpha: 0.0,
            ..config()
        };
        let out = transplant_dynamic(&src, &dst, &det, &det, &cfg).unwrap();
        assert_eq!(out.into_image(), dst);
    }

    #[test]
    fn provider_mask_size_mismatch_is_invalid_input() {
        let img = DynamicImage::new_rgb8(16, 16);
        let provider = crate::provider::PrecomputedMasks::new(
            vec![rect_detection(8, 16, 1, 1, 6, 6)],
            vec![rect_detection(16, 16, 3, 3, 12, 12)],
        );
        let err =
            transplant_with_provider(&img, &img, &provider, &config(), &NeverCancel).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(ref m) if m.contains("8x16")));
    }

    #[test]
    fn provider_errors_propagate() {
        let img = DynamicImage::new_rgb8(4, 4);
        let failing = |_: &DynamicImage, _: ImageRole| -> Result<Vec<Detection>, PipelineError> {
            Err(PipelineError::Provider("offline".to_string()))
        };
        let err =
            transplant_with_provider(&img, &img, &failing, &config(), &NeverCancel).unwrap_err();
        assert!(matches!(err, PipelineError::Provider(_)));
    }
}
