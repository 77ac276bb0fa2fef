//! texgraft-pipeline: mask-guided texture transplant engine (sans-IO).
//!
//! Moves the texture inside detected regions of a source image onto the
//! corresponding regions of a destination image, bending it to the
//! destination region's shape:
//!
//! clean masks -> rank regions -> pair by rank -> resample boundaries ->
//! fit transform -> warp source -> alpha-composite inside the mask.
//!
//! This crate has **no I/O dependencies** -- it operates on decoded
//! `image` buffers and detections supplied by the caller (directly or
//! through a [`SegmentationProvider`]). File handling lives in
//! `texgraft-cli`.
//!
//! ```rust
//! # use image::{GrayImage, Luma, Rgb, RgbImage};
//! # use texgraft_pipeline::{Detection, PipelineConfig, PipelineError, transplant};
//! # fn run() -> Result<(), PipelineError> {
//! let source = RgbImage::from_pixel(64, 64, Rgb([200, 30, 30]));
//! let destination = RgbImage::from_pixel(64, 64, Rgb([30, 30, 200]));
//! let square = GrayImage::from_fn(64, 64, |x, y| {
//!     Luma([u8::from((16..48).contains(&x) && (16..48).contains(&y))])
//! });
//! let regions = [Detection::from_binary(&square, 0.9)];
//!
//! let outcome = transplant(&source, &destination, &regions, &regions, &PipelineConfig::default())?;
//! let result = outcome.into_image();
//! assert_eq!(result.dimensions(), destination.dimensions());
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

pub mod blur;
pub mod composite;
pub mod diagnostics;
pub mod mask;
pub mod pipeline;
pub mod provider;
pub mod rank;
pub mod resample;
pub mod transform;
pub mod types;
pub mod warp;

pub use composite::composite;
pub use diagnostics::{PairReport, PairStatus, SkipReason, TransplantReport};
pub use mask::{CleanOptions, Mask};
pub use pipeline::{
    Canvas, Cancellation, FallbackReason, NeverCancel, TransplantOutcome, transplant,
    transplant_dynamic, transplant_dynamic_with_cancel, transplant_with_cancel,
    transplant_with_provider,
};
pub use provider::{ImageRole, PrecomputedMasks, SegmentationProvider};
pub use rank::{RankedRegion, combine_masks, rank_regions};
pub use resample::{point_count, resample};
pub use transform::{DegenerateTransform, TransformModel, estimate};
pub use types::{
    Contour, Detection, Dimensions, GrayImage, PipelineConfig, PipelineError, Point,
    ProbabilityMask, WarpMethod,
};
pub use warp::{elastic_grid_size, warp};
