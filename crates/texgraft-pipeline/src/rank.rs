//! Region ranking: confidence filter, cleaning, and area ordering.

use crate::mask::{self, CleanOptions, Mask};
use crate::types::{Contour, Detection, Dimensions};

/// A cleaned detection ready for pairing.
#[derive(Debug, Clone)]
pub struct RankedRegion {
    /// Cleaned single-component mask.
    pub mask: Mask,
    /// Detector confidence of the originating detection.
    pub confidence: f32,
    /// Area enclosed by [`contour`](Self::contour), in square pixels.
    pub area: f64,
    /// Outer boundary of [`mask`](Self::mask).
    pub contour: Contour,
    /// Position of the originating detection in the detector output.
    pub detection_index: usize,
}

/// Filter, clean and sort detections.
///
/// Detections with `confidence < threshold` are dropped. Each remaining
/// mask is cleaned with `options`; masks whose cleaned boundary has fewer
/// than three points are dropped. The result is ordered by enclosed area,
/// largest first, with ties left in detection order.
#[must_use = "returns the ranked regions"]
pub fn rank_regions(
    detections: &[Detection],
    threshold: f32,
    options: &CleanOptions,
) -> Vec<RankedRegion> {
    let mut regions: Vec<RankedRegion> = detections
        .iter()
        .enumerate()
        .filter(|(_, d)| d.confidence >= threshold)
        .filter_map(|(detection_index, d)| {
            let cleaned = mask::clean(&d.mask, options);
            let contour = mask::largest_outer_contour(&cleaned)?;
            if contour.len() < 3 {
                log::debug!(
                    "detection {detection_index}: boundary has {} point(s), dropped",
                    contour.len()
                );
                return None;
            }
            Some(RankedRegion {
                area: contour.area(),
                mask: cleaned,
                confidence: d.confidence,
                contour,
                detection_index,
            })
        })
        .collect();

    regions.sort_by(|a, b| b.area.total_cmp(&a.area));
    regions
}

/// Union of every confident detection, binarized at `p > 0.5`.
///
/// Detections whose raster does not match `dimensions` are skipped.
#[must_use]
pub fn combine_masks(detections: &[Detection], threshold: f32, dimensions: Dimensions) -> Mask {
    let mut combined = Mask::empty(dimensions);
    for detection in detections.iter().filter(|d| d.confidence >= threshold) {
        if detection.dimensions() != dimensions {
            log::warn!(
                "skipping {} detection mask while combining into {dimensions}",
                detection.dimensions()
            );
            continue;
        }
        combined.union_with(&Mask::from_probability(&detection.mask));
    }
    combined
}
