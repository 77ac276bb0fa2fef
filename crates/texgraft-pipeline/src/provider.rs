//! Segmentation provider seam.
//!
//! The pipeline never runs a detector itself. Callers construct a
//! [`SegmentationProvider`] once and pass it by reference into every run.

use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::types::{Detection, PipelineError};

/// Which side of a transplant an image plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    /// The image texture is taken from.
    Source,
    /// The image texture is placed onto.
    Destination,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::Destination => "destination",
        })
    }
}

/// Turns an image into region detections.
///
/// Each returned [`Detection`] must have the same dimensions as `image`.
pub trait SegmentationProvider {
    /// Detect regions in `image`.
    ///
    /// # Errors
    ///
    /// Implementations report detector failures as
    /// [`PipelineError::Provider`] and unusable inputs as
    /// [`PipelineError::InvalidInput`].
    fn segment(&self, image: &DynamicImage, role: ImageRole)
    -> Result<Vec<Detection>, PipelineError>;
}

impl<F> SegmentationProvider for F
where
    F: Fn(&DynamicImage, ImageRole) -> Result<Vec<Detection>, PipelineError>,
{
    fn segment(
        &self,
        image: &DynamicImage,
        role: ImageRole,
    ) -> Result<Vec<Detection>, PipelineError> {
        self(image, role)
    }
}

/// Serves detections computed ahead of time, one list per role.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedMasks {
    source: Vec<Detection>,
    destination: Vec<Detection>,
}

impl PrecomputedMasks {
    /// Provider returning `source` for the source image and `destination`
    /// for the destination image.
    #[must_use]
    pub const fn new(source: Vec<Detection>, destination: Vec<Detection>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Detections served for `role`.
    #[must_use]
    pub fn detections(&self, role: ImageRole) -> &[Detection] {
        match role {
            ImageRole::Source => &self.source,
            ImageRole::Destination => &self.destination,
        }
    }
}

impl SegmentationProvider for PrecomputedMasks {
    fn segment(
        &self,
        image: &DynamicImage,
        role: ImageRole,
    ) -> Result<Vec<Detection>, PipelineError> {
        let (width, height) = (image.width(), image.height());
        let detections = self.detections(role);
        if let Some(bad) = detections
            .iter()
            .find(|d| d.mask.dimensions() != (width, height))
        {
            return Err(PipelineError::InvalidInput(format!(
                "precomputed {role} mask is {}, image is {width}x{height}",
                bad.dimensions()
            )));
        }
        Ok(detections.to_vec())
    }
}
