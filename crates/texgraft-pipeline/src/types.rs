//! Shared types for the texgraft transplant pipeline.

use std::fmt;
use std::str::FromStr;

use geo::{Area, Centroid, Coord, LineString, Polygon};
use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can build masks without
/// depending on `image` directly.
pub use image::GrayImage;

/// Raw per-pixel foreground probability as produced by a detector.
///
/// Values are nominally in `[0, 1]`; anything above `0.5` counts as
/// foreground once binarized.
pub type ProbabilityMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Linear interpolation: `t = 0` returns `self`, `t = 1` returns `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(t.mul_add(other.x - self.x, self.x), t.mul_add(other.y - self.y, self.y))
    }

    const fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

/// An ordered, implicitly closed polygon boundary.
///
/// The last point connects back to the first; the closing point is never
/// stored twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a contour from points as given.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Create a contour, collapsing consecutive duplicate points and a
    /// trailing copy of the first point.
    #[must_use]
    pub fn deduplicated(points: impl IntoIterator<Item = Point>) -> Self {
        let mut out: Vec<Point> = Vec::new();
        for p in points {
            if out.last() != Some(&p) {
                out.push(p);
            }
        }
        while out.len() > 1 && out.first() == out.last() {
            out.pop();
        }
        Self(out)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the contour.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the contour and returns the underlying points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    fn to_polygon(&self) -> Polygon<f64> {
        let ring: LineString<f64> = self.0.iter().map(|p| p.to_coord()).collect();
        Polygon::new(ring, vec![])
    }

    /// Unsigned enclosed area (shoelace formula).
    #[must_use]
    pub fn area(&self) -> f64 {
        if self.0.len() < 3 {
            return 0.0;
        }
        self.to_polygon().unsigned_area()
    }

    /// Area-weighted centroid, or `None` when the contour encloses no area.
    #[must_use]
    pub fn centroid(&self) -> Option<Point> {
        if self.area() <= 0.0 {
            return None;
        }
        self.to_polygon()
            .centroid()
            .map(|c| Point::new(c.x(), c.y()))
    }

    /// Move every vertex toward `center` by `factor` of its distance.
    ///
    /// `0.0` leaves the contour unchanged, `1.0` collapses it onto `center`.
    #[must_use]
    pub fn contract_toward(&self, center: Point, factor: f64) -> Self {
        Self(self.0.iter().map(|&p| p.lerp(center, factor)).collect())
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions from width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of any `image` buffer.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One region reported by a detector: a probability raster matching the
/// image it was computed on, plus the detector's confidence.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Per-pixel foreground probability.
    pub mask: ProbabilityMask,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    /// Create a detection from a probability mask.
    #[must_use]
    pub const fn new(mask: ProbabilityMask, confidence: f32) -> Self {
        Self { mask, confidence }
    }

    /// Create a detection from an 8-bit grayscale raster, mapping
    /// `value / 255` to probability.
    #[must_use]
    pub fn from_gray(mask: &GrayImage, confidence: f32) -> Self {
        let probabilities = ProbabilityMask::from_fn(mask.width(), mask.height(), |x, y| {
            Luma([f32::from(mask.get_pixel(x, y).0[0]) / 255.0])
        });
        Self::new(probabilities, confidence)
    }

    /// Create a detection from a binary raster: every non-zero pixel has
    /// probability `1.0`.
    #[must_use]
    pub fn from_binary(mask: &GrayImage, confidence: f32) -> Self {
        let probabilities = ProbabilityMask::from_fn(mask.width(), mask.height(), |x, y| {
            Luma([if mask.get_pixel(x, y).0[0] > 0 { 1.0 } else { 0.0 }])
        });
        Self::new(probabilities, confidence)
    }

    /// Dimensions of the probability raster.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.mask)
    }
}

/// Which geometric model maps the source boundary onto the destination
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum WarpMethod {
    /// 3x3 homography, allows perspective distortion.
    #[default]
    Projective,
    /// 2x3 affine map: rotation, scale, shear, translation.
    Affine,
    /// Thin-plate-spline interpolant through the boundary points.
    Elastic,
}

impl WarpMethod {
    /// Minimum number of point correspondences the method can be fitted on.
    #[must_use]
    pub const fn min_points(self) -> usize {
        match self {
            Self::Projective => 4,
            Self::Affine | Self::Elastic => 3,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Projective => "projective",
            Self::Affine => "affine",
            Self::Elastic => "elastic",
        }
    }
}

impl fmt::Display for WarpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarpMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "projective" | "homography" | "perspective" => Ok(Self::Projective),
            "affine" => Ok(Self::Affine),
            "elastic" | "thin_plate_spline" | "thin-plate-spline" | "tps" => Ok(Self::Elastic),
            _ => Err(PipelineError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for WarpMethod {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Per-request configuration for the transplant pipeline.
///
/// Immutable for the duration of one run. Call [`validate`](Self::validate)
/// (the pipeline does so on entry) to reject out-of-range values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum detector confidence for a source region to be kept.
    pub conf_threshold_src: f32,

    /// Minimum detector confidence for a destination region to be kept.
    pub conf_threshold_dst: f32,

    /// Gaussian kernel size in pixels for mask edge smoothing.
    /// `0` disables smoothing; even sizes are rounded up to the next odd.
    pub blur_radius: u32,

    /// Geometric model fitted per region pair.
    pub warp_method: WarpMethod,

    /// In `(0, 1]`. Controls how many boundary points are resampled and
    /// how dense the elastic evaluation grid is.
    pub warp_strength: f64,

    /// In `[0, 1)`. Fraction by which the source region is contracted
    /// toward its centroid before transplanting.
    pub shrink_factor: f64,

    /// In `[0, 1]`. Blend weight of transplanted content.
    pub alpha: f64,

    /// Upper bound on region pairs processed per request.
    pub max_instances: usize,

    /// Replace each source region by its largest inscribed circle, giving
    /// an artifact-free patch instead of the detector silhouette.
    pub source_inscribed_circle: bool,

    /// Fan out per-pair preparation (fit + warp) across threads.
    /// Compositing order is unaffected.
    pub parallel: bool,

    /// Seed of the RANSAC sampler. Fixed seeds make output reproducible.
    pub ransac_seed: u64,
}

impl PipelineConfig {
    /// Default source confidence threshold.
    pub const DEFAULT_CONF_THRESHOLD_SRC: f32 = 0.4;
    /// Default destination confidence threshold.
    pub const DEFAULT_CONF_THRESHOLD_DST: f32 = 0.4;
    /// Default smoothing kernel size.
    pub const DEFAULT_BLUR_RADIUS: u32 = 17;
    /// Default warp method.
    pub const DEFAULT_WARP_METHOD: WarpMethod = WarpMethod::Projective;
    /// Default warp strength.
    pub const DEFAULT_WARP_STRENGTH: f64 = 0.8;
    /// Default shrink factor.
    pub const DEFAULT_SHRINK_FACTOR: f64 = 0.0;
    /// Default blend alpha.
    pub const DEFAULT_ALPHA: f64 = 0.9;
    /// Default pair limit.
    pub const DEFAULT_MAX_INSTANCES: usize = 10;
    /// Default RANSAC seed.
    pub const DEFAULT_RANSAC_SEED: u64 = 0;

    /// Check every field against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("conf_threshold_src", self.conf_threshold_src),
            ("conf_threshold_dst", self.conf_threshold_dst),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if !(self.warp_strength > 0.0 && self.warp_strength <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "warp_strength must be in (0, 1], got {}",
                self.warp_strength
            )));
        }
        if !(0.0..1.0).contains(&self.shrink_factor) {
            return Err(PipelineError::InvalidConfig(format!(
                "shrink_factor must be in [0, 1), got {}",
                self.shrink_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(PipelineError::InvalidConfig(format!(
                "alpha must be in [0, 1], got {}",
                self.alpha
            )));
        }
        if self.max_instances == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_instances must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            conf_threshold_src: Self::DEFAULT_CONF_THRESHOLD_SRC,
            conf_threshold_dst: Self::DEFAULT_CONF_THRESHOLD_DST,
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
            warp_method: Self::DEFAULT_WARP_METHOD,
            warp_strength: Self::DEFAULT_WARP_STRENGTH,
            shrink_factor: Self::DEFAULT_SHRINK_FACTOR,
            alpha: Self::DEFAULT_ALPHA,
            max_instances: Self::DEFAULT_MAX_INSTANCES,
            source_inscribed_circle: true,
            parallel: true,
            ransac_seed: Self::DEFAULT_RANSAC_SEED,
        }
    }
}

/// Request-level failures. Any of these aborts the run and yields no image.
///
/// Recoverable conditions (no regions detected, a degenerate pair) are
/// reported through [`TransplantOutcome`](crate::TransplantOutcome) and
/// [`PairStatus`](crate::PairStatus) instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input rasters are unusable (empty, or mask/image size mismatch).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Pipeline configuration is out of range.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The configured warp method is not recognized.
    #[error("unsupported warp method: {0:?}")]
    UnsupportedMethod(String),

    /// The caller cancelled the request between region pairs.
    #[error("request cancelled")]
    Cancelled,

    /// The segmentation provider failed.
    #[error("segmentation provider failed: {0}")]
    Provider(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Point tests ---

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
        assert!((a.distance_squared(b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_lerp_endpoints_and_midpoint() {
        let a = Point::new(2.0, 4.0);
        let b = Point::new(6.0, 0.0);
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
        assert_eq!(a.lerp(b, 0.5), Point::new(4.0, 2.0));
    }

    // --- Contour tests ---

    fn square(side: f64) -> Contour {
        Contour::new(vec![
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ])
    }

    #[test]
    fn contour_area_is_unsigned() {
        let cw = square(4.0);
        let ccw = Contour::new(cw.points().iter().rev().copied().collect());
        assert!((cw.area() - 16.0).abs() < 1e-9);
        assert!((ccw.area() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn contour_centroid_of_square() {
        let c = square(4.0).centroid().unwrap();
        assert!((c.x - 2.0).abs() < 1e-9);
        assert!((c.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_contour_has_no_centroid() {
        let line = Contour::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
        ]);
        assert!(line.area().abs() < f64::EPSILON);
        assert!(line.centroid().is_none());
    }

    #[test]
    fn deduplicated_collapses_repeats_and_closing_point() {
        let c = Contour::deduplicated([
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 0.0),
        ]);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn contract_toward_centroid() {
        let sq = square(4.0);
        let center = sq.centroid().unwrap();
        let half = sq.contract_toward(center, 0.5);
        assert!((half.area() - 4.0).abs() < 1e-9);
        let none = sq.contract_toward(center, 0.0);
        assert_eq!(none, sq);
    }

    // --- WarpMethod tests ---

    #[test]
    fn warp_method_parses_aliases() {
        assert_eq!("homography".parse::<WarpMethod>().unwrap(), WarpMethod::Projective);
        assert_eq!("Affine".parse::<WarpMethod>().unwrap(), WarpMethod::Affine);
        assert_eq!(
            "thin_plate_spline".parse::<WarpMethod>().unwrap(),
            WarpMethod::Elastic
        );
    }

    #[test]
    fn warp_method_rejects_unknown() {
        let err = "swirl".parse::<WarpMethod>().unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedMethod(ref s) if s == "swirl"));
    }

    #[test]
    fn warp_method_min_points() {
        assert_eq!(WarpMethod::Projective.min_points(), 4);
        assert_eq!(WarpMethod::Affine.min_points(), 3);
        assert_eq!(WarpMethod::Elastic.min_points(), 3);
    }

    #[test]
    fn unknown_method_in_json_is_rejected() {
        let err = serde_json::from_str::<PipelineConfig>(r#"{"warp_method":"swirl"}"#).unwrap_err();
        assert!(err.to_string().contains("unsupported warp method"));
    }

    #[test]
    fn method_alias_in_json_is_accepted() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"warp_method":"homography"}"#).unwrap();
        assert_eq!(config.warp_method, WarpMethod::Projective);
    }

    // --- Detection tests ---

    #[test]
    fn detection_from_gray_scales_to_unit_range() {
        let gray = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 255 }]));
        let det = Detection::from_gray(&gray, 0.5);
        assert!(det.mask.get_pixel(0, 0).0[0].abs() < f32::EPSILON);
        assert!((det.mask.get_pixel(1, 0).0[0] - 1.0).abs() < f32::EPSILON);
        assert_eq!(det.dimensions(), Dimensions::new(2, 1));
    }

    // --- PipelineConfig tests ---

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert!((config.conf_threshold_src - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.blur_radius, 17);
        assert_eq!(config.warp_method, WarpMethod::Projective);
        assert!((config.alpha - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.max_instances, 10);
        assert!(config.source_inscribed_circle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        let cases = [
            PipelineConfig {
                warp_strength: 0.0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                shrink_factor: 1.0,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                alpha: 1.5,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                conf_threshold_dst: -0.1,
                ..PipelineConfig::default()
            },
            PipelineConfig {
                max_instances: 0,
                ..PipelineConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(PipelineError::InvalidConfig(_))),
                "expected InvalidConfig for {config:?}",
            );
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"warp_method":"elastic","alpha":0.5}"#).unwrap();
        assert_eq!(config.warp_method, WarpMethod::Elastic);
        assert!((config.alpha - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.max_instances, PipelineConfig::DEFAULT_MAX_INSTANCES);
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            warp_method: WarpMethod::Affine,
            shrink_factor: 0.25,
            parallel: false,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_display() {
        assert_eq!(PipelineError::Cancelled.to_string(), "request cancelled");
        assert_eq!(
            PipelineError::InvalidConfig("alpha".to_string()).to_string(),
            "invalid pipeline configuration: alpha",
        );
        assert_eq!(
            PipelineError::UnsupportedMethod("swirl".to_string()).to_string(),
            "unsupported warp method: \"swirl\"",
        );
    }
}
