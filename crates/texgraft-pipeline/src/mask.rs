//! Binary region masks and the mask cleaner.
//!
//! A [`Mask`] is a `0`/`1` raster with the same size as the image it
//! annotates. [`clean`] turns a raw detector probability map into a mask
//! holding exactly one connected region (or none):
//!
//! 1. optional Gaussian smoothing + re-threshold ([`crate::blur`])
//! 2. keep only the outer boundary with the largest enclosed area
//! 3. optionally replace that region by its largest inscribed circle
//! 4. optionally contract the region toward its centroid ([`shrink`])
//!
//! Degenerate input never fails: an empty probability map yields an empty
//! mask.

use image::{GrayImage, Luma};
use imageproc::contours::BorderType;
use imageproc::distance_transform::euclidean_squared_distance_transform;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};

use crate::blur;
use crate::types::{Contour, Dimensions, Point, ProbabilityMask};

/// Single-channel binary raster: `1` marks the region, `0` the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// Pixel value of foreground pixels.
    pub const FOREGROUND: u8 = 1;

    /// An all-background mask.
    #[must_use]
    pub fn empty(dimensions: Dimensions) -> Self {
        Self(GrayImage::new(dimensions.width, dimensions.height))
    }

    /// Binarize a probability map: `p > 0.5` is foreground.
    #[must_use]
    pub fn from_probability(mask: &ProbabilityMask) -> Self {
        blur::smooth_and_threshold(mask, 0).into()
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Raster dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.0)
    }

    /// Whether `(x, y)` is foreground. Out-of-bounds coordinates are not.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.0.get_pixel(x, y).0[0] != 0
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn area(&self) -> u64 {
        self.0.pixels().filter(|p| p.0[0] != 0).count() as u64
    }

    /// Returns `true` if no pixel is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.pixels().all(|p| p.0[0] == 0)
    }

    /// Borrow the underlying `0`/`1` raster.
    #[must_use]
    pub const fn as_image(&self) -> &GrayImage {
        &self.0
    }

    /// A viewable copy with foreground at 255.
    #[must_use]
    pub fn to_visual(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            Luma([if self.contains(x, y) { 255 } else { 0 }])
        })
    }

    /// Set every pixel that is foreground in `other`.
    ///
    /// Pixels of `other` outside this mask's bounds are ignored.
    pub fn union_with(&mut self, other: &Self) {
        let (w, h) = (self.width().min(other.width()), self.height().min(other.height()));
        for y in 0..h {
            for x in 0..w {
                if other.contains(x, y) {
                    self.0.put_pixel(x, y, Luma([Self::FOREGROUND]));
                }
            }
        }
    }
}

impl From<GrayImage> for Mask {
    /// Any non-zero pixel becomes foreground.
    fn from(image: GrayImage) -> Self {
        let mut image = image;
        for p in image.pixels_mut() {
            p.0[0] = u8::from(p.0[0] != 0);
        }
        Self(image)
    }
}

/// Parameters of the mask cleaner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleanOptions {
    /// Gaussian kernel size for edge smoothing; `0` disables.
    pub blur_radius: u32,
    /// Contraction toward the centroid, in `[0, 1)`; `0` disables.
    pub shrink_factor: f64,
    /// Replace the kept region with its largest inscribed circle.
    pub inscribed_circle: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            blur_radius: 0,
            shrink_factor: 0.0,
            inscribed_circle: false,
        }
    }
}

/// Clean a raw probability map into a single-region binary mask.
#[must_use = "returns the cleaned mask"]
pub fn clean(probabilities: &ProbabilityMask, options: &CleanOptions) -> Mask {
    let binary = Mask::from(blur::smooth_and_threshold(
        probabilities,
        options.blur_radius,
    ));
    let isolated = isolate_largest(&binary);
    let isolated = if options.inscribed_circle {
        inscribed_circle(&isolated)
    } else {
        isolated
    };
    shrink(&isolated, options.shrink_factor)
}

/// Outer boundaries of every top-level foreground component.
///
/// Hole borders and components nested inside holes are ignored.
#[must_use]
pub fn outer_contours(mask: &Mask) -> Vec<Contour> {
    imageproc::contours::find_contours::<i32>(mask.as_image())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            Contour::deduplicated(
                c.points
                    .into_iter()
                    .map(|p| Point::new(f64::from(p.x), f64::from(p.y))),
            )
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// The outer contour enclosing the largest area; ties keep the first one
/// found.
#[must_use]
pub fn largest_outer_contour(mask: &Mask) -> Option<Contour> {
    let mut best: Option<(f64, Contour)> = None;
    for contour in outer_contours(mask) {
        let area = contour.area();
        if best.as_ref().is_none_or(|(best_area, _)| area > *best_area) {
            best = Some((area, contour));
        }
    }
    best.map(|(_, contour)| contour)
}

/// Keep only the component with the largest outer contour, filled.
///
/// Returns the mask unchanged when it has no contour (empty mask).
#[must_use]
pub fn isolate_largest(mask: &Mask) -> Mask {
    let Some(contour) = largest_outer_contour(mask) else {
        return mask.clone();
    };
    let mut out = Mask::empty(mask.dimensions());
    fill_contour(&mut out, &contour);
    out
}

/// Replace the mask by the largest circle inside its foreground.
///
/// The center is the foreground pixel farthest from any background pixel
/// (first in row-major order on ties); the image border counts as
/// background. The radius is the largest integer strictly below that
/// distance, so the drawn disc never leaves the region.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn inscribed_circle(mask: &Mask) -> Mask {
    let (w, h) = (mask.width(), mask.height());

    // Foreground of the distance transform is our background, padded by a
    // one-pixel frame so the image border behaves like background.
    let seeds = GrayImage::from_fn(w + 2, h + 2, |x, y| {
        let inside = x >= 1 && y >= 1 && x <= w && y <= h && mask.contains(x - 1, y - 1);
        Luma([if inside { 0 } else { 255 }])
    });
    let distances = euclidean_squared_distance_transform(&seeds);

    let mut best: Option<(f64, u32, u32)> = None;
    for y in 0..h {
        for x in 0..w {
            let d = distances.get_pixel(x + 1, y + 1).0[0];
            if d > 0.0 && best.is_none_or(|(best_d, _, _)| d > best_d) {
                best = Some((d, x, y));
            }
        }
    }
    let Some((squared, cx, cy)) = best else {
        return mask.clone();
    };

    let radius = (squared.sqrt().ceil() - 1.0).max(0.0) as i32;
    let mut out = Mask::empty(mask.dimensions());
    draw_filled_circle_mut(
        &mut out.0,
        (cx as i32, cy as i32),
        radius,
        Luma([Mask::FOREGROUND]),
    );
    out
}

/// Contract every component toward its own area centroid.
///
/// Each outer contour's vertices move `factor` of the way to the
/// centroid, and the mask is rebuilt from the contracted polygons.
/// `factor <= 0` returns the mask unchanged; components enclosing no area
/// are dropped.
#[must_use]
pub fn shrink(mask: &Mask, factor: f64) -> Mask {
    if factor <= 0.0 {
        return mask.clone();
    }
    let contours = outer_contours(mask);
    if contours.is_empty() {
        return mask.clone();
    }
    let mut out = Mask::empty(mask.dimensions());
    for contour in &contours {
        let Some(center) = contour.centroid() else {
            continue;
        };
        fill_contour(&mut out, &contour.contract_toward(center, factor));
    }
    out
}

/// Rasterize a filled polygon (boundary included) into `mask`.
///
/// Vertices are rounded to the pixel grid. Polygons that collapse to
/// fewer than three distinct vertices are drawn as a point or segment.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn fill_contour(mask: &mut Mask, contour: &Contour) {
    let rounded = Contour::deduplicated(
        contour
            .points()
            .iter()
            .map(|p| Point::new(p.x.round(), p.y.round())),
    );
    let vertices: Vec<imageproc::point::Point<i32>> = rounded
        .points()
        .iter()
        .map(|p| imageproc::point::Point::new(p.x as i32, p.y as i32))
        .collect();
    let color = Luma([Mask::FOREGROUND]);

    match vertices.as_slice() {
        [] => {}
        [only] => {
            if let (Ok(x), Ok(y)) = (u32::try_from(only.x), u32::try_from(only.y))
                && x < mask.width()
                && y < mask.height()
            {
                mask.0.put_pixel(x, y, color);
            }
        }
        [a, b] => draw_line_segment_mut(
            &mut mask.0,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            color,
        ),
        _ => draw_polygon_mut(&mut mask.0, &vertices, color),
    }
}
