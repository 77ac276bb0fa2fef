//! Backward warping of the source image onto the destination canvas.
//!
//! Every destination pixel is mapped back into the source through the
//! fitted model and bilinearly sampled there. Pixels whose preimage falls
//! outside the source stay at the zero pixel.
//!
//! Any `image` pixel type works: integer channels are rounded and clamped
//! to their range, float channels are written as computed.

use image::{ImageBuffer, Pixel, Primitive};
use num_traits::{NumCast, ToPrimitive};

use crate::transform::{ThinPlateSpline, TransformModel};
use crate::types::{Dimensions, Point};

/// Minimum number of elastic grid nodes per axis.
pub const MIN_GRID_SIZE: usize = 10;

/// Elastic grid nodes per axis at full warp strength.
pub const GRID_SIZE_AT_FULL_STRENGTH: f64 = 30.0;

/// Nodes per axis of the coarse elastic evaluation grid:
/// `max(10, round(30 * strength))`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn elastic_grid_size(strength: f64) -> usize {
    let n = (GRID_SIZE_AT_FULL_STRENGTH * strength).round();
    if n.is_finite() && n > 0.0 {
        (n as usize).max(MIN_GRID_SIZE)
    } else {
        MIN_GRID_SIZE
    }
}

/// Warp `source` onto a canvas of size `target`.
///
/// `grid_size` only affects [`TransformModel::Elastic`], which is
/// evaluated on a `grid_size x grid_size` lattice spanning the canvas
/// (corners included) and bilinearly interpolated in between.
#[must_use = "returns the warped image"]
pub fn warp<P>(
    source: &ImageBuffer<P, Vec<P::Subpixel>>,
    model: &TransformModel,
    target: Dimensions,
    grid_size: usize,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let mut out = ImageBuffer::<P, Vec<P::Subpixel>>::new(target.width, target.height);
    if target.is_empty() {
        return out;
    }

    match model {
        TransformModel::Elastic(tps) => {
            let grid = CoordinateGrid::evaluate(tps, target, grid_size);
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                let p = grid.interpolate(x, y);
                if let Some(sampled) = sample_bilinear(source, p.x, p.y) {
                    *pixel = sampled;
                }
            }
        }
        TransformModel::Projective(_) | TransformModel::Affine(_) => {
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                let Some(p) = model.source_position(Point::new(<f64 as From<_>>::from(x), <f64 as From<_>>::from(y))) else {
                    continue;
                };
                if let Some(sampled) = sample_bilinear(source, p.x, p.y) {
                    *pixel = sampled;
                }
            }
        }
    }
    out
}

/// Spline values on a coarse lattice, row-major.
struct CoordinateGrid {
    nodes_x: usize,
    nodes_y: usize,
    /// Pixel distance between neighbouring nodes along each axis.
    step_x: f64,
    step_y: f64,
    values: Vec<Point>,
}

impl CoordinateGrid {
    #[allow(clippy::cast_precision_loss)]
    fn evaluate(tps: &ThinPlateSpline, target: Dimensions, grid_size: usize) -> Self {
        let nodes_x = grid_size.max(2);
        let nodes_y = grid_size.max(2);
        let step_x = <f64 as From<_>>::from(target.width - 1) / (nodes_x - 1) as f64;
        let step_y = <f64 as From<_>>::from(target.height - 1) / (nodes_y - 1) as f64;
        let mut values = Vec::with_capacity(nodes_x * nodes_y);
        for j in 0..nodes_y {
            for i in 0..nodes_x {
                values.push(tps.evaluate(Point::new(i as f64 * step_x, j as f64 * step_y)));
            }
        }
        Self {
            nodes_x,
            nodes_y,
            step_x,
            step_y,
            values,
        }
    }

    /// Split a pixel coordinate into a cell index and a fraction within it.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn locate(coord: u32, step: f64, nodes: usize) -> (usize, f64) {
        if step <= 0.0 {
            return (0, 0.0);
        }
        let u = <f64 as From<_>>::from(coord) / step;
        let cell = (u.floor() as usize).min(nodes - 2);
        (cell, u - cell as f64)
    }

    fn interpolate(&self, x: u32, y: u32) -> Point {
        let (i, fx) = Self::locate(x, self.step_x, self.nodes_x);
        let (j, fy) = Self::locate(y, self.step_y, self.nodes_y);
        let at = |i: usize, j: usize| self.values[j * self.nodes_x + i];
        let top = at(i, j).lerp(at(i + 1, j), fx);
        let bottom = at(i, j + 1).lerp(at(i + 1, j + 1), fx);
        top.lerp(bottom, fy)
    }
}

/// Bilinearly sample `image` at `(x, y)`, pixel centers on integers.
///
/// Returns `None` outside `(-0.5, w - 0.5) x (-0.5, h - 0.5)`; inside that
/// band, neighbours are clamped to the border. Integer channels are
/// rounded.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::many_single_char_names
)]
pub fn sample_bilinear<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, x: f64, y: f64) -> Option<P>
where
    P: Pixel,
{
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let (wf, hf) = (<f64 as From<_>>::from(w), <f64 as From<_>>::from(h));
    if !(x > -0.5 && x < wf - 0.5 && y > -0.5 && y < hf - 0.5) {
        return None;
    }

    let x = x.clamp(0.0, wf - 1.0);
    let y = y.clamp(0.0, hf - 1.0);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - <f64 as From<_>>::from(x0);
    let fy = y - <f64 as From<_>>::from(y0);

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let channel = |p: &P, c: usize| p.channels()[c].to_f64().unwrap_or(0.0);
    let mut out = *p00;
    for (c, value) in out.channels_mut().iter_mut().enumerate() {
        let top = fx.mul_add(channel(p10, c) - channel(p00, c), channel(p00, c));
        let bottom = fx.mul_add(channel(p11, c) - channel(p01, c), channel(p01, c));
        *value = channel_from_f64(fy.mul_add(bottom - top, top));
    }
    Some(out)
}

/// Convert a computed channel value to `T`.
///
/// Types whose nominal maximum exceeds `1` are integer channels: the value
/// is rounded and clamped to `[DEFAULT_MIN_VALUE, DEFAULT_MAX_VALUE]`.
/// Float channels are cast unchanged.
pub(crate) fn channel_from_f64<T: Primitive>(value: f64) -> T {
    let max = T::DEFAULT_MAX_VALUE.to_f64().unwrap_or(f64::MAX);
    let value = if max > 1.0 {
        let min = T::DEFAULT_MIN_VALUE.to_f64().unwrap_or(0.0);
        value.round().clamp(min, max)
    } else {
        value
    };
    <T as NumCast>::from(value).unwrap_or(T::DEFAULT_MIN_VALUE)
}
