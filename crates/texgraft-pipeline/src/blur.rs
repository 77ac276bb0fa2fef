//! Gaussian edge smoothing for detector masks.
//!
//! Detector silhouettes are often ragged along the boundary. Blurring the
//! probability map and re-thresholding at 0.5 rounds off spurs and fills
//! pinholes before the boundary is traced.
//!
//! The smoothing strength is given as an odd kernel width in pixels, the
//! unit detector tooling usually exposes; [`kernel_sigma`] converts it to
//! a Gaussian sigma for [`imageproc::filter::gaussian_blur_f32`].

use image::{GrayImage, Luma};

use crate::types::ProbabilityMask;

/// Sigma of the Gaussian whose support matches a `kernel_size`-wide
/// kernel.
///
/// Uses the conventional `0.3 * ((k - 1) * 0.5 - 1) + 0.8`. Even sizes are
/// rounded up to the next odd size. Returns `None` for `0` (smoothing
/// disabled).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn kernel_sigma(kernel_size: u32) -> Option<f32> {
    if kernel_size == 0 {
        return None;
    }
    let k = if kernel_size % 2 == 0 {
        kernel_size + 1
    } else {
        kernel_size
    };
    let sigma = 0.3f32.mul_add((k as f32 - 1.0).mul_add(0.5, -1.0), 0.8);
    Some(sigma.max(f32::EPSILON))
}

/// Apply Gaussian blur to a grayscale image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Quantize a probability map to 8 bits (`p * 255`, clamped).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize(mask: &ProbabilityMask) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let p = mask.get_pixel(x, y).0[0];
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        Luma([(p * 255.0).round() as u8])
    })
}

/// Smooth a probability map and re-binarize it at 0.5.
///
/// Returns a `0`/`1` raster. With `kernel_size == 0` this is a plain
/// threshold.
#[must_use = "returns the smoothed binary raster"]
pub fn smooth_and_threshold(mask: &ProbabilityMask, kernel_size: u32) -> GrayImage {
    let Some(sigma) = kernel_sigma(kernel_size) else {
        return GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            Luma([u8::from(mask.get_pixel(x, y).0[0] > 0.5)])
        });
    };
    let blurred = gaussian_blur(&quantize(mask), sigma);
    // 127.5 is the 8-bit image of 0.5; strictly above it is foreground.
    GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        Luma([u8::from(blurred.get_pixel(x, y).0[0] > 127)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A filled square of probability 1.0 on a 0.0 background.
    fn square_mask(size: u32, lo: u32, hi: u32) -> ProbabilityMask {
        ProbabilityMask::from_fn(size, size, |x, y| {
            let inside = (lo..hi).contains(&x) && (lo..hi).contains(&y);
            Luma([if inside { 1.0 } else { 0.0 }])
        })
    }

    #[test]
    fn kernel_sigma_zero_disables() {
        assert!(kernel_sigma(0).is_none());
    }

    #[test]
    fn kernel_sigma_matches_convention() {
        // k = 17 -> 0.3 * 7 + 0.8 = 2.9
        let sigma = kernel_sigma(17).unwrap_or_default();
        assert!((sigma - 2.9).abs() < 1e-5, "got {sigma}");
        // Even sizes round up: 16 behaves like 17.
        assert_eq!(kernel_sigma(16), kernel_sigma(17));
    }

    #[test]
    fn kernel_sigma_small_kernels_stay_positive() {
        for k in 1..=3 {
            let sigma = kernel_sigma(k).unwrap_or_default();
            assert!(sigma > 0.0, "k={k} gave non-positive sigma {sigma}");
        }
    }

    #[test]
    fn zero_sigma_returns_identical_image() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 0 } else { 255 }]));
        assert_eq!(gaussian_blur(&img, 0.0), img);
    }

    #[test]
    fn quantize_clamps_out_of_range() {
        let mask = ProbabilityMask::from_fn(3, 1, |x, _| {
            Luma([match x {
                0 => -0.5,
                1 => 0.5,
                _ => 2.0,
            }])
        });
        let q = quantize(&mask);
        assert_eq!(q.get_pixel(0, 0).0[0], 0);
        assert_eq!(q.get_pixel(1, 0).0[0], 128);
        assert_eq!(q.get_pixel(2, 0).0[0], 255);
    }

    #[test]
    fn threshold_without_blur_is_plain_binarization() {
        let mask = ProbabilityMask::from_fn(5, 1, |x, _| {
            Luma([match x {
                0 => 0.2,
                1 => 0.49,
                2 => 0.5,
                3 => 0.51,
                _ => 0.9,
            }])
        });
        let bin = smooth_and_threshold(&mask, 0);
        let values: Vec<u8> = bin.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn smoothing_removes_isolated_speck() {
        let mut mask = square_mask(40, 10, 30);
        mask.put_pixel(2, 2, Luma([1.0]));
        let bin = smooth_and_threshold(&mask, 7);
        assert_eq!(bin.get_pixel(2, 2).0[0], 0, "speck should be blurred away");
        assert_eq!(bin.get_pixel(20, 20).0[0], 1, "square interior survives");
    }

    #[test]
    fn output_dimensions_preserved() {
        let mask = square_mask(17, 3, 9);
        let bin = smooth_and_threshold(&mask, 5);
        assert_eq!(bin.dimensions(), (17, 17));
    }
}
