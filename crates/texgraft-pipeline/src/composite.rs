//! Masked alpha compositing onto the running canvas.

use image::{ImageBuffer, Pixel, Primitive};

use crate::mask::Mask;
use crate::types::{Dimensions, PipelineError};
use crate::warp::channel_from_f64;

/// Blend `warped` into `canvas` wherever `mask` is set.
///
/// Inside the mask each channel becomes
/// `alpha * warped + (1 - alpha) * canvas`, alpha channel included and
/// rounded for integer channels; outside it the canvas is untouched.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] if the three rasters differ in
/// size. The canvas is not modified in that case.
pub fn composite<P>(
    canvas: &mut ImageBuffer<P, Vec<P::Subpixel>>,
    warped: &ImageBuffer<P, Vec<P::Subpixel>>,
    mask: &Mask,
    alpha: f64,
) -> Result<(), PipelineError>
where
    P: Pixel,
{
    let expected = Dimensions::of(canvas);
    for (what, dims) in [("warped image", Dimensions::of(warped)), ("mask", mask.dimensions())] {
        if dims != expected {
            return Err(PipelineError::InvalidInput(format!(
                "{what} is {dims}, canvas is {expected}"
            )));
        }
    }

    let alpha = alpha.clamp(0.0, 1.0);
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if !mask.contains(x, y) {
            continue;
        }
        let source = warped.get_pixel(x, y);
        for (c, w) in pixel.channels_mut().iter_mut().zip(source.channels()) {
            *c = blend(*c, *w, alpha);
        }
    }
    Ok(())
}

fn blend<T: Primitive>(canvas: T, warped: T, alpha: f64) -> T {
    if alpha <= 0.0 {
        return canvas;
    }
    let (Some(c), Some(w)) = (canvas.to_f64(), warped.to_f64()) else {
        return canvas;
    };
    channel_from_f64(w.mul_add(alpha, c * (1.0 - alpha)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GrayImage, Luma, Rgba, Rgba32FImage, RgbaImage};

    use super::*;

    fn half_mask(w: u32, h: u32) -> Mask {
        Mask::from(GrayImage::from_fn(w, h, |x, _| Luma([u8::from(x < w / 2)])))
    }

    #[test]
    fn blends_inside_and_preserves_outside() {
        let mut canvas = RgbaImage::from_pixel(4, 2, Rgba([100, 100, 100, 255]));
        let warped = RgbaImage::from_pixel(4, 2, Rgba([200, 0, 51, 0]));
        composite(&mut canvas, &warped, &half_mask(4, 2), 0.5).unwrap();

        assert_eq!(*canvas.get_pixel(0, 0), Rgba([150, 50, 76, 128]));
        assert_eq!(*canvas.get_pixel(3, 1), Rgba([100, 100, 100, 255]));
    }

    #[test]
    fn alpha_zero_is_identity() {
        let original = RgbaImage::from_fn(5, 5, |x, y| Rgba([(x * 40) as u8, (y * 50) as u8, 7, 255]));
        let mut canvas = original.clone();
        let warped = RgbaImage::from_pixel(5, 5, Rgba([255, 255, 255, 255]));
        composite(&mut canvas, &warped, &half_mask(5, 5), 0.0).unwrap();
        assert_eq!(canvas, original);
    }

    #[test]
    fn alpha_one_replaces_inside() {
        let mut canvas = GrayImage::from_pixel(4, 1, Luma([10]));
        let warped = GrayImage::from_pixel(4, 1, Luma([240]));
        composite(&mut canvas, &warped, &half_mask(4, 1), 1.0).unwrap();
        assert_eq!(canvas.as_raw(), &vec![240, 240, 10, 10]);
    }

    #[test]
    fn size_mismatch_leaves_canvas_untouched() {
        let mut canvas = GrayImage::from_pixel(4, 4, Luma([10]));
        let before = canvas.clone();
        let warped = GrayImage::from_pixel(4, 3, Luma([240]));
        let err = composite(&mut canvas, &warped, &half_mask(4, 4), 1.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(canvas, before);

        let err = composite(&mut canvas, &before.clone(), &half_mask(3, 4), 1.0).unwrap_err();
        assert!(err.to_string().contains("mask"));
    }

    #[test]
    fn sixteen_bit_blend_keeps_precision() {
        let original: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(4, 1, |x, _| Luma([1000 + 7 * x as u16]));
        let warped = ImageBuffer::from_pixel(4, 1, Luma([3001u16]));

        let mut untouched = original.clone();
        composite(&mut untouched, &warped, &half_mask(4, 1), 0.0).unwrap();
        assert_eq!(untouched, original);

        let mut canvas = original.clone();
        composite(&mut canvas, &warped, &half_mask(4, 1), 0.5).unwrap();
        // (3001 + 1000) / 2 = 2000.5 and (3001 + 1007) / 2 = 2004
        assert_eq!(canvas.as_raw(), &vec![2001, 2004, 1014, 1021]);
    }

    #[test]
    fn float_blend_is_unrounded() {
        let mut canvas = Rgba32FImage::from_pixel(2, 1, Rgba([0.2, 0.4, 0.0, 1.0]));
        let warped = Rgba32FImage::from_pixel(2, 1, Rgba([0.6, 0.4, 1.0, 1.0]));
        composite(&mut canvas, &warped, &half_mask(2, 1), 0.25).unwrap();
        let blended = canvas.get_pixel(0, 0).0;
        assert!((blended[0] - 0.3).abs() < 1e-6);
        assert!((blended[2] - 0.25).abs() < 1e-6);
        assert_eq!(canvas.get_pixel(1, 0).0, [0.2, 0.4, 0.0, 1.0]);
    }
}
