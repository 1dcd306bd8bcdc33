// THEORY:
// The `FusionCombiner` is the last stage. The enhancement stages are deliberately
// aggressive; blending their result with the untouched input pulls the output back
// toward the real scene. The blend is a convex combination computed in `f32`
// (both inputs widened first), then clamped, rounded and narrowed back to `u8`.

use crate::error::{RectifyError, Result};
use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage};

const WEIGHT_TOLERANCE: f32 = 1e-6;

/// Weights of the convex combination `original * original_weight + enhanced * enhanced_weight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub original: f32,
    pub enhanced: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            original: 0.4,
            enhanced: 0.6,
        }
    }
}

impl FusionWeights {
    pub fn validate(&self) -> Result<()> {
        let finite = self.original.is_finite() && self.enhanced.is_finite();
        if !finite || self.original < 0.0 || self.enhanced < 0.0 {
            return Err(RectifyError::InvalidConfig(format!(
                "fusion weights must be finite and non-negative, got {} / {}",
                self.original, self.enhanced
            )));
        }
        if (self.original + self.enhanced - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(RectifyError::InvalidConfig(format!(
                "fusion weights must sum to 1, got {} + {}",
                self.original, self.enhanced
            )));
        }
        Ok(())
    }
}

/// Widens an 8-bit image to the floating representation (values stay in 0..255).
pub fn widen(image: &RgbImage) -> Rgb32FImage {
    ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
        Rgb(image.get_pixel(x, y).0.map(f32::from))
    })
}

/// Blends the raw input with the fully enhanced image.
pub fn fuse(original: &RgbImage, enhanced: &RgbImage, weights: FusionWeights) -> Result<RgbImage> {
    weights.validate()?;
    if original.dimensions() != enhanced.dimensions() {
        let (ow, oh) = original.dimensions();
        let (ew, eh) = enhanced.dimensions();
        return Err(RectifyError::invalid_image(format!(
            "cannot fuse a {ow}x{oh} image with a {ew}x{eh} image"
        )));
    }

    let original = widen(original);
    let enhanced = widen(enhanced);

    let mut fused = RgbImage::new(original.width(), original.height());
    for ((out, raw), boosted) in fused.pixels_mut().zip(original.pixels()).zip(enhanced.pixels()) {
        for channel in 0..3 {
            let blended = weights.original * raw.0[channel] + weights.enhanced * boosted.0[channel];
            out.0[channel] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let weights = FusionWeights::default();
        assert!((weights.original + weights.enhanced - 1.0).abs() <= WEIGHT_TOLERANCE);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn identical_inputs_fuse_to_themselves() {
        let image = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, (x * y) as u8]));
        let fused = fuse(&image, &image, FusionWeights::default()).unwrap();
        assert_eq!(fused, image);
    }

    #[test]
    fn blend_is_weighted_and_rounded() {
        let original = RgbImage::from_pixel(1, 1, Rgb([0, 100, 255]));
        let enhanced = RgbImage::from_pixel(1, 1, Rgb([255, 200, 0]));
        let fused = fuse(&original, &enhanced, FusionWeights::default()).unwrap();
        // 0.6 * 255 = 153, 0.4 * 100 + 0.6 * 200 = 160, 0.4 * 255 = 102
        assert_eq!(fused.get_pixel(0, 0).0, [153, 160, 102]);
    }

    #[test]
    fn mismatched_dimensions_are_invalid() {
        let original = RgbImage::new(2, 2);
        let enhanced = RgbImage::new(2, 3);
        let error = fuse(&original, &enhanced, FusionWeights::default()).unwrap_err();
        assert!(error.is_invalid_image());
    }

    #[test]
    fn weights_must_form_a_convex_combination() {
        let image = RgbImage::new(1, 1);
        let too_heavy = FusionWeights { original: 0.7, enhanced: 0.6 };
        let negative = FusionWeights { original: -0.2, enhanced: 1.2 };
        assert!(fuse(&image, &image, too_heavy).is_err());
        assert!(fuse(&image, &image, negative).is_err());
    }
}
