// THEORY:
// Water absorbs long wavelengths first, so even after balancing the red plane
// tends to sit low. The `RedChannelCorrector` compensates with a fixed gain on the
// red plane: `r' = min(255, round(gain * r))`. Green and blue pass through
// byte for byte. Since only 256 inputs exist, the gain is folded into a LUT.

use crate::error::{RectifyError, Result};
use image::RgbImage;

pub const DEFAULT_RED_GAIN: f64 = 1.3;

/// Scales the red plane by `gain`, saturating at the 8-bit range.
pub fn correct_red(image: &RgbImage, gain: f64) -> Result<RgbImage> {
    validate_gain(gain)?;

    let lut = gain_lut(gain);
    let mut corrected = image.clone();
    for pixel in corrected.pixels_mut() {
        pixel.0[0] = lut[pixel.0[0] as usize];
    }
    Ok(corrected)
}

pub fn validate_gain(gain: f64) -> Result<()> {
    if !gain.is_finite() || gain < 0.0 {
        return Err(RectifyError::InvalidConfig(format!(
            "red gain must be a finite, non-negative number, got {gain}"
        )));
    }
    Ok(())
}

fn gain_lut(gain: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (value, entry) in lut.iter_mut().enumerate() {
        *entry = (value as f64 * gain).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn red_is_scaled_and_saturated() {
        let image = RgbImage::from_fn(256, 1, |x, _| Rgb([x as u8, 255 - x as u8, 42]));
        let corrected = correct_red(&image, DEFAULT_RED_GAIN).unwrap();

        for (before, after) in image.pixels().zip(corrected.pixels()) {
            let expected = (1.3 * before.0[0] as f64).round().min(255.0) as u8;
            assert_eq!(after.0[0], expected);
            assert_eq!(after.0[1], before.0[1]);
            assert_eq!(after.0[2], before.0[2]);
        }
    }

    #[test]
    fn known_values() {
        let image = RgbImage::from_vec(4, 1, vec![0, 1, 2, 10, 3, 4, 100, 5, 6, 200, 7, 8]).unwrap();
        let corrected = correct_red(&image, 1.3).unwrap();
        let reds: Vec<u8> = corrected.pixels().map(|p| p.0[0]).collect();
        assert_eq!(reds, vec![0, 13, 130, 255]);
    }

    #[test]
    fn unit_gain_is_identity() {
        let image = RgbImage::from_fn(5, 5, |x, y| Rgb([x as u8 * 50, y as u8, 3]));
        assert_eq!(correct_red(&image, 1.0).unwrap(), image);
    }

    #[test]
    fn negative_or_nan_gain_is_rejected() {
        let image = RgbImage::new(1, 1);
        assert!(correct_red(&image, -0.5).is_err());
        assert!(correct_red(&image, f64::NAN).is_err());
    }
}
