// THEORY:
// The `pipeline` module is the top-level API of the rectification engine. It wraps
// the four stages into a single call and owns the one piece of configuration the
// engine has: a small set of named constants.
//
// Control flow for one image:
//   raw -> ColorBalancer -> ContrastEnhancer -> RedChannelCorrector -> Fusion(raw, corrected)
//
// Key architectural principles:
// 1.  **Thin Orchestration**: `RectifyPipeline` holds no per-image state. Every call
//     is a pure function of (config, image), which is what lets the batch layer run
//     many of them concurrently without locks.
// 2.  **Entry Normalization**: Whatever layout a decoder produced is coerced to
//     8-bit RGB before the first stage runs; raw buffers are length-checked.
// 3.  **Fail Fast**: Any stage error aborts the image and propagates. Nothing here
//     retries, since every stage is deterministic.

use crate::core_modules::channel::channel::ChannelIndex;
use crate::core_modules::color_balancer::color_balancer::{balance_color, validate_percent};
use crate::core_modules::contrast_enhancer::{ClaheParams, enhance_contrast};
use crate::core_modules::fusion::{FusionWeights, fuse};
use crate::core_modules::red_channel::{DEFAULT_RED_GAIN, correct_red, validate_gain};
use crate::error::{RectifyError, Result};
use image::{DynamicImage, RgbImage};

pub const DEFAULT_BALANCE_PERCENT: f64 = 1.0;

/// Configuration for the RectifyPipeline. Every constant the stages use lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Percentile clipped off each end of every channel by the color balancer.
    pub balance_percent: f64,
    /// Tile grid and contrast ceiling for the lightness equalization.
    pub clahe: ClaheParams,
    /// Multiplier applied to the red channel.
    pub red_gain: f64,
    /// Blend between the raw input and the enhanced result.
    pub fusion: FusionWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            balance_percent: DEFAULT_BALANCE_PERCENT,
            clahe: ClaheParams::default(),
            red_gain: DEFAULT_RED_GAIN,
            fusion: FusionWeights::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        validate_percent(self.balance_percent)?;
        self.clahe.validate()?;
        validate_gain(self.red_gain)?;
        self.fusion.validate()
    }
}

/// Side information gathered while rectifying one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RectifyReport {
    /// Channels whose percentile bounds coincided, left constant instead of stretched.
    pub degenerate_channels: Vec<ChannelIndex>,
}

/// The main, top-level struct for the rectification engine.
#[derive(Debug, Clone, Default)]
pub struct RectifyPipeline {
    config: PipelineConfig,
}

impl RectifyPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rectify(&self, image: &RgbImage) -> Result<RgbImage> {
        self.rectify_with_report(image).map(|(rectified, _)| rectified)
    }

    pub fn rectify_with_report(&self, image: &RgbImage) -> Result<(RgbImage, RectifyReport)> {
        ensure_not_empty(image.width(), image.height())?;

        // Stage 1: Color Balance
        let balanced = balance_color(image, self.config.balance_percent)?;

        // Stage 2: Contrast Enhancement
        let contrasted = enhance_contrast(&balanced.image, &self.config.clahe)?;

        // Stage 3: Red Channel Correction
        let corrected = correct_red(&contrasted, self.config.red_gain)?;

        // Stage 4: Fusion with the untouched input
        let fused = fuse(image, &corrected, self.config.fusion)?;

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            degenerate = balanced.degenerate_channels.len(),
            "rectified image"
        );

        Ok((
            fused,
            RectifyReport {
                degenerate_channels: balanced.degenerate_channels,
            },
        ))
    }

    /// Rectifies any decoded image, first coercing it to 8-bit RGB.
    /// Float samples are clamped into range; alpha is dropped.
    pub fn rectify_dynamic(&self, image: &DynamicImage) -> Result<RgbImage> {
        ensure_not_empty(image.width(), image.height())?;
        self.rectify(&image.to_rgb8())
    }

    /// Rectifies a raw, interleaved RGB buffer of `width * height * 3` bytes.
    pub fn rectify_buffer(&self, width: u32, height: u32, frame_buffer: &[u8]) -> Result<RgbImage> {
        ensure_not_empty(width, height)?;
        let expected = width as usize * height as usize * 3;
        if frame_buffer.len() != expected {
            return Err(RectifyError::invalid_image(format!(
                "buffer holds {} bytes, expected {} for a {}x{} RGB image",
                frame_buffer.len(),
                expected,
                width,
                height
            )));
        }
        let image = RgbImage::from_raw(width, height, frame_buffer.to_vec())
            .ok_or_else(|| RectifyError::invalid_image("buffer does not match its dimensions"))?;
        self.rectify(&image)
    }
}

/// Rectifies one image with the default constants.
pub fn rectify(image: &RgbImage) -> Result<RgbImage> {
    RectifyPipeline::default().rectify(image)
}

fn ensure_not_empty(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RectifyError::invalid_image(format!(
            "image has no pixels ({width}x{height})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgb32FImage, RgbaImage};

    fn underwater_scene(width: u32, height: u32) -> RgbImage {
        // Blue-green cast with little red, a bright patch and a dark corner.
        RgbImage::from_fn(width, height, |x, y| {
            let base = ((x * 7 + y * 3) % 60) as u8;
            if x < width / 4 && y < height / 4 {
                Rgb([2, 20 + base / 2, 30 + base])
            } else if x > width / 2 && y > height / 2 {
                Rgb([90 + base, 200 + base / 2, 220])
            } else {
                Rgb([20 + base / 3, 110 + base, 140 + base])
            }
        })
    }

    #[test]
    fn two_by_two_scene_rectifies() {
        let image = RgbImage::from_vec(
            2,
            2,
            vec![10, 10, 10, 250, 250, 250, 10, 10, 10, 250, 250, 250],
        )
        .unwrap();
        let rectified = rectify(&image).expect("2x2 image must rectify");
        assert_eq!(rectified.dimensions(), (2, 2));
    }

    #[test]
    fn all_black_image_is_handled_as_degenerate() {
        let image = RgbImage::new(8, 8);

        let balanced = balance_color(&image, DEFAULT_BALANCE_PERCENT).unwrap();
        assert_eq!(balanced.degenerate_channels, ChannelIndex::ALL.to_vec());
        assert!(balanced.image.pixels().all(|p| p.0 == [0, 0, 0]));

        let (rectified, report) = RectifyPipeline::default().rectify_with_report(&image).unwrap();
        assert_eq!(report.degenerate_channels, ChannelIndex::ALL.to_vec());
        assert_eq!(rectified.dimensions(), (8, 8));
        // One-pixel tiles equalize the flat plane to white; fusion keeps 0.6 of it.
        assert!(rectified.pixels().all(|p| p.0 == [153, 153, 153]));
    }

    #[test]
    fn dimensions_are_preserved() {
        for (width, height) in [(1, 1), (3, 17), (64, 48), (101, 13)] {
            let rectified = rectify(&underwater_scene(width, height)).unwrap();
            assert_eq!(rectified.dimensions(), (width, height));
        }
    }

    #[test]
    fn input_is_not_mutated() {
        let image = underwater_scene(32, 32);
        let copy = image.clone();
        let _ = rectify(&image).unwrap();
        assert_eq!(image, copy);
    }

    #[test]
    fn red_cast_is_lifted() {
        let image = underwater_scene(64, 64);
        let rectified = rectify(&image).unwrap();
        let mean_red = |img: &RgbImage| img.pixels().map(|p| p.0[0] as u64).sum::<u64>() / 4096;
        assert!(mean_red(&rectified) > mean_red(&image));
    }

    #[test]
    fn identity_stages_reduce_to_fusion() {
        // Zero-weight on the enhanced image returns the raw input exactly.
        let config = PipelineConfig {
            fusion: FusionWeights { original: 1.0, enhanced: 0.0 },
            ..PipelineConfig::default()
        };
        let pipeline = RectifyPipeline::new(config).unwrap();
        let image = underwater_scene(20, 20);
        assert_eq!(pipeline.rectify(&image).unwrap(), image);
    }

    #[test]
    fn empty_image_is_invalid() {
        let error = rectify(&RgbImage::new(0, 5)).unwrap_err();
        assert!(error.is_invalid_image());
    }

    #[test]
    fn short_buffer_is_invalid() {
        let pipeline = RectifyPipeline::default();
        let error = pipeline.rectify_buffer(2, 2, &[0u8; 11]).unwrap_err();
        assert!(error.is_invalid_image());
        assert!(pipeline.rectify_buffer(2, 2, &[128u8; 12]).is_ok());
    }

    #[test]
    fn out_of_range_float_input_is_clamped_at_entry() {
        let wild = Rgb32FImage::from_fn(4, 4, |x, _| match x {
            0 => Rgb([-3.0, 0.5, 9.0]),
            1 => Rgb([f32::INFINITY, 0.2, 0.1]),
            _ => Rgb([0.3, 0.6, 0.9]),
        });
        let rectified = RectifyPipeline::default()
            .rectify_dynamic(&DynamicImage::ImageRgb32F(wild))
            .unwrap();
        assert_eq!(rectified.dimensions(), (4, 4));
    }

    #[test]
    fn alpha_is_dropped_at_entry() {
        let rgba = RgbaImage::from_pixel(5, 5, image::Rgba([10, 120, 160, 7]));
        let rectified = RectifyPipeline::default()
            .rectify_dynamic(&DynamicImage::ImageRgba8(rgba))
            .unwrap();
        assert_eq!(rectified.dimensions(), (5, 5));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = PipelineConfig {
            red_gain: -1.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            RectifyPipeline::new(config),
            Err(RectifyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn oversized_tile_grid_is_rejected_up_front() {
        let config = PipelineConfig {
            clahe: ClaheParams {
                tiles_x: 200_000,
                tiles_y: 200_000,
                ..ClaheParams::default()
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            RectifyPipeline::new(config),
            Err(RectifyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pipeline_keeps_the_config_it_was_built_with() {
        let config = PipelineConfig {
            red_gain: 1.1,
            ..PipelineConfig::default()
        };
        let pipeline = RectifyPipeline::new(config.clone()).unwrap();
        assert_eq!(pipeline.config(), &config);
    }
}
