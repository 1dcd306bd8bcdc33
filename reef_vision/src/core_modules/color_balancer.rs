// THEORY:
// The `ColorBalancer` is the first stage of the rectification pipeline. Underwater
// scenes lose red light with depth and pick up a blue/green cast; a handful of
// extreme pixels (specular highlights, deep shadows) also pin each channel's range.
// The balancer removes both effects with a per-channel "percentile clip and stretch".
//
// Algorithm steps (applied to each channel independently):
// 1.  **Histogram**: Summarize the plane as a 256-bin histogram. Every percentile
//     query is answered from the histogram, so no sorted copy of the plane is needed.
// 2.  **Percentile Bounds**: Find the `p`-th and `(100 - p)`-th percentiles using
//     linear interpolation between the two closest ranks.
// 3.  **Clip & Stretch**: Clamp every sample into `[lower, upper]`, then remap that
//     interval linearly onto `[0, 255]`. Since only 256 inputs exist, the mapping is
//     materialized as a lookup table and applied in a single pass.
// 4.  **Degenerate Channels**: When both bounds coincide the channel is constant and
//     the stretch is undefined. The channel is filled with the clip value instead
//     (an all-black channel stays black) and the channel is reported to the caller.
//     This is never an error.

use crate::core_modules::channel::channel::{
    Channel, ChannelIndex, Histogram, merge_channels, split_channels,
};
use crate::error::{RectifyError, Result};
use image::RgbImage;

pub mod color_balancer {
    use super::*;

    /// The interpolated percentile bounds found for one channel.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct ChannelBounds {
        pub lower: f64,
        pub upper: f64,
    }

    impl ChannelBounds {
        pub fn is_degenerate(&self) -> bool {
            (self.upper - self.lower).abs() < f64::EPSILON
        }
    }

    /// Output of the balancer: the stretched image plus the planes that were constant.
    #[derive(Debug, Clone)]
    pub struct BalancedImage {
        pub image: RgbImage,
        pub degenerate_channels: Vec<ChannelIndex>,
    }

    /// Runs percentile clipping and min-max stretching on every channel.
    pub fn balance_color(image: &RgbImage, percent: f64) -> Result<BalancedImage> {
        validate_percent(percent)?;

        let mut degenerate_channels = Vec::new();
        let planes = split_channels(image);
        let mut balanced: Vec<Channel> = Vec::with_capacity(3);

        for (position, plane) in planes.iter().enumerate() {
            let bounds = percentile_bounds(&plane.histogram(), percent);
            if bounds.is_degenerate() {
                if let Some(index) = ChannelIndex::from_position(position) {
                    tracing::debug!(channel = ?index, value = bounds.lower, "degenerate channel, skipping stretch");
                    degenerate_channels.push(index);
                }
            }
            let lut = stretch_lut(bounds);
            balanced.push(plane.map(|sample| lut[sample as usize]));
        }

        let planes: [Channel; 3] = balanced
            .try_into()
            .map_err(|_| RectifyError::invalid_image("color balancer lost a channel"))?;

        Ok(BalancedImage {
            image: merge_channels(&planes)?,
            degenerate_channels,
        })
    }

    /// Rejects percentages that would invert or empty the clip interval.
    pub fn validate_percent(percent: f64) -> Result<()> {
        if !percent.is_finite() || !(0.0..=50.0).contains(&percent) {
            return Err(RectifyError::InvalidConfig(format!(
                "balance percentile must lie in [0, 50], got {percent}"
            )));
        }
        Ok(())
    }

    /// The `p`-th and `(100 - p)`-th percentiles of a histogram.
    pub fn percentile_bounds(histogram: &Histogram, percent: f64) -> ChannelBounds {
        ChannelBounds {
            lower: percentile(histogram, percent),
            upper: percentile(histogram, 100.0 - percent),
        }
    }

    /// Percentile with linear interpolation between closest ranks.
    /// An empty histogram yields 0.
    pub fn percentile(histogram: &Histogram, quantile: f64) -> f64 {
        let total: u64 = histogram.iter().map(|&count| count as u64).sum();
        if total == 0 {
            return 0.0;
        }

        let position = (quantile / 100.0).clamp(0.0, 1.0) * (total - 1) as f64;
        let lower_rank = position.floor() as u64;
        let upper_rank = position.ceil() as u64;
        let fraction = position - lower_rank as f64;

        let lower_value = value_at_rank(histogram, lower_rank) as f64;
        let upper_value = value_at_rank(histogram, upper_rank) as f64;
        lower_value + (upper_value - lower_value) * fraction
    }

    /// The sample value at `rank` in the sorted plane (0-based).
    fn value_at_rank(histogram: &Histogram, rank: u64) -> u8 {
        let mut cumulative = 0u64;
        for (value, &count) in histogram.iter().enumerate() {
            cumulative += count as u64;
            if cumulative > rank {
                return value as u8;
            }
        }
        u8::MAX
    }

    /// Lookup table for "clamp into `bounds`, then stretch onto [0, 255]".
    pub fn stretch_lut(bounds: ChannelBounds) -> [u8; 256] {
        let mut lut = [0u8; 256];

        if bounds.is_degenerate() {
            let constant = bounds.lower.round().clamp(0.0, 255.0) as u8;
            lut.fill(constant);
            return lut;
        }

        let scale = 255.0 / (bounds.upper - bounds.lower);
        for (sample, entry) in lut.iter_mut().enumerate() {
            let clipped = (sample as f64).clamp(bounds.lower, bounds.upper);
            *entry = ((clipped - bounds.lower) * scale).round().clamp(0.0, 255.0) as u8;
        }
        lut
    }
}
