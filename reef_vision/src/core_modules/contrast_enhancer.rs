// THEORY:
// The `ContrastEnhancer` is the second stage of the rectification pipeline. Haze
// flattens underwater scenes locally: a reef in the foreground and open water behind
// it occupy very different brightness ranges, so a single global curve cannot fix
// both. The enhancer runs Contrast Limited Adaptive Histogram Equalization (CLAHE)
// on the lightness plane only, leaving chroma untouched.
//
// Key architectural principles & algorithm steps:
// 1.  **Tile Grid**: The lightness plane is sliced into a fixed grid of tiles
//     (8x8 by default). When the plane's sides are not multiples of the grid, the
//     histogram pass reads a virtually extended plane (reflect-101 borders), so every
//     tile has the same area. The output keeps the original dimensions.
// 2.  **Per-Tile Histograms**: Each tile builds its own 256-bin histogram and turns it
//     into a lookup table through its cumulative distribution.
// 3.  **Contrast Ceiling**: Before accumulating, every bin is capped at
//     `clip_limit * tile_area / 256`. The excess is spread uniformly over the whole
//     histogram, never piled back into a few bins, so near-flat tiles cannot be
//     blown out into noise.
// 4.  **Bilinear Blending**: Each output pixel mixes the LUTs of the four tiles whose
//     centers surround it, which removes block edges between tiles.
// 5.  **Color Isolation**: The stage goes RGB -> L*a*b* -> RGB through the
//     `PerceptualSpace` seam and swaps only the lightness plane, so equalization can
//     be tested without touching color conversion at all.

use crate::core_modules::channel::channel::{Channel, Histogram};
use crate::core_modules::perceptual::{CieLab, LabPlanes, PerceptualSpace};
use crate::error::{RectifyError, Result};
use image::RgbImage;

const HISTOGRAM_BINS: usize = 256;

/// Largest tile count accepted along either axis. Every tile owns a 256-byte LUT.
pub const MAX_TILES_PER_AXIS: u32 = 256;

pub type TileLut = [u8; HISTOGRAM_BINS];

/// Tunable parameters for the CLAHE pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClaheParams {
    /// Number of tile columns.
    pub tiles_x: u32,
    /// Number of tile rows.
    pub tiles_y: u32,
    /// Contrast ceiling, as a multiple of the average bin height. `<= 0` disables clipping.
    pub clip_limit: f64,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            tiles_x: 8,
            tiles_y: 8,
            clip_limit: 3.0,
        }
    }
}

impl ClaheParams {
    pub fn validate(&self) -> Result<()> {
        if self.tiles_x == 0 || self.tiles_y == 0 {
            return Err(RectifyError::InvalidConfig(format!(
                "tile grid must be at least 1x1, got {}x{}",
                self.tiles_x, self.tiles_y
            )));
        }
        if self.tiles_x > MAX_TILES_PER_AXIS || self.tiles_y > MAX_TILES_PER_AXIS {
            return Err(RectifyError::InvalidConfig(format!(
                "tile grid may have at most {MAX_TILES_PER_AXIS} tiles per side, got {}x{}",
                self.tiles_x, self.tiles_y
            )));
        }
        if !self.clip_limit.is_finite() {
            return Err(RectifyError::InvalidConfig(format!(
                "clip limit must be finite, got {}",
                self.clip_limit
            )));
        }
        Ok(())
    }
}

/// Geometry of the tile grid laid over a (virtually extended) plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TileGrid {
    tiles_x: usize,
    tiles_y: usize,
    tile_width: usize,
    tile_height: usize,
}

impl TileGrid {
    fn new(width: u32, height: u32, params: &ClaheParams) -> Self {
        let tiles_x = params.tiles_x as usize;
        let tiles_y = params.tiles_y as usize;
        Self {
            tiles_x,
            tiles_y,
            tile_width: (width as usize).div_ceil(tiles_x),
            tile_height: (height as usize).div_ceil(tiles_y),
        }
    }

    fn tile_area(&self) -> usize {
        self.tile_width * self.tile_height
    }
}

/// Converts to L*a*b*, equalizes lightness, and converts back.
pub fn enhance_contrast(image: &RgbImage, params: &ClaheParams) -> Result<RgbImage> {
    enhance_contrast_in(&CieLab, image, params)
}

/// Same as [`enhance_contrast`], through an arbitrary perceptual space.
pub fn enhance_contrast_in<S: PerceptualSpace>(
    space: &S,
    image: &RgbImage,
    params: &ClaheParams,
) -> Result<RgbImage> {
    params.validate()?;
    let planes = space.to_planes(image);
    let equalized = equalize_lightness(planes, params)?;
    space.to_rgb(&equalized)
}

/// Applies CLAHE to the lightness plane and leaves both chroma planes untouched.
pub fn equalize_lightness(planes: LabPlanes, params: &ClaheParams) -> Result<LabPlanes> {
    params.validate()?;
    let lightness = equalize_channel(&planes.lightness, params);
    planes.with_lightness(lightness)
}

/// Contrast limited adaptive histogram equalization of a single plane.
pub fn equalize_channel(channel: &Channel, params: &ClaheParams) -> Channel {
    if channel.is_empty() || params.tiles_x == 0 || params.tiles_y == 0 {
        return channel.clone();
    }

    let grid = TileGrid::new(channel.width, channel.height, params);
    tracing::trace!(?grid, clip_limit = params.clip_limit, "equalizing plane");

    // --- 1. Per-Tile Lookup Tables ---
    let mut luts: Vec<TileLut> = Vec::with_capacity(grid.tiles_x * grid.tiles_y);
    for tile_y in 0..grid.tiles_y {
        for tile_x in 0..grid.tiles_x {
            let histogram = tile_histogram(channel, &grid, tile_x, tile_y);
            luts.push(tile_lut(histogram, grid.tile_area(), params.clip_limit));
        }
    }

    // --- 2. Bilinear Blending Between Tile Centers ---
    interpolate(channel, &grid, &luts)
}

/// Histogram of one tile, reading past the plane's edges through reflect-101.
fn tile_histogram(channel: &Channel, grid: &TileGrid, tile_x: usize, tile_y: usize) -> Histogram {
    let mut histogram = [0u32; HISTOGRAM_BINS];
    let x_start = tile_x * grid.tile_width;
    let y_start = tile_y * grid.tile_height;

    for y in y_start..y_start + grid.tile_height {
        let source_y = reflect_101(y, channel.height as usize);
        for x in x_start..x_start + grid.tile_width {
            let source_x = reflect_101(x, channel.width as usize);
            histogram[channel.get(source_x as u32, source_y as u32) as usize] += 1;
        }
    }
    histogram
}

/// Mirrors an out-of-range coordinate about the last pixel without repeating it.
pub fn reflect_101(position: usize, length: usize) -> usize {
    if length <= 1 {
        return 0;
    }
    if position < length {
        return position;
    }
    let period = 2 * length - 2;
    let folded = position % period;
    if folded >= length { period - folded } else { folded }
}

/// Caps every bin at the contrast ceiling and spreads the excess over the histogram.
pub fn clip_histogram(histogram: &mut Histogram, limit: u32) {
    let mut clipped = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > limit {
            clipped += *bin - limit;
            *bin = limit;
        }
    }

    let batch = clipped / HISTOGRAM_BINS as u32;
    let mut residual = (clipped % HISTOGRAM_BINS as u32) as usize;
    for bin in histogram.iter_mut() {
        *bin += batch;
    }

    if residual > 0 {
        let step = (HISTOGRAM_BINS / residual).max(1);
        let mut position = 0;
        while position < HISTOGRAM_BINS && residual > 0 {
            histogram[position] += 1;
            residual -= 1;
            position += step;
        }
    }
}

/// Turns a tile histogram into its equalizing lookup table.
pub fn tile_lut(mut histogram: Histogram, tile_area: usize, clip_limit: f64) -> TileLut {
    if clip_limit > 0.0 {
        let limit = ((clip_limit * tile_area as f64 / HISTOGRAM_BINS as f64) as u32).max(1);
        clip_histogram(&mut histogram, limit);
    }

    let scale = 255.0 / tile_area.max(1) as f64;
    let mut lut = [0u8; HISTOGRAM_BINS];
    let mut cumulative = 0u64;
    for (entry, &count) in lut.iter_mut().zip(histogram.iter()) {
        cumulative += count as u64;
        *entry = (cumulative as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Position of a pixel between two tile centers along one axis:
/// (first tile, second tile, weight of the second tile).
fn blend_coordinates(position: usize, tile_size: usize, tiles: usize) -> (usize, usize, f64) {
    let scaled = position as f64 / tile_size as f64 - 0.5;
    let first = scaled.floor() as isize;
    let weight = scaled - first as f64;
    let second = ((first + 1) as usize).min(tiles - 1);
    (first.max(0) as usize, second, weight)
}

fn interpolate(channel: &Channel, grid: &TileGrid, luts: &[TileLut]) -> Channel {
    let width = channel.width as usize;
    let height = channel.height as usize;
    let mut data = Vec::with_capacity(width * height);

    for y in 0..height {
        let (top, bottom, y_weight) = blend_coordinates(y, grid.tile_height, grid.tiles_y);
        for x in 0..width {
            let (left, right, x_weight) = blend_coordinates(x, grid.tile_width, grid.tiles_x);
            let value = channel.data[y * width + x] as usize;

            let top_left = luts[top * grid.tiles_x + left][value] as f64;
            let top_right = luts[top * grid.tiles_x + right][value] as f64;
            let bottom_left = luts[bottom * grid.tiles_x + left][value] as f64;
            let bottom_right = luts[bottom * grid.tiles_x + right][value] as f64;

            let upper = top_left * (1.0 - x_weight) + top_right * x_weight;
            let lower = bottom_left * (1.0 - x_weight) + bottom_right * x_weight;
            let blended = upper * (1.0 - y_weight) + lower * y_weight;
            data.push(blended.round().clamp(0.0, 255.0) as u8);
        }
    }

    Channel {
        width: channel.width,
        height: channel.height,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn plane_from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Channel {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Channel::new(width, height, data).unwrap()
    }

    fn range(channel: &Channel) -> u8 {
        channel.data.iter().max().unwrap() - channel.data.iter().min().unwrap()
    }

    #[test]
    fn reflect_101_mirrors_without_repeating_edge() {
        assert_eq!(reflect_101(3, 5), 3);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(2, 2), 0);
        assert_eq!(reflect_101(7, 1), 0);
    }

    #[test]
    fn clipped_histogram_respects_limit_and_keeps_mass() {
        let mut histogram = [0u32; 256];
        histogram[0] = 1000;
        histogram[1] = 500;
        clip_histogram(&mut histogram, 100);
        assert_eq!(histogram.iter().sum::<u32>(), 1500);
        // 1300 excess: 5 per bin plus 20 residual samples spread with a stride of 12.
        assert_eq!(histogram[0], 106);
        assert_eq!(histogram[2], 5);
        assert_eq!(histogram[12], 6);
    }

    #[test]
    fn uniform_plane_stays_uniform_and_near_its_level() {
        let plane = Channel::filled(64, 64, 128);
        let equalized = equalize_channel(&plane, &ClaheParams::default());
        let first = equalized.data[0];
        assert!(equalized.data.iter().all(|&v| v == first));
        assert!((first as i16 - 128).abs() <= 16, "flat plane drifted to {first}");
    }

    #[test]
    fn disabling_the_ceiling_amplifies_flat_tiles() {
        let plane = Channel::filled(64, 64, 128);
        let unclipped = ClaheParams { clip_limit: 0.0, ..ClaheParams::default() };
        let equalized = equalize_channel(&plane, &unclipped);
        assert!(equalized.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn low_contrast_ramp_is_stretched() {
        let plane = plane_from_fn(16, 16, |x, _| 100 + x as u8);
        let single_tile = ClaheParams { tiles_x: 1, tiles_y: 1, clip_limit: 3.0 };
        let equalized = equalize_channel(&plane, &single_tile);
        assert!(range(&equalized) > range(&plane));
        // Equalization is monotonic in the input value.
        for x in 1..16 {
            assert!(equalized.get(x, 0) >= equalized.get(x - 1, 0));
        }
    }

    #[test]
    fn dimensions_survive_grids_that_do_not_divide_the_plane() {
        for (width, height) in [(13, 7), (2, 2), (1, 1), (9, 31)] {
            let plane = plane_from_fn(width, height, |x, y| ((x * 17 + y * 5) % 256) as u8);
            let equalized = equalize_channel(&plane, &ClaheParams::default());
            assert_eq!((equalized.width, equalized.height), (width, height));
            assert_eq!(equalized.len(), plane.len());
        }
    }

    #[test]
    fn lightness_equalization_leaves_chroma_untouched() {
        let image = RgbImage::from_fn(24, 16, |x, y| Rgb([20 + x as u8 * 3, 90 + y as u8, 140]));
        let planes = CieLab.to_planes(&image);
        let equalized = equalize_lightness(planes.clone(), &ClaheParams::default()).unwrap();
        assert_eq!(equalized.chroma_a, planes.chroma_a);
        assert_eq!(equalized.chroma_b, planes.chroma_b);
        assert_ne!(equalized.lightness, planes.lightness);
    }

    #[test]
    fn enhanced_image_keeps_dimensions() {
        let image = RgbImage::from_fn(10, 6, |x, y| Rgb([x as u8 * 20, y as u8 * 30, 77]));
        let enhanced = enhance_contrast(&image, &ClaheParams::default()).unwrap();
        assert_eq!(enhanced.dimensions(), (10, 6));
    }

    #[test]
    fn zero_tile_grid_is_rejected() {
        let image = RgbImage::new(4, 4);
        let params = ClaheParams { tiles_x: 0, ..ClaheParams::default() };
        assert!(enhance_contrast(&image, &params).is_err());
    }

    #[test]
    fn oversized_tile_grid_is_rejected() {
        let largest = ClaheParams {
            tiles_x: MAX_TILES_PER_AXIS,
            tiles_y: MAX_TILES_PER_AXIS,
            ..ClaheParams::default()
        };
        assert!(largest.validate().is_ok());

        let huge = ClaheParams {
            tiles_x: 200_000,
            tiles_y: 200_000,
            ..ClaheParams::default()
        };
        assert!(matches!(huge.validate(), Err(RectifyError::InvalidConfig(_))));

        let one_side = ClaheParams { tiles_y: MAX_TILES_PER_AXIS + 1, ..ClaheParams::default() };
        assert!(matches!(one_side.validate(), Err(RectifyError::InvalidConfig(_))));
    }
}
