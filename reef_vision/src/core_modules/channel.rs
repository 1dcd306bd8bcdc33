// THEORY:
// The `Channel` module represents a single plane of an image: one scalar value per
// pixel, laid out row-major. Every stage of the rectification pipeline that works
// "per channel" (color balancing, lightness equalization, red correction) operates
// on these planes rather than on interleaved RGB bytes.
//
// Key architectural principles:
// 1.  **Data Container**: Like the rest of the low-level modules, `Channel` is a
//     "dumb" container. It knows its own dimensions and how to summarize itself
//     (a 256-bin histogram), but it knows nothing about the stage consuming it.
// 2.  **Lossless Split/Merge**: `split_channels` and `merge_channels` are exact
//     inverses. Splitting an `RgbImage` and merging the untouched planes back
//     reproduces the original image byte for byte.
// 3.  **Dimension Guard**: Merging refuses planes of mismatched sizes instead of
//     silently truncating, so a dimension bug surfaces as an `InvalidImage` error
//     at the stage boundary.

pub mod channel {
    use crate::error::RectifyError;
    use image::{Rgb, RgbImage};

    pub type Sample = u8;
    pub type Histogram = [u32; 256];

    /// Index of a color plane inside an interleaved RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ChannelIndex {
        Red = 0,
        Green = 1,
        Blue = 2,
    }

    impl ChannelIndex {
        pub const ALL: [ChannelIndex; 3] = [ChannelIndex::Red, ChannelIndex::Green, ChannelIndex::Blue];

        pub fn from_position(position: usize) -> Option<Self> {
            Self::ALL.get(position).copied()
        }
    }

    /// A single-plane 2D grid of 8-bit samples.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Channel {
        /// The width of the plane in pixels.
        pub width: u32,
        /// The height of the plane in pixels.
        pub height: u32,
        /// Row-major samples, `width * height` entries.
        pub data: Vec<Sample>,
    }

    impl Channel {
        pub fn new(width: u32, height: u32, data: Vec<Sample>) -> Result<Self, RectifyError> {
            let expected = width as usize * height as usize;
            if data.len() != expected {
                return Err(RectifyError::invalid_image(format!(
                    "channel buffer holds {} samples, expected {} for {}x{}",
                    data.len(),
                    expected,
                    width,
                    height
                )));
            }
            Ok(Self { width, height, data })
        }

        pub fn filled(width: u32, height: u32, value: Sample) -> Self {
            Self {
                width,
                height,
                data: vec![value; width as usize * height as usize],
            }
        }

        #[inline]
        pub fn get(&self, x: u32, y: u32) -> Sample {
            self.data[y as usize * self.width as usize + x as usize]
        }

        pub fn len(&self) -> usize {
            self.data.len()
        }

        pub fn is_empty(&self) -> bool {
            self.data.is_empty()
        }

        pub fn same_dimensions(&self, other: &Channel) -> bool {
            self.width == other.width && self.height == other.height
        }

        /// Counts how many samples fall into each of the 256 possible values.
        pub fn histogram(&self) -> Histogram {
            let mut histogram = [0u32; 256];
            for &sample in &self.data {
                histogram[sample as usize] += 1;
            }
            histogram
        }

        /// Returns a new plane with `mapping` applied to every sample.
        pub fn map<F>(&self, mut mapping: F) -> Channel
        where
            F: FnMut(Sample) -> Sample,
        {
            Channel {
                width: self.width,
                height: self.height,
                data: self.data.iter().map(|&sample| mapping(sample)).collect(),
            }
        }
    }

    /// Extracts a single plane from an interleaved RGB image.
    pub fn extract_channel(image: &RgbImage, index: ChannelIndex) -> Channel {
        let position = index as usize;
        Channel {
            width: image.width(),
            height: image.height(),
            data: image.pixels().map(|pixel| pixel.0[position]).collect(),
        }
    }

    /// Splits an RGB image into its red, green and blue planes.
    pub fn split_channels(image: &RgbImage) -> [Channel; 3] {
        ChannelIndex::ALL.map(|index| extract_channel(image, index))
    }

    /// Interleaves three planes back into an RGB image.
    pub fn merge_channels(channels: &[Channel; 3]) -> Result<RgbImage, RectifyError> {
        let [first, second, third] = channels;
        if !first.same_dimensions(second) || !first.same_dimensions(third) {
            return Err(RectifyError::invalid_image(format!(
                "cannot merge planes of sizes {}x{}, {}x{} and {}x{}",
                first.width, first.height, second.width, second.height, third.width, third.height
            )));
        }

        let mut image = RgbImage::new(first.width, first.height);
        for (i, pixel) in image.pixels_mut().enumerate() {
            *pixel = Rgb([first.data[i], second.data[i], third.data[i]]);
        }
        Ok(image)
    }
}
