// THEORY (Perceptual Color Space):
// The contrast stage must brighten and darken pixels without shifting their hue.
// It does so by moving into CIE L*a*b*, where one plane (L) carries lightness and
// the other two (a, b) carry chroma, editing L alone, and coming back to RGB.
//
// What lives here:
// - `LabPlanes`: the three planes in the common 8-bit encoding
//   • L scaled from 0..100 onto 0..255
//   • a and b offset by +128 so the neutral axis sits at 128
// - `PerceptualSpace`: the narrow, pure interface (forward + inverse) the contrast
//   stage depends on. Equalization logic never sees a color matrix.
// - `CieLab`: the D65 / sRGB implementation of that interface.
//
// The forward transform linearizes sRGB through a 256-entry `OnceLock` LUT, so the
// hot path is a table lookup and a 3x3 multiply, no `powf` per pixel.

use crate::core_modules::channel::channel::Channel;
use crate::error::{RectifyError, Result};
use image::{Rgb, RgbImage};
use std::sync::OnceLock;

pub type Lightness = f32;
pub type ChromaA = f32;
pub type ChromaB = f32;

// D65 reference white, normalizing X and Z.
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240479, -1.537150, -0.498535],
    [-0.969256, 1.875991, 0.041556],
    [0.055648, -0.204043, 1.057311],
];

const EPSILON: f32 = 0.008856;
const KAPPA: f32 = 903.3;
const CHROMA_OFFSET: f32 = 128.0;
const LIGHTNESS_SCALE: f32 = 255.0 / 100.0;

static SRGB_TO_LINEAR_LUT: OnceLock<[f32; 256]> = OnceLock::new();

/// The three 8-bit planes of an image in L*a*b*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabPlanes {
    /// Lightness, 0..100 scaled onto 0..255.
    pub lightness: Channel,
    /// Green-red axis, offset by +128.
    pub chroma_a: Channel,
    /// Blue-yellow axis, offset by +128.
    pub chroma_b: Channel,
}

impl LabPlanes {
    /// Replaces the lightness plane, keeping both chroma planes as they are.
    pub fn with_lightness(self, lightness: Channel) -> Result<Self> {
        if !lightness.same_dimensions(&self.lightness) {
            return Err(RectifyError::invalid_image(
                "equalized lightness plane changed dimensions",
            ));
        }
        Ok(Self { lightness, ..self })
    }
}

/// A pure, invertible RGB <-> lightness/chroma transform pair.
pub trait PerceptualSpace {
    fn to_planes(&self, image: &RgbImage) -> LabPlanes;
    fn to_rgb(&self, planes: &LabPlanes) -> Result<RgbImage>;
}

/// CIE L*a*b* under D65, with the sRGB transfer curve.
#[derive(Debug, Clone, Copy, Default)]
pub struct CieLab;

impl PerceptualSpace for CieLab {
    fn to_planes(&self, image: &RgbImage) -> LabPlanes {
        let (width, height) = image.dimensions();
        let count = width as usize * height as usize;
        let mut lightness = Vec::with_capacity(count);
        let mut chroma_a = Vec::with_capacity(count);
        let mut chroma_b = Vec::with_capacity(count);

        for pixel in image.pixels() {
            let (l, a, b) = rgb_to_lab(pixel);
            lightness.push(quantize(l * LIGHTNESS_SCALE));
            chroma_a.push(quantize(a + CHROMA_OFFSET));
            chroma_b.push(quantize(b + CHROMA_OFFSET));
        }

        LabPlanes {
            lightness: Channel { width, height, data: lightness },
            chroma_a: Channel { width, height, data: chroma_a },
            chroma_b: Channel { width, height, data: chroma_b },
        }
    }

    fn to_rgb(&self, planes: &LabPlanes) -> Result<RgbImage> {
        let LabPlanes { lightness, chroma_a, chroma_b } = planes;
        if !lightness.same_dimensions(chroma_a) || !lightness.same_dimensions(chroma_b) {
            return Err(RectifyError::invalid_image("L*a*b* planes disagree on dimensions"));
        }

        let mut image = RgbImage::new(lightness.width, lightness.height);
        for (i, pixel) in image.pixels_mut().enumerate() {
            let l = lightness.data[i] as f32 / LIGHTNESS_SCALE;
            let a = chroma_a.data[i] as f32 - CHROMA_OFFSET;
            let b = chroma_b.data[i] as f32 - CHROMA_OFFSET;
            *pixel = lab_to_rgb(l, a, b);
        }
        Ok(image)
    }
}

/// Converts one sRGB pixel to unscaled L*a*b* (L in 0..100, a/b centered on 0).
pub fn rgb_to_lab(pixel: &Rgb<u8>) -> (Lightness, ChromaA, ChromaB) {
    let [r, g, b] = pixel.0.map(srgb_to_linear);

    let x = (RGB_TO_XYZ[0][0] * r + RGB_TO_XYZ[0][1] * g + RGB_TO_XYZ[0][2] * b) / WHITE_X;
    let y = RGB_TO_XYZ[1][0] * r + RGB_TO_XYZ[1][1] * g + RGB_TO_XYZ[1][2] * b;
    let z = (RGB_TO_XYZ[2][0] * r + RGB_TO_XYZ[2][1] * g + RGB_TO_XYZ[2][2] * b) / WHITE_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let lightness = if y > EPSILON { 116.0 * fy - 16.0 } else { KAPPA * y };
    (lightness, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

/// Converts unscaled L*a*b* back to an 8-bit sRGB pixel, clamping out-of-gamut values.
pub fn lab_to_rgb(l: Lightness, a: ChromaA, b: ChromaB) -> Rgb<u8> {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let y = if l > KAPPA * EPSILON { fy * fy * fy } else { l / KAPPA };
    let x = lab_f_inverse(fx) * WHITE_X;
    let z = lab_f_inverse(fz) * WHITE_Z;

    let linear = XYZ_TO_RGB.map(|row| row[0] * x + row[1] * y + row[2] * z);
    Rgb(linear.map(|channel| quantize(linear_to_srgb(channel) * 255.0)))
}

#[inline]
fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

#[inline]
fn lab_f_inverse(f: f32) -> f32 {
    let cubed = f * f * f;
    if cubed > EPSILON {
        cubed
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

#[inline]
fn srgb_to_linear(value: u8) -> f32 {
    let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let normalized = i as f32 / 255.0;
            *entry = if normalized <= 0.04045 {
                normalized / 12.92
            } else {
                ((normalized + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    });
    table[value as usize]
}

#[inline]
fn linear_to_srgb(linear: f32) -> f32 {
    let linear = linear.clamp(0.0, 1.0);
    if linear <= 0.0031308 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

/// Rounds and saturates into the 8-bit domain. NaN maps to 0.
#[inline]
fn quantize(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}
