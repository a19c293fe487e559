//! Scalar-to-RGB colormaps.

use image::{Rgb, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Colormap applied to an 8-bit quantized heatmap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    /// Blue -> cyan -> yellow -> red.
    #[default]
    Jet,
    /// Black -> red -> yellow -> white.
    Hot,
    /// Cyan -> magenta.
    Cool,
}

fn unit(x: f32) -> u8 {
    (x.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Quantize a `[0, 1]` value to 8 bits. Non-finite values map to zero.
pub fn quantize(value: f32) -> u8 {
    if value.is_finite() {
        unit(value)
    } else {
        0
    }
}

impl Colormap {
    /// Map an 8-bit intensity to a colour.
    pub fn map(self, level: u8) -> Rgb<u8> {
        let x = f32::from(level) / 255.0;
        match self {
            Self::Jet => Rgb([
                unit(1.5 - (4.0 * x - 3.0).abs()),
                unit(1.5 - (4.0 * x - 2.0).abs()),
                unit(1.5 - (4.0 * x - 1.0).abs()),
            ]),
            Self::Hot => Rgb([unit(3.0 * x), unit(3.0 * x - 1.0), unit(3.0 * x - 2.0)]),
            Self::Cool => Rgb([level, 255 - level, 255]),
        }
    }

    /// Quantize a `(H, W)` field and colour every pixel.
    pub fn apply(self, field: &Array2<f32>) -> RgbImage {
        let (height, width) = field.dim();
        RgbImage::from_fn(width as u32, height as u32, |x, y| {
            self.map(quantize(field[[y as usize, x as usize]]))
        })
    }
}
