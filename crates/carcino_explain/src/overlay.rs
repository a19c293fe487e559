//! Overlay compositing and payload encoding.
//!
//! A heatmap field is quantized, coloured and alpha-blended onto the 8-bit
//! image; an optional solid border marks high-risk predictions. The result
//! is encoded as PNG and base64 (standard alphabet).

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::colormap::Colormap;
use crate::error::OverlayError;

/// Solid frame drawn around the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Border {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame colour.
    pub color: [u8; 3],
}

/// How to draw one overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    /// Heatmap weight in the blend.
    pub alpha: f32,
    /// Palette for the heatmap.
    pub colormap: Colormap,
    /// Optional frame.
    pub border: Option<Border>,
}

impl OverlayStyle {
    /// Style without a border.
    pub fn new(alpha: f32, colormap: Colormap) -> Self {
        Self {
            alpha,
            colormap,
            border: None,
        }
    }

    /// Add a border.
    #[must_use]
    pub fn with_border(mut self, border: Border) -> Self {
        self.border = Some(border);
        self
    }
}

/// Blend `field` onto `image`: `(1 - alpha) * image + alpha * colour`.
pub fn compose_overlay(
    image: &RgbImage,
    field: &Array2<f32>,
    style: &OverlayStyle,
) -> Result<RgbImage, OverlayError> {
    let (image_w, image_h) = image.dimensions();
    let (heatmap_h, heatmap_w) = field.dim();
    if image_w == 0 || image_h == 0 {
        return Err(OverlayError::Empty);
    }
    if (heatmap_h, heatmap_w) != (image_h as usize, image_w as usize) {
        return Err(OverlayError::SizeMismatch {
            heatmap_h,
            heatmap_w,
            image_h: image_h as usize,
            image_w: image_w as usize,
        });
    }
    if !(0.0..=1.0).contains(&style.alpha) {
        return Err(OverlayError::InvalidAlpha(style.alpha));
    }

    let colored = style.colormap.apply(field);
    let a = style.alpha;
    let mut out = RgbImage::from_fn(image_w, image_h, |x, y| {
        let Rgb(base) = *image.get_pixel(x, y);
        let Rgb(heat) = *colored.get_pixel(x, y);
        let blend = |b: u8, h: u8| -> u8 {
            ((1.0 - a) * f32::from(b) + a * f32::from(h)).round().clamp(0.0, 255.0) as u8
        };
        Rgb([
            blend(base[0], heat[0]),
            blend(base[1], heat[1]),
            blend(base[2], heat[2]),
        ])
    });

    if let Some(border) = style.border {
        draw_border(&mut out, border);
    }
    Ok(out)
}

/// Paint a solid frame of `border.width` pixels along every edge.
pub fn draw_border(image: &mut RgbImage, border: Border) {
    let (w, h) = image.dimensions();
    let t = border.width;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if x < t || y < t || x + t >= w || y + t >= h {
            *pixel = Rgb(border.color);
        }
    }
}

/// Encode as PNG, then base64.
pub fn encode_png_base64(image: &RgbImage) -> Result<String, OverlayError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(STANDARD.encode(buf.into_inner()))
}

/// Base64 PNG of an all-black `width x height` image.
///
/// Returns an empty string only if PNG encoding itself fails.
pub fn blank_payload(width: u32, height: u32) -> String {
    match encode_png_base64(&RgbImage::new(width.max(1), height.max(1))) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "blank heatmap could not be encoded");
            String::new()
        }
    }
}

/// Encoded overlay and whether it is the blank substitute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayPayload {
    /// Base64 PNG.
    pub base64: String,
    /// Set when compositing failed and a blank image was substituted.
    pub blank: bool,
}

/// Compose and encode, substituting a blank same-size image on any failure.
pub fn render_overlay(image: &RgbImage, field: &Array2<f32>, style: &OverlayStyle) -> OverlayPayload {
    match compose_overlay(image, field, style).and_then(|out| encode_png_base64(&out)) {
        Ok(base64) => OverlayPayload {
            base64,
            blank: false,
        },
        Err(e) => {
            tracing::warn!(error = %e, "overlay failed, substituting blank heatmap");
            let (w, h) = image.dimensions();
            OverlayPayload {
                base64: blank_payload(w, h),
                blank: true,
            }
        }
    }
}

/// Decode a base64 PNG payload back to an image.
pub fn decode_payload(payload: &str) -> Result<RgbImage, OverlayError> {
    let bytes = STANDARD.decode(payload)?;
    Ok(image::load_from_memory_with_format(&bytes, ImageFormat::Png)?.to_rgb8())
}
