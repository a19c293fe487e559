//! Image normalization for classifier input.
//!
//! Turns raw encoded image bytes into an [`ImageTensor`] that exactly matches
//! a classifier's declared [`InputGeometry`]:
//! - decode (PNG, JPEG)
//! - force RGB (drop alpha, replicate grayscale)
//! - direct resize to the target geometry, no letterboxing
//! - scale to `[0, 1]`

use std::path::Path;

use carcino_core::{CoreError, ImageTensor, InputGeometry, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb32FImage};
use ndarray::{Array3, Axis};
use serde::{Deserialize, Serialize};

/// File extensions the advisory pre-check accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Check that a caller-declared file name claims to be a supported image.
///
/// This is advisory only: the content is still validated when decoded.
///
/// # Errors
///
/// Returns [`CoreError::UnsupportedExtension`] for missing or unknown extensions.
pub fn check_extension(file_name: &str) -> Result<()> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(CoreError::UnsupportedExtension(format!(
            "'{file_name}' (supported: {})",
            SUPPORTED_EXTENSIONS.join(", ")
        )))
    }
}

/// Scale pixel values to `[0, 1]`.
///
/// Values on the `0..=255` scale are divided by 255; arrays already inside
/// `[0, 1]` are left untouched so repeated preprocessing is idempotent.
#[must_use]
pub fn to_unit_interval(mut pixels: Array3<f32>) -> Array3<f32> {
    let max = pixels.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    if max > 1.0 {
        pixels.mapv_inplace(|v| v / 255.0);
    }
    pixels.mapv_inplace(|v| v.clamp(0.0, 1.0));
    pixels
}

/// Resampling filter used when resizing to the classifier geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Nearest neighbour.
    Nearest,
    /// Bilinear.
    Triangle,
    /// Cubic.
    CatmullRom,
    /// Gaussian.
    Gaussian,
    /// Windowed sinc, 3 lobes.
    Lanczos3,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::Lanczos3
    }
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Configuration for [`ImageNormalizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Target geometry declared by the classifier.
    pub geometry: InputGeometry,
    /// Resampling filter.
    #[serde(default)]
    pub filter: ResizeFilter,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            geometry: InputGeometry::default(),
            filter: ResizeFilter::Lanczos3,
        }
    }
}

/// Decodes and normalizes images for a classifier.
///
/// # Example
///
/// ```rust,ignore
/// use carcino_transforms::ImageNormalizer;
///
/// let normalizer = ImageNormalizer::new(InputGeometry::new(224, 224));
/// let image = normalizer.normalize(&std::fs::read("lesion.png")?)?;
/// assert_eq!(image.batched().shape(), &[1, 224, 224, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    /// Create a normalizer for `geometry` with the default Lanczos3 filter.
    #[must_use]
    pub fn new(geometry: InputGeometry) -> Self {
        Self {
            config: NormalizerConfig {
                geometry,
                ..Default::default()
            },
        }
    }

    /// Create from config.
    #[must_use]
    pub fn from_config(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Set the resampling filter.
    #[must_use]
    pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
        self.config.filter = filter;
        self
    }

    /// Target geometry.
    #[must_use]
    pub fn geometry(&self) -> InputGeometry {
        self.config.geometry
    }

    /// Decode raw bytes into a pixel grid.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decode`] if the bytes are not a valid image.
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| CoreError::Decode(e.to_string()))
    }

    /// Decode and normalize raw image bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Decode`] for invalid bytes and [`CoreError::Shape`]
    /// if the result does not match the target geometry.
    pub fn normalize(&self, bytes: &[u8]) -> Result<ImageTensor> {
        let image = self.decode(bytes)?;
        tracing::debug!(
            "Decoded {}x{} image ({:?})",
            image.width(),
            image.height(),
            image.color()
        );
        self.normalize_image(&image)
    }

    /// Normalize an already decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] if the result does not match the target geometry.
    pub fn normalize_image(&self, image: &DynamicImage) -> Result<ImageTensor> {
        self.ensure_target()?;
        let (width, height) = self.config.geometry.as_wh_u32();
        let float_source = matches!(
            image,
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
        );

        let rgb = if float_source {
            DynamicImage::ImageRgb32F(image.to_rgb32f())
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };
        let rgb = if rgb.width() == width && rgb.height() == height {
            rgb
        } else {
            rgb.resize_exact(width, height, self.config.filter.into())
        };

        let (w, h) = (rgb.width() as usize, rgb.height() as usize);
        let pixels = if float_source {
            let raw = rgb.to_rgb32f().into_raw();
            to_unit_interval(pixel_grid(raw, h, w)?)
        } else {
            let raw: Vec<f32> = rgb
                .to_rgb8()
                .into_raw()
                .into_iter()
                .map(|v| f32::from(v) / 255.0)
                .collect();
            pixel_grid(raw, h, w)?
        };

        self.finish(pixels)
    }

    /// Normalize a raw `(H, W, C)` pixel array with `C` in `{1, 3, 4}`.
    ///
    /// Values may be on the `0..=255` scale or already in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] for unsupported channel counts.
    pub fn normalize_array(&self, pixels: Array3<f32>) -> Result<ImageTensor> {
        self.ensure_target()?;
        let channels = pixels.shape()[2];
        let rgb = match channels {
            3 => pixels,
            4 => pixels.slice_move(ndarray::s![.., .., 0..3]),
            1 => ndarray::concatenate(
                Axis(2),
                &[pixels.view(), pixels.view(), pixels.view()],
            )
            .map_err(|e| CoreError::Shape {
                expected: "(H, W, 3)".to_string(),
                got: e.to_string(),
            })?,
            _ => {
                return Err(CoreError::Shape {
                    expected: "(H, W, 1 | 3 | 4)".to_string(),
                    got: format!("{:?}", pixels.shape()),
                })
            }
        };
        let rgb = to_unit_interval(rgb.as_standard_layout().into_owned());

        let geometry = self.config.geometry;
        if rgb.shape() == geometry.image_shape() {
            return self.finish(rgb);
        }

        let (h, w) = (rgb.shape()[0], rgb.shape()[1]);
        let raw: Vec<f32> = rgb.iter().copied().collect();
        let buffer = Rgb32FImage::from_raw(w as u32, h as u32, raw).ok_or_else(|| {
            CoreError::Shape {
                expected: format!("({h}, {w}, 3) buffer"),
                got: "short buffer".to_string(),
            }
        })?;
        let (width, height) = geometry.as_wh_u32();
        let resized = imageops::resize(&buffer, width, height, self.config.filter.into());
        let pixels = pixel_grid(resized.into_raw(), height as usize, width as usize)?;
        self.finish(pixels.mapv(|v| v.clamp(0.0, 1.0)))
    }

    fn ensure_target(&self) -> Result<()> {
        if self.config.geometry.is_empty() {
            return Err(CoreError::InvalidContract(format!(
                "Empty input geometry {}",
                self.config.geometry
            )));
        }
        Ok(())
    }

    fn finish(&self, pixels: Array3<f32>) -> Result<ImageTensor> {
        let tensor = ImageTensor::new(pixels)?;
        tensor.ensure_geometry(self.config.geometry)?;
        Ok(tensor)
    }
}

fn pixel_grid(raw: Vec<f32>, height: usize, width: usize) -> Result<Array3<f32>> {
    let len = raw.len();
    Array3::from_shape_vec((height, width, 3), raw).map_err(|_| CoreError::Shape {
        expected: format!("({height}, {width}, 3)"),
        got: format!("{len} values"),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn encode_png(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn random_rgb(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
    }

    #[test]
    fn test_check_extension() {
        assert!(check_extension("lesion.png").is_ok());
        assert!(check_extension("lesion.JPG").is_ok());
        assert!(check_extension("dir/lesion.jpeg").is_ok());
        assert!(matches!(
            check_extension("lesion.gif"),
            Err(CoreError::UnsupportedExtension(_))
        ));
        assert!(check_extension("lesion").is_err());
    }

    #[test]
    fn test_to_unit_interval() {
        let scaled = to_unit_interval(Array3::from_elem((2, 2, 3), 255.0));
        assert!(scaled.iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let unit = Array3::from_elem((2, 2, 3), 0.25);
        assert_eq!(to_unit_interval(unit.clone()), unit);
    }

    #[test]
    fn test_normalize_black_image_to_geometry() {
        let bytes = encode_png(DynamicImage::ImageRgb8(RgbImage::new(8, 8)));
        let normalizer = ImageNormalizer::new(InputGeometry::new(32, 32));

        let image = normalizer.normalize(&bytes).unwrap();
        let batch = image.batched();

        assert_eq!(batch.shape(), &[1, 32, 32, 3]);
        assert!(batch.iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn test_normalize_ignores_aspect_ratio() {
        let bytes = encode_png(DynamicImage::ImageRgb8(random_rgb(40, 10, 7)));
        let normalizer = ImageNormalizer::new(InputGeometry::new(16, 16));

        let image = normalizer.normalize(&bytes).unwrap();
        assert_eq!(image.geometry(), InputGeometry::new(16, 16));
    }

    #[test]
    fn test_normalize_values_in_unit_interval() {
        let bytes = encode_png(DynamicImage::ImageRgb8(random_rgb(50, 30, 42)));
        let normalizer = ImageNormalizer::new(InputGeometry::new(24, 24));

        let image = normalizer.normalize(&bytes).unwrap();
        assert!(image.view().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_normalize_drops_alpha() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 10]));
        let bytes = encode_png(DynamicImage::ImageRgba8(rgba));
        let normalizer = ImageNormalizer::new(InputGeometry::new(4, 4));

        let image = normalizer.normalize(&bytes).unwrap();
        let view = image.view();
        assert_eq!(view.shape(), &[4, 4, 3]);
        assert!((view[[2, 2, 0]] - 1.0).abs() < 1e-6);
        assert!(view[[2, 2, 1]].abs() < 1e-6);
    }

    #[test]
    fn test_normalize_replicates_grayscale() {
        let gray = GrayImage::from_pixel(6, 6, Luma([51]));
        let bytes = encode_png(DynamicImage::ImageLuma8(gray));
        let normalizer = ImageNormalizer::new(InputGeometry::new(6, 6));

        let image = normalizer.normalize(&bytes).unwrap();
        let view = image.view();
        for c in 0..3 {
            assert!((view[[3, 3, c]] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_rejects_truncated_bytes() {
        let bytes = encode_png(DynamicImage::ImageRgb8(random_rgb(8, 8, 1)));
        let normalizer = ImageNormalizer::new(InputGeometry::new(8, 8));

        let result = normalizer.normalize(&bytes[..16]);
        assert!(matches!(result, Err(CoreError::Decode(_))));
        assert!(matches!(
            normalizer.normalize(b"not an image"),
            Err(CoreError::Decode(_))
        ));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let geometry = InputGeometry::new(20, 20);
        let normalizer = ImageNormalizer::new(geometry);
        let bytes = encode_png(DynamicImage::ImageRgb8(random_rgb(20, 20, 3)));

        let first = normalizer.normalize(&bytes).unwrap();
        let round_trip = encode_png(DynamicImage::ImageRgb8(first.to_rgb8()));
        let second = normalizer.normalize(&round_trip).unwrap();

        let max_diff = first
            .view()
            .iter()
            .zip(second.view().iter())
            .fold(0.0f32, |m, (a, b)| m.max((a - b).abs()));
        assert!(max_diff < 1e-5, "max diff {max_diff}");

        let again = normalizer.normalize_array(first.clone().into_inner()).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn test_normalize_array_channels() {
        let normalizer = ImageNormalizer::new(InputGeometry::new(4, 4));

        let rgba = Array3::from_elem((4, 4, 4), 255.0);
        let image = normalizer.normalize_array(rgba).unwrap();
        assert!(image.view().iter().all(|&v| (v - 1.0).abs() < 1e-6));

        let gray = Array3::from_elem((8, 8, 1), 0.5);
        let image = normalizer.normalize_array(gray).unwrap();
        assert_eq!(image.geometry(), InputGeometry::new(4, 4));
        assert!(image.view().iter().all(|&v| (v - 0.5).abs() < 1e-3));

        let two = Array3::<f32>::zeros((4, 4, 2));
        assert!(matches!(
            normalizer.normalize_array(two),
            Err(CoreError::Shape { .. })
        ));
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let normalizer = ImageNormalizer::new(InputGeometry::new(0, 0));
        let bytes = encode_png(DynamicImage::ImageRgb8(RgbImage::new(2, 2)));
        assert!(matches!(
            normalizer.normalize(&bytes),
            Err(CoreError::InvalidContract(_))
        ));
    }

    #[test]
    fn test_config_serde() {
        let config = NormalizerConfig {
            geometry: InputGeometry::new(128, 128),
            filter: ResizeFilter::Triangle,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"triangle\""));
        let restored: NormalizerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
