//! Normalized image tensors.

use image::{Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayView3, Axis};

use crate::error::{CoreError, Result};
use crate::geometry::{InputGeometry, CHANNELS};

/// A normalized RGB image with shape `(H, W, 3)` and values in `[0, 1]`.
///
/// Construction validates the channel count and value range, so every
/// `ImageTensor` can be handed to a classifier once its geometry matches.
///
/// # Example
///
/// ```rust
/// use carcino_core::{ImageTensor, InputGeometry};
/// use ndarray::Array3;
///
/// let image = ImageTensor::new(Array3::zeros((8, 8, 3)))?;
/// assert_eq!(image.geometry(), InputGeometry::new(8, 8));
/// assert_eq!(image.batched().shape(), &[1, 8, 8, 3]);
/// # Ok::<(), carcino_core::CoreError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    inner: Array3<f32>,
}

impl ImageTensor {
    /// Wrap an `(H, W, 3)` array of values in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] if the array is not 3-channel, or
    /// [`CoreError::Other`] if any value is non-finite or outside `[0, 1]`.
    pub fn new(inner: Array3<f32>) -> Result<Self> {
        let shape = inner.shape();
        if shape[2] != CHANNELS {
            return Err(CoreError::Shape {
                expected: format!("(H, W, {CHANNELS})"),
                got: format!("{shape:?}"),
            });
        }
        if let Some(bad) = inner
            .iter()
            .find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(CoreError::Other(format!(
                "Pixel value {bad} outside [0, 1]"
            )));
        }
        Ok(Self { inner })
    }

    /// Geometry of this image.
    #[must_use]
    pub fn geometry(&self) -> InputGeometry {
        let shape = self.inner.shape();
        InputGeometry::new(shape[0], shape[1])
    }

    /// Check that the image matches `geometry` exactly.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] on any mismatch.
    pub fn ensure_geometry(&self, geometry: InputGeometry) -> Result<()> {
        if self.inner.shape() != geometry.image_shape() {
            return Err(CoreError::Shape {
                expected: geometry.to_string(),
                got: format!("{:?}", self.inner.shape()),
            });
        }
        Ok(())
    }

    /// View of the underlying `(H, W, 3)` array.
    #[must_use]
    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.inner.view()
    }

    /// Consume self and return the underlying array.
    #[must_use]
    pub fn into_inner(self) -> Array3<f32> {
        self.inner
    }

    /// Batch-wrapped `(1, H, W, 3)` copy used for inference.
    #[must_use]
    pub fn batched(&self) -> Array4<f32> {
        self.inner.clone().insert_axis(Axis(0))
    }

    /// Rescale back to 8-bit RGB pixels.
    #[must_use]
    pub fn to_rgb8(&self) -> RgbImage {
        let geometry = self.geometry();
        let (width, height) = geometry.as_wh_u32();
        RgbImage::from_fn(width, height, |x, y| {
            let (row, col) = (y as usize, x as usize);
            let px = |c: usize| (self.inner[[row, col, c]] * 255.0).round().clamp(0.0, 255.0) as u8;
            Rgb([px(0), px(1), px(2)])
        })
    }
}
