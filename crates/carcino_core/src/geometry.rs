//! Classifier input geometry.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Number of colour channels every classifier consumes (RGB).
pub const CHANNELS: usize = 3;

/// Input resolution declared by a trained classifier.
///
/// Images are always resized directly to `(height, width)`; no letterboxing.
///
/// # Example
///
/// ```rust
/// use carcino_core::InputGeometry;
///
/// let geometry = InputGeometry::new(224, 224);
/// assert_eq!(geometry.height(), 224);
/// assert_eq!(geometry.image_shape(), [224, 224, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputGeometry {
    height: usize,
    width: usize,
}

impl InputGeometry {
    /// Create a new geometry.
    #[must_use]
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Create a geometry from a slice of dimensions.
    ///
    /// Accepts `[H, W]`, `[H, W, 3]` or `[1, H, W, 3]`.
    ///
    /// # Errors
    ///
    /// Returns an error for any other layout.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match *dims {
            [height, width] | [height, width, CHANNELS] | [1, height, width, CHANNELS] => {
                Ok(Self::new(height, width))
            }
            _ => Err(CoreError::Shape {
                expected: "[H, W], [H, W, 3] or [1, H, W, 3]".to_string(),
                got: format!("{dims:?}"),
            }),
        }
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Number of pixels.
    #[must_use]
    pub const fn pixels(&self) -> usize {
        self.height * self.width
    }

    /// `(H, W, 3)` shape of a normalized image.
    #[must_use]
    pub const fn image_shape(&self) -> [usize; 3] {
        [self.height, self.width, CHANNELS]
    }

    /// `(1, H, W, 3)` shape of the inference input.
    #[must_use]
    pub const fn batched_shape(&self) -> [usize; 4] {
        [1, self.height, self.width, CHANNELS]
    }

    /// Dimensions as `(width, height)` in the order image libraries expect.
    #[must_use]
    pub const fn as_wh_u32(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }
}

impl Default for InputGeometry {
    fn default() -> Self {
        Self::new(224, 224)
    }
}

impl std::fmt::Display for InputGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, CHANNELS)
    }
}

impl From<(usize, usize)> for InputGeometry {
    fn from((height, width): (usize, usize)) -> Self {
        Self::new(height, width)
    }
}
