//! Attribution map computation.

use burn::prelude::*;
use ndarray::Array2;

use crate::error::SaliencyUnavailable;

/// Rectified class-activation map over feature-map positions.
#[derive(Debug, Clone)]
pub struct AttributionMap<B: Backend> {
    /// The attribution values, shape (batch, height', width').
    pub values: Tensor<B, 3>,
    /// Target class the gradients were taken for.
    pub target_class: Option<usize>,
}

impl<B: Backend> AttributionMap<B> {
    /// Create a new attribution map.
    pub fn new(values: Tensor<B, 3>) -> Self {
        Self {
            values,
            target_class: None,
        }
    }

    /// Set the target class.
    #[must_use]
    pub fn with_target_class(mut self, class: usize) -> Self {
        self.target_class = Some(class);
        self
    }

    /// Get the shape of the attribution map.
    pub fn shape(&self) -> [usize; 3] {
        self.values.dims()
    }

    /// Copy the first batch item to the host as a `(height', width')` array.
    pub fn to_array(&self) -> Result<Array2<f32>, SaliencyUnavailable> {
        let [_, height, width] = self.shape();
        let data: Vec<f32> = self
            .values
            .clone()
            .slice([0..1, 0..height, 0..width])
            .into_data()
            .to_vec()
            .map_err(|e| SaliencyUnavailable::Capture(format!("{e:?}")))?;
        Array2::from_shape_vec((height, width), data)
            .map_err(|e| SaliencyUnavailable::Capture(e.to_string()))
    }
}

/// Compute Grad-CAM for CNN feature maps.
///
/// # Arguments
///
/// * `activations` - Activations from the target conv layer (batch, channels, h, w)
/// * `gradients` - Gradients w.r.t. activations (batch, channels, h, w)
///
/// # Returns
///
/// Attribution map of shape (batch, h, w).
pub fn grad_cam<B: Backend>(activations: Tensor<B, 4>, gradients: Tensor<B, 4>) -> AttributionMap<B> {
    // (batch, channels, h, w) -> (batch, channels, 1, 1)
    let weights = gradients.mean_dim(2).mean_dim(3);

    let weighted = activations * weights;

    // (batch, channels, h, w) -> (batch, 1, h, w)
    let cam = weighted.sum_dim(1);

    // ReLU
    let cam = cam.clamp_min(0.0);

    AttributionMap::new(cam.squeeze::<3>(1))
}
