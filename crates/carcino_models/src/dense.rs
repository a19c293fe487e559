//! Dense baseline classifier without spatial layers.
//!
//! Flattens the whole image and applies one linear layer. It has no
//! convolutional stage, so saliency is never available for it and the
//! explanation pipeline always takes the fallback path.

use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use carcino_core::{CoreError, InputGeometry, LayerDescriptor, LayerKind, LesionClassifier, CHANNELS};
use serde::{Deserialize, Serialize};

/// Configuration for [`DenseClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseClassifierConfig {
    /// Input geometry the flatten layer is sized for.
    pub geometry: InputGeometry,
    /// Number of output classes.
    pub n_classes: usize,
    /// Initialize every weight and bias to this value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_init: Option<f64>,
}

impl DenseClassifierConfig {
    /// Create a new config.
    pub fn new(geometry: InputGeometry, n_classes: usize) -> Self {
        Self {
            geometry,
            n_classes,
            constant_init: None,
        }
    }

    /// Use a constant initializer for every parameter.
    #[must_use]
    pub fn with_constant_init(mut self, value: f64) -> Self {
        self.constant_init = Some(value);
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseClassifier<B> {
        let mut config = LinearConfig::new(self.geometry.pixels() * CHANNELS, self.n_classes);
        if let Some(value) = self.constant_init {
            config = config.with_initializer(Initializer::Constant { value });
        }
        DenseClassifier {
            fc: config.init(device),
        }
    }
}

/// Flatten + linear classifier.
#[derive(Module, Debug)]
pub struct DenseClassifier<B: Backend> {
    fc: Linear<B>,
}

impl<B: Backend> DenseClassifier<B> {
    /// Forward pass on channels-last input, returning logits.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, height, width, channels] = x.dims();
        self.fc.forward(x.reshape([batch, height * width * channels]))
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }
}

impl<B: AutodiffBackend> LesionClassifier<B> for DenseClassifier<B> {
    fn n_classes(&self) -> usize {
        DenseClassifier::n_classes(self)
    }

    fn layers(&self) -> Vec<LayerDescriptor> {
        vec![
            LayerDescriptor::new("flatten", LayerKind::Flatten),
            LayerDescriptor::new("fc", LayerKind::Dense),
        ]
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        DenseClassifier::forward(self, x)
    }

    fn forward_until(&self, _x: Tensor<B, 4>, layer: usize) -> carcino_core::Result<Tensor<B, 4>> {
        Err(CoreError::NotSpatial { layer })
    }

    fn forward_from(
        &self,
        _features: Tensor<B, 4>,
        layer: usize,
    ) -> carcino_core::Result<Tensor<B, 2>> {
        Err(CoreError::NotSpatial { layer })
    }
}
