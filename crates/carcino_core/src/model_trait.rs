//! Classifier traits for explanation.
//!
//! Defines the contract a frozen classifier exposes to the inference engine
//! and the saliency generator.

use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of a classifier layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// 2D convolution (with its fused activation).
    Conv2d,
    /// Standalone element-wise activation.
    Activation,
    /// Local spatial pooling.
    Pool,
    /// Global pooling collapsing the spatial dimensions.
    GlobalPool,
    /// Flattening to a feature vector.
    Flatten,
    /// Fully connected layer.
    Dense,
}

/// Declared description of one classifier layer, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Layer name, unique within the classifier.
    pub name: String,
    /// Layer kind.
    pub kind: LayerKind,
    /// Whether this layer outputs spatial features suitable for Grad-CAM.
    pub spatial_feature_extractor: bool,
}

impl LayerDescriptor {
    /// Create a descriptor; convolutions are tagged as spatial feature extractors.
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            spatial_feature_extractor: kind == LayerKind::Conv2d,
        }
    }
}

/// Trait for frozen lesion classifiers.
///
/// Inputs are channels-last `(1, H, W, 3)` tensors with values in `[0, 1]`.
/// Implementations never mutate their weights.
pub trait LesionClassifier<B: AutodiffBackend>: Send {
    /// Number of output classes.
    fn n_classes(&self) -> usize;

    /// Layer descriptors in declaration order.
    fn layers(&self) -> Vec<LayerDescriptor>;

    /// Forward pass returning logits of shape `(batch, n_classes)`.
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Forward pass returning probabilities.
    fn forward_probs(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Run the network up to and including `layer`, returning its
    /// `(batch, channels, H', W')` output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotSpatial`] if `layer` has no spatial output.
    fn forward_until(&self, x: Tensor<B, 4>, layer: usize) -> Result<Tensor<B, 4>>;

    /// Run the remaining layers after `layer` on its output, returning logits.
    ///
    /// `forward_from(forward_until(x, l), l)` equals `forward(x)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NotSpatial`] if `layer` has no spatial output.
    fn forward_from(&self, features: Tensor<B, 4>, layer: usize) -> Result<Tensor<B, 2>>;

    /// Index of the last spatial feature extractor, if any.
    fn last_spatial_layer(&self) -> Option<usize> {
        self.layers()
            .iter()
            .rposition(|layer| layer.spatial_feature_extractor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Autodiff, NdArray};
    use crate::error::CoreError;

    type TestBackend = Autodiff<NdArray>;

    struct MeanClassifier;

    impl LesionClassifier<TestBackend> for MeanClassifier {
        fn n_classes(&self) -> usize {
            2
        }

        fn layers(&self) -> Vec<LayerDescriptor> {
            vec![
                LayerDescriptor::new("conv1", LayerKind::Conv2d),
                LayerDescriptor::new("conv2", LayerKind::Conv2d),
                LayerDescriptor::new("gap", LayerKind::GlobalPool),
                LayerDescriptor::new("fc", LayerKind::Dense),
            ]
        }

        fn forward(&self, x: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            let mean = x.mean().reshape([1, 1]);
            Tensor::cat(vec![mean.clone().neg(), mean], 1)
        }

        fn forward_until(
            &self,
            _x: Tensor<TestBackend, 4>,
            layer: usize,
        ) -> Result<Tensor<TestBackend, 4>> {
            Err(CoreError::NotSpatial { layer })
        }

        fn forward_from(
            &self,
            _features: Tensor<TestBackend, 4>,
            layer: usize,
        ) -> Result<Tensor<TestBackend, 2>> {
            Err(CoreError::NotSpatial { layer })
        }
    }

    #[test]
    fn test_descriptor_spatial_tag() {
        assert!(LayerDescriptor::new("c", LayerKind::Conv2d).spatial_feature_extractor);
        assert!(!LayerDescriptor::new("p", LayerKind::Pool).spatial_feature_extractor);
        assert!(!LayerDescriptor::new("d", LayerKind::Dense).spatial_feature_extractor);
    }

    #[test]
    fn test_last_spatial_layer() {
        assert_eq!(MeanClassifier.last_spatial_layer(), Some(1));
    }

    #[test]
    fn test_forward_probs_sum_to_one() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 4, 4, 3], &device) * 0.5;
        let probs: Vec<f32> = MeanClassifier
            .forward_probs(x)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs[1] > probs[0]);
    }
}
