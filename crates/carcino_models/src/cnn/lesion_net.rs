//! LesionNet: a compact CNN for dermoscopic lesion classification.
//!
//! The network stacks 3x3 convolution blocks (Conv2d -> ReLU -> optional
//! 2x2 max pool), collapses the spatial dimensions with global average
//! pooling and classifies with a single linear layer. The last convolution
//! is the Grad-CAM target.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use carcino_core::{CoreError, InputGeometry, LayerDescriptor, LayerKind, LesionClassifier};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointError, Result};

/// Configuration for the LesionNet model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LesionNetConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Output channels of each conv block, in order.
    pub filters: Vec<usize>,
    /// Square kernel size of every convolution.
    pub kernel_size: usize,
    /// Whether each block ends with a 2x2 max pool.
    pub pool: bool,
    /// Initialize every weight and bias to this value (deterministic test models).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_init: Option<f64>,
}

impl Default for LesionNetConfig {
    fn default() -> Self {
        Self {
            n_classes: 2,
            filters: vec![16, 32, 64],
            kernel_size: 3,
            pool: true,
            constant_init: None,
        }
    }
}

impl LesionNetConfig {
    /// Create a new config with the default block layout.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            ..Default::default()
        }
    }

    /// Set the output channels of each conv block.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<usize>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the kernel size.
    #[must_use]
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    /// Enable/disable max pooling after each block.
    #[must_use]
    pub fn with_pool(mut self, pool: bool) -> Self {
        self.pool = pool;
        self
    }

    /// Use a constant initializer for every parameter.
    #[must_use]
    pub fn with_constant_init(mut self, value: f64) -> Self {
        self.constant_init = Some(value);
        self
    }

    /// Number of 2x2 max pools the input passes through.
    pub fn pool_depth(&self) -> usize {
        if self.pool {
            self.filters.len()
        } else {
            0
        }
    }

    /// Smallest input side that survives every max pool.
    pub fn min_input_side(&self) -> usize {
        1usize
            .checked_shl(self.pool_depth() as u32)
            .unwrap_or(usize::MAX)
    }

    /// Check the hyperparameters and that `geometry` fits the pool depth.
    ///
    /// Same padding needs an odd kernel, and every pool needs at least a
    /// 2x2 input.
    pub fn validate(&self, geometry: InputGeometry) -> Result<()> {
        if self.n_classes == 0 {
            return Err(CheckpointError::InvalidFormat("n_classes must be > 0".to_string()));
        }
        if self.filters.is_empty() || self.filters.contains(&0) {
            return Err(CheckpointError::InvalidFormat(format!(
                "filters must be non-empty and positive, got {:?}",
                self.filters
            )));
        }
        if self.kernel_size % 2 == 0 {
            return Err(CheckpointError::InvalidFormat(format!(
                "kernel_size must be odd for same padding, got {}",
                self.kernel_size
            )));
        }
        let min_side = self.min_input_side();
        if geometry.height().min(geometry.width()) < min_side {
            return Err(CheckpointError::InvalidFormat(format!(
                "input {geometry} too small for {} max pools (need at least {min_side}x{min_side})",
                self.pool_depth()
            )));
        }
        Ok(())
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> LesionNet<B> {
        LesionNet::new(self.clone(), device)
    }
}

/// A single convolutional block: Conv2d -> ReLU -> optional MaxPool2d.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    /// Convolutional layer.
    conv: Conv2d<B>,
    /// Optional 2x2 max pool.
    pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        pool: bool,
        initializer: Option<Initializer>,
        device: &B::Device,
    ) -> Self {
        let mut config = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same);
        if let Some(initializer) = initializer {
            config = config.with_initializer(initializer);
        }
        let conv = config.init(device);

        let pool = pool.then(|| MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init());

        Self { conv, pool }
    }

    /// Convolution followed by ReLU.
    pub fn forward_conv(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        Relu::new().forward(self.conv.forward(x))
    }

    /// Max pool, or identity when the block has no pool.
    pub fn forward_pool(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }

    /// Forward pass through the whole block.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.forward_conv(x);
        self.forward_pool(out)
    }
}

/// Execution stages in declaration order; indices match [`LesionNet::layers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Conv(usize),
    Pool(usize),
    GlobalPool,
    Classifier,
}

/// Compact CNN for lesion classification.
///
/// Architecture (default config):
/// - Conv2d(3, 16, 3x3) -> ReLU -> MaxPool(2)
/// - Conv2d(16, 32, 3x3) -> ReLU -> MaxPool(2)
/// - Conv2d(32, 64, 3x3) -> ReLU -> MaxPool(2)
/// - Global Average Pooling
/// - Linear(64, n_classes)
///
/// Input is channels-last `(batch, H, W, 3)`; it is permuted to
/// channels-first internally.
///
/// # Example
///
/// ```rust,ignore
/// use carcino_models::LesionNetConfig;
///
/// let model = LesionNetConfig::new(2).init::<Autodiff<NdArray>>(&device);
/// let x = Tensor::zeros([1, 224, 224, 3], &device);
/// let logits = model.forward(x); // [1, 2]
/// ```
#[derive(Module, Debug)]
pub struct LesionNet<B: Backend> {
    /// Convolutional blocks.
    blocks: Vec<ConvBlock<B>>,
    /// Global average pooling.
    gap: AdaptiveAvgPool2d,
    /// Final linear classifier.
    fc: Linear<B>,
}

impl<B: Backend> LesionNet<B> {
    /// Create a new LesionNet model.
    pub fn new(config: LesionNetConfig, device: &B::Device) -> Self {
        let initializer = config
            .constant_init
            .map(|value| Initializer::Constant { value });

        let mut blocks = Vec::with_capacity(config.filters.len());
        let mut in_channels = 3;
        for &out_channels in &config.filters {
            blocks.push(ConvBlock::new(
                in_channels,
                out_channels,
                config.kernel_size,
                config.pool,
                initializer.clone(),
                device,
            ));
            in_channels = out_channels;
        }

        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let mut fc_config = LinearConfig::new(in_channels, config.n_classes);
        if let Some(initializer) = initializer {
            fc_config = fc_config.with_initializer(initializer);
        }
        let fc = fc_config.init(device);

        Self { blocks, gap, fc }
    }

    fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(self.blocks.len() * 2 + 2);
        for (i, block) in self.blocks.iter().enumerate() {
            stages.push(Stage::Conv(i));
            if block.pool.is_some() {
                stages.push(Stage::Pool(i));
            }
        }
        stages.push(Stage::GlobalPool);
        stages.push(Stage::Classifier);
        stages
    }

    fn apply(&self, stage: Stage, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match stage {
            Stage::Conv(i) => self.blocks[i].forward_conv(x),
            Stage::Pool(i) => self.blocks[i].forward_pool(x),
            Stage::GlobalPool => self.gap.forward(x),
            Stage::Classifier => x,
        }
    }

    fn classify(&self, pooled: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, channels, _, _] = pooled.dims();
        self.fc.forward(pooled.reshape([batch, channels]))
    }

    /// Check that `layer` names a stage with spatial output.
    fn spatial_stage(&self, layer: usize) -> carcino_core::Result<usize> {
        let stages = self.stages();
        match stages.get(layer) {
            Some(Stage::Conv(_) | Stage::Pool(_) | Stage::GlobalPool) => Ok(stages.len()),
            _ => Err(CoreError::NotSpatial { layer }),
        }
    }

    /// Forward pass on channels-last input, returning logits.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut out = x.permute([0, 3, 1, 2]);
        for stage in self.stages() {
            out = self.apply(stage, out);
        }
        self.classify(out)
    }

    /// Number of output classes.
    pub fn n_classes(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }

    /// Layer descriptors in declaration order.
    pub fn layers(&self) -> Vec<LayerDescriptor> {
        self.stages()
            .into_iter()
            .map(|stage| match stage {
                Stage::Conv(i) => LayerDescriptor::new(format!("conv{}", i + 1), LayerKind::Conv2d),
                Stage::Pool(i) => LayerDescriptor::new(format!("pool{}", i + 1), LayerKind::Pool),
                Stage::GlobalPool => LayerDescriptor::new("gap", LayerKind::GlobalPool),
                Stage::Classifier => LayerDescriptor::new("fc", LayerKind::Dense),
            })
            .collect()
    }
}

impl<B: AutodiffBackend> LesionClassifier<B> for LesionNet<B> {
    fn n_classes(&self) -> usize {
        LesionNet::n_classes(self)
    }

    fn layers(&self) -> Vec<LayerDescriptor> {
        LesionNet::layers(self)
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        LesionNet::forward(self, x)
    }

    fn forward_until(&self, x: Tensor<B, 4>, layer: usize) -> carcino_core::Result<Tensor<B, 4>> {
        self.spatial_stage(layer)?;
        let mut out = x.permute([0, 3, 1, 2]);
        for stage in self.stages().into_iter().take(layer + 1) {
            out = self.apply(stage, out);
        }
        Ok(out)
    }

    fn forward_from(
        &self,
        features: Tensor<B, 4>,
        layer: usize,
    ) -> carcino_core::Result<Tensor<B, 2>> {
        self.spatial_stage(layer)?;
        let mut out = features;
        for stage in self.stages().into_iter().skip(layer + 1) {
            out = self.apply(stage, out);
        }
        Ok(self.classify(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carcino_core::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_lesion_net_config_default() {
        let config = LesionNetConfig::default();
        assert_eq!(config.n_classes, 2);
        assert_eq!(config.filters, vec![16, 32, 64]);
        assert_eq!(config.kernel_size, 3);
        assert!(config.pool);
        assert!(config.constant_init.is_none());
    }

    #[test]
    fn test_lesion_net_config_builder() {
        let config = LesionNetConfig::new(4)
            .with_filters(vec![8])
            .with_kernel_size(5)
            .with_pool(false)
            .with_constant_init(0.1);
        assert_eq!(config.n_classes, 4);
        assert_eq!(config.filters, vec![8]);
        assert_eq!(config.kernel_size, 5);
        assert!(!config.pool);
        assert_eq!(config.constant_init, Some(0.1));
    }

    #[test]
    fn test_validate_geometry_against_pool_depth() {
        let config = LesionNetConfig::new(2);
        assert_eq!(config.pool_depth(), 3);
        assert_eq!(config.min_input_side(), 8);

        assert!(config.validate(InputGeometry::new(8, 8)).is_ok());
        assert!(matches!(
            config.validate(InputGeometry::new(4, 4)),
            Err(CheckpointError::InvalidFormat(_))
        ));
        assert!(config.validate(InputGeometry::new(64, 7)).is_err());

        let unpooled = config.with_pool(false);
        assert_eq!(unpooled.min_input_side(), 1);
        assert!(unpooled.validate(InputGeometry::new(1, 1)).is_ok());
    }

    #[test]
    fn test_validate_rejects_unbuildable_configs() {
        let geometry = InputGeometry::new(32, 32);
        let even = LesionNetConfig::new(2).with_filters(vec![4]).with_kernel_size(2);
        assert!(matches!(even.validate(geometry), Err(CheckpointError::InvalidFormat(_))));
        assert!(LesionNetConfig::new(2).with_kernel_size(0).validate(geometry).is_err());
        assert!(LesionNetConfig::new(2).with_filters(vec![]).validate(geometry).is_err());
        assert!(LesionNetConfig::new(2).with_filters(vec![4, 0]).validate(geometry).is_err());
        assert!(LesionNetConfig::new(0).validate(geometry).is_err());
        assert!(LesionNetConfig::new(2).with_kernel_size(5).validate(geometry).is_ok());
    }

    #[test]
    fn test_lesion_net_layers() {
        let device = Default::default();
        let model = LesionNetConfig::new(2)
            .with_filters(vec![4, 8])
            .init::<TestBackend>(&device);

        let names: Vec<String> = model.layers().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["conv1", "pool1", "conv2", "pool2", "gap", "fc"]);
        assert_eq!(LesionClassifier::last_spatial_layer(&model), Some(2));
        assert_eq!(LesionClassifier::n_classes(&model), 2);
    }

    #[test]
    fn test_lesion_net_forward_shape() {
        let device = Default::default();
        let model = LesionNetConfig::new(3)
            .with_filters(vec![4, 8])
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::zeros([1, 16, 16, 3], &device);
        let logits = LesionNet::forward(&model, x);
        assert_eq!(logits.dims(), [1, 3]);
    }

    #[test]
    fn test_forward_until_then_from_matches_forward() {
        let device = Default::default();
        let model = LesionNetConfig::new(2)
            .with_filters(vec![4, 6])
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::random(
            [1, 12, 12, 3],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let layer = LesionClassifier::last_spatial_layer(&model).unwrap();

        let features = model.forward_until(x.clone(), layer).unwrap();
        assert_eq!(features.dims(), [1, 6, 6, 6]);

        let split: Vec<f32> = model
            .forward_from(features, layer)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        let full: Vec<f32> = LesionNet::forward(&model, x).into_data().to_vec().unwrap();
        for (a, b) in split.iter().zip(full.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_classifier_layer_is_not_spatial() {
        let device = Default::default();
        let model = LesionNetConfig::new(2)
            .with_filters(vec![4])
            .init::<TestBackend>(&device);
        let fc = model.layers().len() - 1;

        let x = Tensor::<TestBackend, 4>::zeros([1, 8, 8, 3], &device);
        assert!(matches!(
            model.forward_until(x, fc),
            Err(CoreError::NotSpatial { .. })
        ));
    }

    #[test]
    fn test_config_serde() {
        let config = LesionNetConfig::new(2).with_filters(vec![8, 16]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("constant_init"));
        let restored: LesionNetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
