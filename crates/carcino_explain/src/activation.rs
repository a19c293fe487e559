//! Feature-map and gradient capture through a dual-output pass.

use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use carcino_core::LesionClassifier;

use crate::error::SaliencyUnavailable;

/// Feature map and class scores captured from one forward evaluation.
///
/// The feature map is re-rooted as a gradient-tracked leaf and the head of
/// the classifier runs on that leaf, so the logits and the activations come
/// from the same pass and gradients land on the captured tensor.
#[derive(Debug)]
pub struct FeatureCapture<B: AutodiffBackend> {
    layer: usize,
    features: Tensor<B, 4>,
    logits: Tensor<B, 2>,
    probabilities: Vec<f32>,
    target_class: usize,
}

impl<B: AutodiffBackend> FeatureCapture<B> {
    /// Run the dual-output pass at `layer` on a `(1, H, W, 3)` input.
    pub fn capture(
        classifier: &dyn LesionClassifier<B>,
        input: Tensor<B, 4>,
        layer: usize,
    ) -> Result<Self, SaliencyUnavailable> {
        let features = classifier
            .forward_until(input, layer)
            .map_err(|e| SaliencyUnavailable::Capture(e.to_string()))?
            .detach()
            .require_grad();

        let logits = classifier
            .forward_from(features.clone(), layer)
            .map_err(|e| SaliencyUnavailable::Capture(e.to_string()))?;

        let probabilities: Vec<f32> = softmax(logits.clone(), 1)
            .into_data()
            .to_vec()
            .map_err(|e| SaliencyUnavailable::Capture(format!("{e:?}")))?;

        let target_class = argmax(&probabilities)
            .ok_or_else(|| SaliencyUnavailable::Capture("empty class scores".to_string()))?;

        tracing::debug!(
            layer,
            features = ?features.dims(),
            target_class,
            "captured feature map"
        );

        Ok(Self {
            layer,
            features,
            logits,
            probabilities,
            target_class,
        })
    }

    /// Layer index the features were taken from.
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Class probabilities of the captured pass.
    pub fn probabilities(&self) -> &[f32] {
        &self.probabilities
    }

    /// Argmax class of the captured pass.
    pub fn target_class(&self) -> usize {
        self.target_class
    }

    /// Captured activations, detached from the graph.
    pub fn features(&self) -> Tensor<B::InnerBackend, 4> {
        self.features.clone().inner()
    }

    /// Gradient of the target class logit with respect to the feature map.
    pub fn feature_gradients(&self) -> Result<Tensor<B::InnerBackend, 4>, SaliencyUnavailable> {
        let t = self.target_class;
        let score = self.logits.clone().slice([0..1, t..t + 1]).sum();
        let grads = score.backward();
        self.features.grad(&grads).ok_or_else(|| {
            SaliencyUnavailable::GradientUnavailable(format!(
                "no gradient reached layer {}",
                self.layer
            ))
        })
    }
}

/// Index of the largest finite value; ties resolve to the lowest index.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
