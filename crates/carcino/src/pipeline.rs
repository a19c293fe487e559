//! The explanation pipeline.
//!
//! Normalize -> infer -> saliency or fallback -> composite -> aggregate.
//! Classification failures abort the call; heatmap failures only degrade
//! the picture.

use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use carcino_core::{CoreError, MetadataCatalog, Result};
use carcino_explain::{generate_saliency, render_overlay, SaliencyOutcome};
use carcino_transforms::{check_extension, ImageNormalizer};

use crate::config::ExplainConfig;
use crate::handle::{ClassifierHandle, ClassifierSlot};
use crate::inference::{run_inference, to_input_tensor};
use crate::result::{ClassProbabilities, Explanation, HeatmapSource};

/// Explains predictions of whatever classifier the slot currently holds.
///
/// # Example
///
/// ```rust,ignore
/// use carcino::prelude::*;
///
/// let slot = Arc::new(ClassifierSlot::with_handle(
///     ClassifierHandle::<DefaultBackend>::from_dir("models/lesion", Default::default())?,
/// ));
/// let explainer = Explainer::new(slot, ExplainConfig::default());
/// let result = explainer.explain_prediction(&std::fs::read("lesion.jpg")?)?;
/// println!("{} ({:.2})", result.prediction, result.confidence);
/// ```
pub struct Explainer<B: AutodiffBackend> {
    slot: Arc<ClassifierSlot<B>>,
    config: ExplainConfig,
    metadata: Option<MetadataCatalog>,
}

impl<B: AutodiffBackend> Explainer<B> {
    /// Create an explainer reading from `slot`.
    pub fn new(slot: Arc<ClassifierSlot<B>>, config: ExplainConfig) -> Self {
        Self {
            slot,
            config,
            metadata: None,
        }
    }

    /// Attach a metadata catalog.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MetadataCatalog) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    /// The slot this explainer reads from.
    pub fn slot(&self) -> &Arc<ClassifierSlot<B>> {
        &self.slot
    }

    /// Advisory extension check, then [`Self::explain_prediction`].
    pub fn explain_upload(&self, file_name: &str, bytes: &[u8]) -> Result<Explanation> {
        check_extension(file_name)?;
        self.explain_prediction(bytes)
    }

    /// Classify `bytes` and explain the prediction.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Inference`] when no classifier is loaded or the
    ///   forward pass fails; checked before anything else.
    /// - [`CoreError::Decode`] / [`CoreError::Shape`] for bad input.
    /// - [`CoreError::BudgetExceeded`] when a budget is set and
    ///   normalization plus inference overran it.
    ///
    /// Saliency and compositing failures never surface here.
    pub fn explain_prediction(&self, bytes: &[u8]) -> Result<Explanation> {
        let handle = self
            .slot
            .current()
            .ok_or_else(|| CoreError::Inference("classifier not loaded".to_string()))?;
        self.explain_with(&handle, bytes)
    }

    fn explain_with(&self, handle: &ClassifierHandle<B>, bytes: &[u8]) -> Result<Explanation> {
        let started = Instant::now();
        let geometry = handle.geometry();

        let image = ImageNormalizer::new(geometry)
            .with_filter(self.config.resize_filter)
            .normalize(bytes)?;
        let input = to_input_tensor::<B>(&image, handle.device());
        tracing::debug!(%geometry, "normalized input");

        let (probabilities, saliency) = {
            let model = handle.lock();
            let probabilities = run_inference(&**model, input.clone(), handle.labels().len())?;
            self.check_budget(started)?;
            let saliency = generate_saliency(&**model, input, geometry);
            (probabilities, saliency)
        };

        let class_probabilities = ClassProbabilities::new(handle.labels(), &probabilities);
        let (label, confidence) = class_probabilities
            .top()
            .map(|(l, p)| (l.to_string(), p))
            .ok_or_else(|| CoreError::Inference("empty probability vector".to_string()))?;
        let high_risk = self.config.is_high_risk(&label);

        let (field, colormap, mut source) = match saliency {
            SaliencyOutcome::Success(map) => {
                (map.into_values(), self.config.saliency_colormap, HeatmapSource::GradCam)
            }
            SaliencyOutcome::Unavailable(_) => {
                let fallback = self.config.fallback.heatmap(confidence, high_risk, geometry);
                (fallback.values, fallback.colormap, HeatmapSource::Fallback)
            }
        };

        let style = self.config.overlay_style(colormap, high_risk, confidence);
        let payload = render_overlay(&image.to_rgb8(), &field, &style);
        if payload.blank {
            source = HeatmapSource::Blank;
        }

        tracing::info!(
            prediction = %label,
            confidence,
            heatmap = ?source,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "explained prediction"
        );

        Ok(Explanation::assemble(
            class_probabilities,
            payload.base64,
            source,
            self.metadata.as_ref(),
        ))
    }

    fn check_budget(&self, started: Instant) -> Result<()> {
        let Some(budget_ms) = self.config.budget_ms else {
            return Ok(());
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > budget_ms {
            tracing::warn!(elapsed_ms, budget_ms, "classification over budget");
            return Err(CoreError::BudgetExceeded {
                elapsed_ms,
                budget_ms,
            });
        }
        Ok(())
    }
}
