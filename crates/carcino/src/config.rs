//! Explanation pipeline configuration.

use std::path::Path;

use carcino_core::{CoreError, Result};
use carcino_explain::{Border, Colormap, FallbackStrategy, OverlayStyle};
use carcino_transforms::ResizeFilter;
use serde::{Deserialize, Serialize};

/// When to frame the overlay with a solid risk-coloured border.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderPolicy {
    /// Draw borders at all.
    pub enabled: bool,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame colour.
    pub color: [u8; 3],
    /// Border only when confidence is strictly above this.
    pub min_confidence: f32,
}

impl Default for BorderPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 8,
            color: [220, 30, 31],
            min_confidence: 0.7,
        }
    }
}

impl BorderPolicy {
    /// Border for a prediction, if the policy calls for one.
    pub fn border_for(&self, high_risk: bool, confidence: f32) -> Option<Border> {
        (self.enabled && high_risk && confidence > self.min_confidence).then_some(Border {
            width: self.width,
            color: self.color,
        })
    }
}

/// Configuration for [`crate::Explainer`].
///
/// # Example
///
/// ```rust
/// use carcino::ExplainConfig;
/// use carcino_explain::FallbackStrategy;
///
/// let config = ExplainConfig::default()
///     .with_fallback(FallbackStrategy::Hotspots)
///     .with_budget_ms(2_000);
/// assert_eq!(config.alpha, 0.4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Synthetic field drawn when saliency is unavailable.
    pub fallback: FallbackStrategy,
    /// Palette for Grad-CAM maps.
    pub saliency_colormap: Colormap,
    /// Heatmap blend weight for ordinary predictions.
    pub alpha: f32,
    /// Heatmap blend weight for high-risk predictions.
    pub high_risk_alpha: f32,
    /// Labels treated as high risk.
    pub high_risk_labels: Vec<String>,
    /// Border policy.
    pub border: BorderPolicy,
    /// Resampling filter for the normalizer.
    pub resize_filter: ResizeFilter,
    /// Wall-clock budget for normalization and inference, in milliseconds.
    pub budget_ms: Option<u64>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackStrategy::UniformConfidence,
            saliency_colormap: Colormap::Jet,
            alpha: 0.4,
            high_risk_alpha: 0.5,
            high_risk_labels: vec!["Carcinoma".to_string()],
            border: BorderPolicy::default(),
            resize_filter: ResizeFilter::default(),
            budget_ms: None,
        }
    }
}

impl ExplainConfig {
    /// Set the fallback strategy.
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set the saliency colormap.
    #[must_use]
    pub fn with_saliency_colormap(mut self, colormap: Colormap) -> Self {
        self.saliency_colormap = colormap;
        self
    }

    /// Set both blend weights.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f32, high_risk_alpha: f32) -> Self {
        self.alpha = alpha;
        self.high_risk_alpha = high_risk_alpha;
        self
    }

    /// Set the high-risk label set.
    #[must_use]
    pub fn with_high_risk_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.high_risk_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the border policy.
    #[must_use]
    pub fn with_border(mut self, border: BorderPolicy) -> Self {
        self.border = border;
        self
    }

    /// Set the resampling filter.
    #[must_use]
    pub fn with_resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.resize_filter = filter;
        self
    }

    /// Set the wall-clock budget.
    #[must_use]
    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.budget_ms = Some(budget_ms);
        self
    }

    /// Whether `label` is in the high-risk set.
    pub fn is_high_risk(&self, label: &str) -> bool {
        self.high_risk_labels.iter().any(|l| l == label)
    }

    /// Overlay style for a prediction.
    pub fn overlay_style(&self, colormap: Colormap, high_risk: bool, confidence: f32) -> OverlayStyle {
        let alpha = if high_risk {
            self.high_risk_alpha
        } else {
            self.alpha
        };
        OverlayStyle {
            alpha,
            colormap,
            border: self.border.border_for(high_risk, confidence),
        }
    }

    /// Check blend weights and border settings.
    pub fn validate(&self) -> Result<()> {
        for (name, alpha) in [("alpha", self.alpha), ("high_risk_alpha", self.high_risk_alpha)] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(CoreError::Other(format!("{name} must be in [0, 1], got {alpha}")));
            }
        }
        if !(0.0..=1.0).contains(&self.border.min_confidence) {
            return Err(CoreError::Other(format!(
                "border.min_confidence must be in [0, 1], got {}",
                self.border.min_confidence
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CoreError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExplainConfig::default();
        assert_eq!(config.fallback, FallbackStrategy::UniformConfidence);
        assert_eq!(config.saliency_colormap, Colormap::Jet);
        assert_eq!(config.alpha, 0.4);
        assert_eq!(config.high_risk_alpha, 0.5);
        assert!(config.is_high_risk("Carcinoma"));
        assert!(!config.is_high_risk("Normal"));
        assert!(config.budget_ms.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlay_style_by_risk() {
        let config = ExplainConfig::default();

        let ordinary = config.overlay_style(Colormap::Jet, false, 0.95);
        assert_eq!(ordinary.alpha, 0.4);
        assert!(ordinary.border.is_none());

        let risky = config.overlay_style(Colormap::Jet, true, 0.95);
        assert_eq!(risky.alpha, 0.5);
        assert_eq!(risky.border.map(|b| b.width), Some(8));

        let unsure = config.overlay_style(Colormap::Jet, true, 0.7);
        assert!(unsure.border.is_none());
    }

    #[test]
    fn test_partial_json() {
        let config = ExplainConfig::from_json_str(
            r#"{"fallback": "hotspots", "high_risk_labels": ["Melanoma"], "border": {"width": 4}}"#,
        )
        .unwrap();
        assert_eq!(config.fallback, FallbackStrategy::Hotspots);
        assert!(config.is_high_risk("Melanoma"));
        assert_eq!(config.border.width, 4);
        assert_eq!(config.border.min_confidence, 0.7);
        assert_eq!(config.alpha, 0.4);
    }

    #[test]
    fn test_rejects_bad_alpha() {
        assert!(ExplainConfig::from_json_str(r#"{"alpha": 1.5}"#).is_err());
        assert!(matches!(
            ExplainConfig::from_json_str("not json"),
            Err(CoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = ExplainConfig::default()
            .with_alpha(0.3, 0.6)
            .with_high_risk_labels(["A", "B"])
            .with_saliency_colormap(Colormap::Hot)
            .with_budget_ms(100);
        assert_eq!(config.alpha, 0.3);
        assert_eq!(config.high_risk_alpha, 0.6);
        assert_eq!(config.high_risk_labels, vec!["A", "B"]);
        assert_eq!(config.saliency_colormap, Colormap::Hot);
        assert_eq!(config.budget_ms, Some(100));
    }
}
