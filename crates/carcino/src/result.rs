//! Result aggregation.

use carcino_core::{ClassMetadata, MetadataCatalog};
use carcino_explain::argmax;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Ordered label -> probability mapping, in output-index order.
///
/// Serializes as a JSON object whose key order matches the label order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassProbabilities {
    entries: Vec<(String, f32)>,
}

impl ClassProbabilities {
    /// Pair labels with probabilities.
    pub fn new(labels: &[String], probabilities: &[f32]) -> Self {
        Self {
            entries: labels
                .iter()
                .cloned()
                .zip(probabilities.iter().copied())
                .collect(),
        }
    }

    /// Probability of `label`.
    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|&(_, p)| p)
    }

    /// Iterate in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(l, p)| (l.as_str(), *p))
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no classes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest-probability entry; ties go to the lower index.
    pub fn top(&self) -> Option<(&str, f32)> {
        let probs: Vec<f32> = self.entries.iter().map(|&(_, p)| p).collect();
        argmax(&probs).map(|i| (self.entries[i].0.as_str(), self.entries[i].1))
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, p) in &self.entries {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

/// Where the heatmap in a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapSource {
    /// Grad-CAM saliency.
    GradCam,
    /// Synthetic fallback field.
    Fallback,
    /// Compositing failed; blank image.
    Blank,
}

/// Response of one explained prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Predicted label.
    pub prediction: String,
    /// Probability of the predicted label.
    pub confidence: f32,
    /// Every label's probability, in label order.
    pub class_probabilities: ClassProbabilities,
    /// Base64 PNG overlay.
    pub heatmap_image: String,
    /// Heatmap provenance.
    pub heatmap_source: HeatmapSource,
    /// Descriptive record for the predicted label, if one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ClassMetadata>,
}

impl Explanation {
    /// Assemble a response. Performs lookups only.
    pub fn assemble(
        class_probabilities: ClassProbabilities,
        heatmap_image: String,
        heatmap_source: HeatmapSource,
        catalog: Option<&MetadataCatalog>,
    ) -> Self {
        let (prediction, confidence) = class_probabilities
            .top()
            .map(|(l, p)| (l.to_string(), p))
            .unwrap_or_default();
        let metadata = catalog.and_then(|c| c.get(&prediction)).cloned();
        Self {
            prediction,
            confidence,
            class_probabilities,
            heatmap_image,
            heatmap_source,
            metadata,
        }
    }

    /// Serialize as pretty JSON.
    pub fn to_json_pretty(&self) -> carcino_core::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| carcino_core::CoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carcino_core::RiskTier;

    fn labels() -> Vec<String> {
        vec!["class_0".to_string(), "class_1".to_string()]
    }

    #[test]
    fn test_probabilities_keep_label_order() {
        let probs = ClassProbabilities::new(&["b".into(), "a".into()], &[0.3, 0.7]);
        let json = serde_json::to_string(&probs).unwrap();
        assert_eq!(json, r#"{"b":0.3,"a":0.7}"#);
        assert_eq!(probs.top(), Some(("a", 0.7)));
        assert_eq!(probs.get("b"), Some(0.3));
        assert_eq!(probs.len(), 2);
    }

    #[test]
    fn test_assemble() {
        let catalog = MetadataCatalog::new().with_entry(
            "class_1",
            ClassMetadata {
                risk: RiskTier::High,
                description: "d".into(),
                guidance: String::new(),
                color: "#DC1E1F".into(),
                action: String::new(),
            },
        );
        let probs = ClassProbabilities::new(&labels(), &[0.1, 0.9]);
        let result = Explanation::assemble(probs, "aGk=".into(), HeatmapSource::Fallback, Some(&catalog));

        assert_eq!(result.prediction, "class_1");
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.metadata.as_ref().map(|m| m.risk), Some(RiskTier::High));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["prediction"], "class_1");
        assert_eq!(value["heatmap_source"], "fallback");
        assert_eq!(value["heatmap_image"], "aGk=");
        assert!(value["class_probabilities"]["class_0"].is_number());
    }

    #[test]
    fn test_metadata_omitted_when_absent() {
        let probs = ClassProbabilities::new(&labels(), &[0.6, 0.4]);
        let result = Explanation::assemble(probs, "x".into(), HeatmapSource::GradCam, None);
        assert_eq!(result.prediction, "class_0");

        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("metadata").is_none());
        assert_eq!(value["heatmap_source"], "grad_cam");
    }
}
