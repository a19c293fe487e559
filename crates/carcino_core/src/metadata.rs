//! Descriptive per-class records attached to predictions.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Clinical risk tier of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// No follow-up needed.
    Low,
    /// Follow-up recommended.
    Moderate,
    /// Urgent follow-up.
    High,
}

/// Static descriptive record for one class label.
///
/// The pipeline never interprets these fields; they are attached verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetadata {
    /// Risk tier.
    pub risk: RiskTier,
    /// Short description of the class.
    pub description: String,
    /// Guidance text shown to the user.
    #[serde(default)]
    pub guidance: String,
    /// Display colour (e.g. `#DC1E1F`).
    #[serde(default)]
    pub color: String,
    /// Recommended action.
    #[serde(default)]
    pub action: String,
}

/// Lookup from class label to [`ClassMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataCatalog {
    entries: HashMap<String, ClassMetadata>,
}

impl MetadataCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the record for `label`.
    #[must_use]
    pub fn with_entry(mut self, label: impl Into<String>, metadata: ClassMetadata) -> Self {
        self.entries.insert(label.into(), metadata);
        self
    }

    /// Record for `label`, if any.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&ClassMetadata> {
        self.entries.get(label)
    }

    /// Number of labels with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a catalog from a JSON object keyed by label.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] on malformed JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Load a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let catalog = MetadataCatalog::new().with_entry(
            "Carcinoma",
            ClassMetadata {
                risk: RiskTier::High,
                description: "Malignant epithelial lesion".into(),
                guidance: "Consult a dermatologist promptly".into(),
                color: "#DC1E1F".into(),
                action: "Book an appointment".into(),
            },
        );
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("Carcinoma").unwrap().risk, RiskTier::High);
        assert!(catalog.get("Normal").is_none());
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{
            "Normal": { "risk": "low", "description": "No lesion detected" },
            "Carcinoma": { "risk": "high", "description": "Malignant", "color": "red" }
        }"#;
        let catalog = MetadataCatalog::from_json_str(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("Normal").unwrap().risk, RiskTier::Low);
        assert_eq!(catalog.get("Normal").unwrap().guidance, "");
        assert_eq!(catalog.get("Carcinoma").unwrap().color, "red");
    }

    #[test]
    fn test_catalog_rejects_unknown_risk() {
        let json = r#"{ "Normal": { "risk": "unknown", "description": "" } }"#;
        assert!(matches!(
            MetadataCatalog::from_json_str(json),
            Err(CoreError::Serialization(_))
        ));
    }
}
