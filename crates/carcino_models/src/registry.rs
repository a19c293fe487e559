//! Model directories described by a JSON manifest.
//!
//! A model directory holds `manifest.json` (architecture, labels, input
//! geometry) next to the weights file. The manifest is the classifier
//! contract: labels are in output-index order and their count must match
//! the architecture's class count.
//!
//! # Example
//!
//! ```rust,ignore
//! use carcino_models::{ArchitectureConfig, LesionNetConfig, ModelManifest};
//!
//! let manifest = ModelManifest::new(
//!     ArchitectureConfig::LesionNet(LesionNetConfig::new(2)),
//!     vec!["Normal".into(), "Carcinoma".into()],
//!     InputGeometry::new(224, 224),
//! );
//! manifest.init_and_save::<Autodiff<NdArray>>("models/demo", &device)?;
//!
//! let (manifest, classifier) = ModelManifest::load_dir::<Autodiff<NdArray>>("models/demo", &device)?;
//! ```

use std::collections::HashSet;
use std::path::Path;

use burn::tensor::backend::AutodiffBackend;
use carcino_core::{InputGeometry, LesionClassifier};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{load_model, save_model, CheckpointError, Result};
use crate::{DenseClassifierConfig, LesionNetConfig};

/// Manifest file name inside a model directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Default weights file name inside a model directory.
pub const WEIGHTS_FILE: &str = "model.mpk";

fn default_weights() -> String {
    WEIGHTS_FILE.to_string()
}

/// Architecture of a stored classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "arch", rename_all = "snake_case")]
pub enum ArchitectureConfig {
    /// Convolutional [`crate::LesionNet`].
    LesionNet(LesionNetConfig),
    /// Flatten + linear [`crate::DenseClassifier`].
    Dense(DenseClassifierConfig),
}

impl ArchitectureConfig {
    /// Number of classes the architecture outputs.
    pub fn n_classes(&self) -> usize {
        match self {
            Self::LesionNet(config) => config.n_classes,
            Self::Dense(config) => config.n_classes,
        }
    }

    /// Short architecture name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LesionNet(_) => "lesion_net",
            Self::Dense(_) => "dense",
        }
    }
}

/// Description of a model directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Architecture and its hyperparameters.
    pub architecture: ArchitectureConfig,
    /// Class labels in output-index order.
    pub labels: Vec<String>,
    /// Input geometry the model was trained at.
    pub geometry: InputGeometry,
    /// Weights file name, relative to the manifest.
    #[serde(default = "default_weights")]
    pub weights: String,
}

impl ModelManifest {
    /// Create a manifest with the default weights file name.
    pub fn new(architecture: ArchitectureConfig, labels: Vec<String>, geometry: InputGeometry) -> Self {
        Self {
            architecture,
            labels,
            geometry,
            weights: default_weights(),
        }
    }

    /// Check that labels, geometry and architecture agree.
    pub fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(CheckpointError::InvalidFormat("no labels".to_string()));
        }
        let mut seen = HashSet::new();
        for label in &self.labels {
            if !seen.insert(label.as_str()) {
                return Err(CheckpointError::InvalidFormat(format!(
                    "duplicate label '{label}'"
                )));
            }
        }
        if self.labels.len() != self.architecture.n_classes() {
            return Err(CheckpointError::InvalidFormat(format!(
                "{} labels for a {}-class {} model",
                self.labels.len(),
                self.architecture.n_classes(),
                self.architecture.name()
            )));
        }
        if self.geometry.is_empty() {
            return Err(CheckpointError::InvalidFormat(format!(
                "empty input geometry {}",
                self.geometry
            )));
        }
        match &self.architecture {
            ArchitectureConfig::LesionNet(config) => config.validate(self.geometry)?,
            ArchitectureConfig::Dense(config) => {
                if config.geometry != self.geometry {
                    return Err(CheckpointError::InvalidFormat(format!(
                        "dense layer sized for {}, manifest declares {}",
                        config.geometry, self.geometry
                    )));
                }
            }
        }
        Ok(())
    }

    /// Read and validate `manifest.json` from a model directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        let json = std::fs::read_to_string(&path)
            .map_err(|e| CheckpointError::Load(format!("{}: {e}", path.display())))?;
        let manifest: Self = serde_json::from_str(&json)
            .map_err(|e| CheckpointError::InvalidFormat(format!("{}: {e}", path.display())))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write `manifest.json` into a model directory, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| CheckpointError::Save(e.to_string()))?;
        let json =
            serde_json::to_string_pretty(self).map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(dir.join(MANIFEST_FILE), json)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Build a freshly initialized (untrained) classifier.
    ///
    /// Used for placeholder models when no trained weights exist.
    pub fn init_classifier<B: AutodiffBackend>(
        &self,
        device: &B::Device,
    ) -> Result<Box<dyn LesionClassifier<B>>> {
        self.validate()?;
        Ok(match &self.architecture {
            ArchitectureConfig::LesionNet(config) => Box::new(config.init::<B>(device)),
            ArchitectureConfig::Dense(config) => Box::new(config.init::<B>(device)),
        })
    }

    /// Build the classifier and load its weights from `dir`.
    pub fn load_classifier<B: AutodiffBackend>(
        &self,
        dir: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<Box<dyn LesionClassifier<B>>> {
        self.validate()?;
        let path = dir.as_ref().join(&self.weights);
        let classifier: Box<dyn LesionClassifier<B>> = match &self.architecture {
            ArchitectureConfig::LesionNet(config) => {
                Box::new(load_model(config.init::<B>(device), &path, device)?)
            }
            ArchitectureConfig::Dense(config) => {
                Box::new(load_model(config.init::<B>(device), &path, device)?)
            }
        };
        tracing::info!(
            arch = self.architecture.name(),
            classes = self.labels.len(),
            geometry = %self.geometry,
            "loaded classifier"
        );
        Ok(classifier)
    }

    /// Read the manifest in `dir` and load its classifier.
    pub fn load_dir<B: AutodiffBackend>(
        dir: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<(Self, Box<dyn LesionClassifier<B>>)> {
        let dir = dir.as_ref();
        let manifest = Self::load(dir)?;
        let classifier = manifest.load_classifier::<B>(dir, device)?;
        Ok((manifest, classifier))
    }

    /// Initialize fresh weights and write them with the manifest into `dir`.
    pub fn init_and_save<B: AutodiffBackend>(
        &self,
        dir: impl AsRef<Path>,
        device: &B::Device,
    ) -> Result<Box<dyn LesionClassifier<B>>> {
        let dir = dir.as_ref();
        self.save(dir)?;
        let path = dir.join(&self.weights);
        Ok(match &self.architecture {
            ArchitectureConfig::LesionNet(config) => {
                let model = config.init::<B>(device);
                save_model(&model, &path)?;
                Box::new(model)
            }
            ArchitectureConfig::Dense(config) => {
                let model = config.init::<B>(device);
                save_model(&model, &path)?;
                Box::new(model)
            }
        })
    }
}
