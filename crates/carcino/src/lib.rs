//! # carcino
//!
//! Lesion classification with visual explanations, built on burn.
//!
//! carcino-rs classifies a lesion image and returns the class probabilities
//! together with a heatmap overlay showing which regions drove the
//! prediction:
//!
//! - **Normalization**: decode, force RGB, resize to the classifier geometry
//! - **Inference**: one forward pass to a probability vector
//! - **Saliency**: Grad-CAM on the last convolutional layer
//! - **Fallback**: synthetic heatmap when Grad-CAM is unavailable
//! - **Overlay**: colormap, alpha blend, risk border, PNG + base64
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use carcino::prelude::*;
//!
//! let handle = ClassifierHandle::<DefaultBackend>::from_dir("models/lesion", Default::default())?;
//! let slot = Arc::new(ClassifierSlot::with_handle(handle));
//! let explainer = Explainer::new(slot, ExplainConfig::default());
//!
//! let result = explainer.explain_prediction(&std::fs::read("lesion.png")?)?;
//! println!("{}", result.to_json_pretty()?);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod handle;
pub mod inference;
pub mod pipeline;
pub mod result;

// Re-export all crates
pub use carcino_core as core;
pub use carcino_explain as explain;
pub use carcino_models as models;
pub use carcino_transforms as transforms;

pub use config::{BorderPolicy, ExplainConfig};
pub use handle::{ClassifierContract, ClassifierHandle, ClassifierSlot};
pub use inference::{run_inference, to_input_tensor};
pub use pipeline::Explainer;
pub use result::{ClassProbabilities, Explanation, HeatmapSource};

/// Default autodiff backend: CPU ndarray.
pub type DefaultBackend = burn_autodiff::Autodiff<burn_ndarray::NdArray>;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use carcino::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Core types
    pub use carcino_core::{
        ClassMetadata, CoreError, InputGeometry, LesionClassifier, MetadataCatalog, Result,
        RiskTier,
    };

    // Models
    pub use carcino_models::{
        ArchitectureConfig, DenseClassifierConfig, LesionNetConfig, ModelManifest,
    };

    // Explain
    pub use carcino_explain::{Colormap, FallbackStrategy};

    // Pipeline
    pub use crate::{
        ClassifierContract, ClassifierHandle, ClassifierSlot, DefaultBackend, ExplainConfig,
        Explainer, Explanation, HeatmapSource,
    };
}
