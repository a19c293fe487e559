//! # carcino_models
//!
//! Lesion classifiers for carcino-rs, built on burn.
//!
//! ## CNN Models
//! - [`LesionNet`] - stacked 3x3 conv blocks, global average pooling, linear head
//!
//! ## Baselines
//! - [`DenseClassifier`] - flatten + linear, no spatial layers
//!
//! ## Loading
//! - [`ModelManifest`] describes architecture, labels and input geometry of a
//!   model directory; [`checkpoint`] saves and restores weights.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cnn;
pub mod dense;
pub mod registry;

pub use checkpoint::{load_model, save_model, CheckpointError};
pub use cnn::{ConvBlock, LesionNet, LesionNetConfig};
pub use dense::{DenseClassifier, DenseClassifierConfig};
pub use registry::{ArchitectureConfig, ModelManifest, MANIFEST_FILE, WEIGHTS_FILE};
