//! # carcino_core
//!
//! Core types and traits for carcino-rs lesion classification.
//!
//! This crate provides:
//! - [`InputGeometry`] for the classifier's declared input resolution
//! - [`ImageTensor`] for normalized `(H, W, 3)` images in `[0, 1]`
//! - [`LesionClassifier`] trait with ordered [`LayerDescriptor`]s
//! - [`ClassMetadata`] records attached to predictions
//! - Error types and common utilities
//!
//! ## Layout Convention
//!
//! Images are channels-last, matching the classifier's declared contract:
//! - `(H, W, 3)` for a single normalized image
//! - `(1, H, W, 3)` for the batch-wrapped inference input
//!
//! ## Example
//!
//! ```rust
//! use carcino_core::InputGeometry;
//!
//! let geometry = InputGeometry::new(224, 224);
//! assert_eq!(geometry.batched_shape(), [1, 224, 224, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod geometry;
mod image_tensor;
mod metadata;
mod model_trait;

pub use error::{CoreError, Result};
pub use geometry::{InputGeometry, CHANNELS};
pub use image_tensor::ImageTensor;
pub use metadata::{ClassMetadata, MetadataCatalog, RiskTier};
pub use model_trait::{LayerDescriptor, LayerKind, LesionClassifier};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    /// Autodiff wrapper used wherever gradients are taken.
    pub use burn_autodiff::Autodiff;
}
