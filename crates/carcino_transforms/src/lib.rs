//! # carcino_transforms
//!
//! Image preprocessing for lesion classifiers.
//!
//! This crate provides:
//! - [`ImageNormalizer`]: decode, force RGB, resize, scale to `[0, 1]`
//! - [`check_extension`]: advisory pre-check on caller-declared file names
//!
//! ## Example
//!
//! ```rust,ignore
//! use carcino_core::InputGeometry;
//! use carcino_transforms::ImageNormalizer;
//!
//! let normalizer = ImageNormalizer::new(InputGeometry::new(224, 224));
//! let image = normalizer.normalize(&bytes)?;
//! let batch = image.batched(); // (1, 224, 224, 3)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod imaging;

pub use imaging::{
    check_extension, to_unit_interval, ImageNormalizer, NormalizerConfig, ResizeFilter,
    SUPPORTED_EXTENSIONS,
};
