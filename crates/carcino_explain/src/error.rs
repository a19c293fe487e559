//! Reasons a heatmap stage could not complete.
//!
//! None of these reach the caller of the explanation pipeline: saliency
//! problems route to the fallback field and compositing problems to a blank
//! image.

use thiserror::Error;

/// Why a Grad-CAM saliency map could not be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaliencyUnavailable {
    /// The classifier declares no spatial feature extractor.
    #[error("classifier has no convolutional layer")]
    NoConvolutionalLayer,

    /// Reverse-mode differentiation did not reach the feature map.
    #[error("gradient unavailable: {0}")]
    GradientUnavailable(String),

    /// The rectified map is zero everywhere.
    #[error("saliency map is degenerate (maximum is zero)")]
    DegenerateMap,

    /// The map contains NaN or infinite values.
    #[error("saliency map contains non-finite values")]
    NonFinite,

    /// The dual-output pass failed.
    #[error("feature capture failed: {0}")]
    Capture(String),
}

/// Errors raised while compositing or encoding an overlay.
#[derive(Error, Debug)]
pub enum OverlayError {
    /// Image and heatmap dimensions disagree.
    #[error("heatmap is {heatmap_h}x{heatmap_w}, image is {image_h}x{image_w}")]
    SizeMismatch {
        /// Heatmap height.
        heatmap_h: usize,
        /// Heatmap width.
        heatmap_w: usize,
        /// Image height.
        image_h: usize,
        /// Image width.
        image_w: usize,
    },

    /// Blend weight outside `[0, 1]`.
    #[error("blend weight {0} outside [0, 1]")]
    InvalidAlpha(f32),

    /// Heatmap or image has no pixels.
    #[error("empty image")]
    Empty,

    /// PNG encoding or decoding failed.
    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),

    /// Payload is not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
