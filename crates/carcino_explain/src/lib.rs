//! # carcino_explain
//!
//! Visual explanations for carcino-rs lesion classifiers.
//!
//! This crate provides:
//! - Dual-output feature/gradient capture through the classifier head
//! - Grad-CAM saliency maps ([`generate_saliency`])
//! - Synthetic fallback heatmaps for when saliency is unavailable
//! - Colormaps and the overlay compositor (PNG + base64 payloads)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod attribution;
mod colormap;
mod error;
mod fallback;
mod overlay;
mod saliency;

pub use activation::{argmax, FeatureCapture};
pub use attribution::{grad_cam, AttributionMap};
pub use colormap::{quantize, Colormap};
pub use error::{OverlayError, SaliencyUnavailable};
pub use fallback::{fallback_colormap, FallbackHeatmap, FallbackStrategy, HOTSPOT_DECAY};
pub use overlay::{
    blank_payload, compose_overlay, decode_payload, draw_border, encode_png_base64,
    render_overlay, Border, OverlayPayload, OverlayStyle,
};
pub use saliency::{generate_saliency, resize_bilinear, SaliencyMap, SaliencyOutcome};
