//! Synthetic heatmaps for when saliency is unavailable.
//!
//! The fields here carry no evidence about *where* the classifier looked.
//! They keep the response contract (there is always a heatmap) and convey
//! the confidence of the prediction.

use carcino_core::InputGeometry;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::colormap::Colormap;

/// Decay distance of the hotspot field, in pixels.
pub const HOTSPOT_DECAY: f32 = 50.0;

/// Hotspot centres as fractions of `(width, height)` and their attenuation.
const HOTSPOTS: [(f32, f32, f32); 3] = [(0.5, 0.5, 1.0), (0.3, 0.35, 0.8), (0.7, 0.65, 0.6)];

/// Which synthetic field to draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Every pixel set to the confidence.
    #[default]
    UniformConfidence,
    /// Max of exponentially decaying point sources.
    Hotspots,
}

/// A fallback field and the colormap it should be drawn with.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackHeatmap {
    /// Field values in `[0, 1]`, shape `(height, width)`.
    pub values: Array2<f32>,
    /// Risk-dependent palette.
    pub colormap: Colormap,
}

/// Warning palette for high-risk predictions, calm palette otherwise.
pub fn fallback_colormap(high_risk: bool) -> Colormap {
    if high_risk {
        Colormap::Hot
    } else {
        Colormap::Cool
    }
}

fn hotspot_field(confidence: f32, geometry: InputGeometry) -> Array2<f32> {
    let w = geometry.width() as f32;
    let h = geometry.height() as f32;
    let sources: Vec<(f32, f32, f32)> = HOTSPOTS
        .iter()
        .map(|&(fx, fy, atten)| (fx * w, fy * h, atten * confidence))
        .collect();
    Array2::from_shape_fn((geometry.height(), geometry.width()), |(y, x)| {
        sources
            .iter()
            .map(|&(cx, cy, intensity)| {
                let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                intensity * (-dist / HOTSPOT_DECAY).exp()
            })
            .fold(0.0f32, f32::max)
    })
}

impl FallbackStrategy {
    /// Build the field for a prediction of `confidence`.
    ///
    /// Never fails: a non-finite or out-of-range confidence, or any
    /// non-finite value in the result, yields an all-zero field.
    pub fn field(self, confidence: f32, geometry: InputGeometry) -> Array2<f32> {
        let shape = (geometry.height(), geometry.width());
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            tracing::warn!(confidence, "invalid confidence, blank fallback field");
            return Array2::zeros(shape);
        }
        let field = match self {
            Self::UniformConfidence => Array2::from_elem(shape, confidence),
            Self::Hotspots => hotspot_field(confidence, geometry),
        };
        if field.iter().all(|v| v.is_finite()) {
            field
        } else {
            Array2::zeros(shape)
        }
    }

    /// Field plus risk-aware colormap.
    pub fn heatmap(self, confidence: f32, high_risk: bool, geometry: InputGeometry) -> FallbackHeatmap {
        FallbackHeatmap {
            values: self.field(confidence, geometry),
            colormap: fallback_colormap(high_risk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_fill() {
        let field = FallbackStrategy::UniformConfidence.field(0.9, InputGeometry::new(4, 6));
        assert_eq!(field.dim(), (4, 6));
        assert!(field.iter().all(|&v| v == 0.9));
    }

    #[test]
    fn test_hotspots_peak_at_centre() {
        let geometry = InputGeometry::new(100, 100);
        let field = FallbackStrategy::Hotspots.field(0.8, geometry);

        assert!((field[[50, 50]] - 0.8).abs() < 1e-6);
        // second source: 0.8 * 0.8 at (30, 35)
        assert!((field[[35, 30]] - 0.64).abs() < 1e-6);
        assert!(field.iter().all(|&v| (0.0..=0.8).contains(&v)));
        assert!(field[[0, 99]] < field[[50, 50]]);
    }

    #[test]
    fn test_invalid_confidence_gives_blank() {
        let geometry = InputGeometry::new(3, 3);
        for confidence in [f32::NAN, f32::INFINITY, -0.1, 1.5] {
            let field = FallbackStrategy::Hotspots.field(confidence, geometry);
            assert!(field.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_risk_colormap() {
        let geometry = InputGeometry::new(2, 2);
        assert_eq!(
            FallbackStrategy::UniformConfidence.heatmap(0.5, true, geometry).colormap,
            Colormap::Hot
        );
        assert_eq!(
            FallbackStrategy::UniformConfidence.heatmap(0.5, false, geometry).colormap,
            Colormap::Cool
        );
    }

    #[test]
    fn test_strategy_serde() {
        let s: FallbackStrategy = serde_json::from_str("\"hotspots\"").unwrap();
        assert_eq!(s, FallbackStrategy::Hotspots);
        assert_eq!(FallbackStrategy::default(), FallbackStrategy::UniformConfidence);
    }
}
