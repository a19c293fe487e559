//! Grad-CAM saliency maps.
//!
//! [`generate_saliency`] picks the last spatial feature extractor the
//! classifier declares, runs the dual-output pass, weights the feature
//! channels by their spatially averaged gradients and rectifies, then
//! normalizes by the maximum and resizes to the image resolution.
//!
//! Every failure is reported through [`SaliencyOutcome::Unavailable`]; the
//! caller decides what to draw instead.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use carcino_core::{InputGeometry, LesionClassifier};
use ndarray::Array2;

use crate::activation::FeatureCapture;
use crate::attribution::grad_cam;
use crate::error::SaliencyUnavailable;

/// Non-negative importance map normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    values: Array2<f32>,
    target_class: usize,
}

impl SaliencyMap {
    /// Normalize a rectified map by its maximum.
    ///
    /// # Errors
    ///
    /// `NonFinite` if any value is NaN or infinite, `DegenerateMap` if the
    /// maximum is not positive.
    pub fn from_rectified(
        raw: Array2<f32>,
        target_class: usize,
    ) -> Result<Self, SaliencyUnavailable> {
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(SaliencyUnavailable::NonFinite);
        }
        let max = raw.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Err(SaliencyUnavailable::DegenerateMap);
        }
        let values = raw.mapv(|v| (v / max).clamp(0.0, 1.0));
        Ok(Self {
            values,
            target_class,
        })
    }

    /// Map values, shape `(height, width)`.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Consume the map, returning its values.
    pub fn into_values(self) -> Array2<f32> {
        self.values
    }

    /// Class the map explains.
    pub fn target_class(&self) -> usize {
        self.target_class
    }

    /// `(height, width)` of the map.
    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Position `(row, col)` of the highest value.
    pub fn peak(&self) -> (usize, usize) {
        let mut best = ((0, 0), f32::NEG_INFINITY);
        for (idx, &v) in self.values.indexed_iter() {
            if v > best.1 {
                best = (idx, v);
            }
        }
        best.0
    }

    /// Bilinearly resample to `(height, width)`.
    #[must_use]
    pub fn resized(&self, height: usize, width: usize) -> Self {
        Self {
            values: resize_bilinear(&self.values, height, width),
            target_class: self.target_class,
        }
    }
}

/// Result of one saliency attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SaliencyOutcome {
    /// Saliency map at image resolution.
    Success(SaliencyMap),
    /// Why no map could be produced.
    Unavailable(SaliencyUnavailable),
}

impl SaliencyOutcome {
    /// Whether a map was produced.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The map, if any.
    pub fn map(&self) -> Option<&SaliencyMap> {
        match self {
            Self::Success(map) => Some(map),
            Self::Unavailable(_) => None,
        }
    }
}

impl From<Result<SaliencyMap, SaliencyUnavailable>> for SaliencyOutcome {
    fn from(result: Result<SaliencyMap, SaliencyUnavailable>) -> Self {
        match result {
            Ok(map) => Self::Success(map),
            Err(reason) => Self::Unavailable(reason),
        }
    }
}

fn sample(field: &Array2<f32>, u: f32, v: f32) -> f32 {
    let (rows, cols) = field.dim();
    let uu = u.clamp(0.0, (cols - 1) as f32);
    let vv = v.clamp(0.0, (rows - 1) as f32);
    let x0 = uu.floor() as usize;
    let y0 = vv.floor() as usize;
    let x1 = (x0 + 1).min(cols - 1);
    let y1 = (y0 + 1).min(rows - 1);
    let dx = uu - x0 as f32;
    let dy = vv - y0 as f32;
    let f0 = field[[y0, x0]] * (1.0 - dx) + field[[y0, x1]] * dx;
    let f1 = field[[y1, x0]] * (1.0 - dx) + field[[y1, x1]] * dx;
    f0 * (1.0 - dy) + f1 * dy
}

/// Bilinear resize with pixel-centre alignment.
pub fn resize_bilinear(field: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (rows, cols) = field.dim();
    if rows == 0 || cols == 0 {
        return Array2::zeros((height, width));
    }
    if (rows, cols) == (height, width) {
        return field.clone();
    }
    let sy = rows as f32 / height as f32;
    let sx = cols as f32 / width as f32;
    Array2::from_shape_fn((height, width), |(y, x)| {
        let u = (x as f32 + 0.5) * sx - 0.5;
        let v = (y as f32 + 0.5) * sy - 0.5;
        sample(field, u, v)
    })
}

fn try_generate<B: AutodiffBackend>(
    classifier: &dyn LesionClassifier<B>,
    input: Tensor<B, 4>,
    geometry: InputGeometry,
) -> Result<SaliencyMap, SaliencyUnavailable> {
    let layer = classifier
        .last_spatial_layer()
        .ok_or(SaliencyUnavailable::NoConvolutionalLayer)?;
    let layers = classifier.layers();
    tracing::debug!(
        layer,
        name = layers.get(layer).map(|l| l.name.as_str()).unwrap_or("?"),
        "grad-cam target layer"
    );

    let capture = FeatureCapture::capture(classifier, input, layer)?;
    let gradients = capture.feature_gradients()?;
    let raw = grad_cam(capture.features(), gradients)
        .with_target_class(capture.target_class())
        .to_array()?;

    let map = SaliencyMap::from_rectified(raw, capture.target_class())?;
    Ok(map.resized(geometry.height(), geometry.width()))
}

/// Compute a Grad-CAM saliency map for the predicted class.
///
/// `input` is the batch-wrapped `(1, H, W, 3)` tensor and `geometry` its
/// `(H, W)`; the returned map has that resolution.
pub fn generate_saliency<B: AutodiffBackend>(
    classifier: &dyn LesionClassifier<B>,
    input: Tensor<B, 4>,
    geometry: InputGeometry,
) -> SaliencyOutcome {
    let outcome = SaliencyOutcome::from(try_generate(classifier, input, geometry));
    if let SaliencyOutcome::Unavailable(reason) = &outcome {
        tracing::warn!(%reason, "saliency unavailable");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use carcino_core::backend::{Autodiff, NdArray};
    use carcino_models::{DenseClassifierConfig, LesionNetConfig};
    use ndarray::array;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_from_rectified_normalizes_by_max() {
        let map = SaliencyMap::from_rectified(array![[0.0, 2.0], [1.0, 4.0]], 1).unwrap();
        assert_eq!(map.values(), &array![[0.0, 0.5], [0.25, 1.0]]);
        assert_eq!(map.peak(), (1, 1));
        assert_eq!(map.target_class(), 1);
    }

    #[test]
    fn test_from_rectified_rejects_degenerate_and_non_finite() {
        assert_eq!(
            SaliencyMap::from_rectified(Array2::zeros((3, 3)), 0),
            Err(SaliencyUnavailable::DegenerateMap)
        );
        assert_eq!(
            SaliencyMap::from_rectified(array![[f32::NAN, 1.0]], 0),
            Err(SaliencyUnavailable::NonFinite)
        );
    }

    #[test]
    fn test_resize_bilinear() {
        let field = array![[0.0, 1.0], [0.0, 1.0]];
        let up = resize_bilinear(&field, 4, 4);
        assert_eq!(up.dim(), (4, 4));
        assert_eq!(up[[0, 0]], 0.0);
        assert_eq!(up[[3, 3]], 1.0);
        assert!(up[[0, 1]] > 0.0 && up[[0, 1]] < up[[0, 2]]);
        assert!(up.iter().all(|&v| (0.0..=1.0).contains(&v)));

        let same = resize_bilinear(&field, 2, 2);
        assert_eq!(same, field);
    }

    #[test]
    fn test_no_convolutional_layer() {
        let device = Default::default();
        let geometry = InputGeometry::new(4, 4);
        let model = DenseClassifierConfig::new(geometry, 2).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([1, 4, 4, 3], &device);

        assert_eq!(
            generate_saliency(&model, x, geometry),
            SaliencyOutcome::Unavailable(SaliencyUnavailable::NoConvolutionalLayer)
        );
    }

    #[test]
    fn test_saliency_localizes_bright_patch() {
        let device = Default::default();
        let geometry = InputGeometry::new(32, 32);
        // One conv layer with constant weights: activations grow with local
        // brightness and every gradient is positive.
        let model = LesionNetConfig::new(2)
            .with_filters(vec![4])
            .with_pool(false)
            .with_constant_init(0.1)
            .init::<TestBackend>(&device);

        let mut pixels = vec![0.0f32; 32 * 32 * 3];
        for y in 0..8 {
            for x in 0..8 {
                for c in 0..3 {
                    pixels[(y * 32 + x) * 3 + c] = 1.0;
                }
            }
        }
        let x = Tensor::<TestBackend, 1>::from_floats(pixels.as_slice(), &device)
            .reshape([1, 32, 32, 3]);

        let outcome = generate_saliency(&model, x, geometry);
        let map = outcome.map().expect("saliency map");
        assert_eq!(map.dim(), (32, 32));
        assert!(map.values().iter().all(|&v| (0.0..=1.0).contains(&v)));

        let (row, col) = map.peak();
        assert!(row < 8 && col < 8, "peak at ({row}, {col})");
        assert!(map.values()[[31, 31]] < 0.1);
    }

    #[test]
    fn test_degenerate_map_on_black_image() {
        let device = Default::default();
        let geometry = InputGeometry::new(8, 8);
        // Zero weights and bias: every activation is zero.
        let model = LesionNetConfig::new(2)
            .with_filters(vec![2])
            .with_constant_init(0.0)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::zeros([1, 8, 8, 3], &device);

        assert_eq!(
            generate_saliency(&model, x, geometry),
            SaliencyOutcome::Unavailable(SaliencyUnavailable::DegenerateMap)
        );
    }
}
