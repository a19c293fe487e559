//! Inference engine: one forward pass to a probability vector.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use carcino_core::{CoreError, ImageTensor, LesionClassifier, Result};

/// Tolerance on the probability sum.
pub const PROBABILITY_TOLERANCE: f32 = 1e-4;

/// Upload a normalized image as a `(1, H, W, 3)` tensor.
pub fn to_input_tensor<B: Backend>(image: &ImageTensor, device: &B::Device) -> Tensor<B, 4> {
    let batched = image.batched();
    let shape = batched.shape().to_vec();
    let data = TensorData::new(batched.into_iter().collect::<Vec<f32>>(), shape);
    Tensor::from_data(data, device)
}

/// Run one forward pass and return class probabilities.
///
/// # Errors
///
/// [`CoreError::Inference`] if the output width differs from `n_labels`, or
/// the probabilities are non-finite or do not sum to one.
pub fn run_inference<B: AutodiffBackend>(
    classifier: &dyn LesionClassifier<B>,
    input: Tensor<B, 4>,
    n_labels: usize,
) -> Result<Vec<f32>> {
    let probs: Vec<f32> = classifier
        .forward_probs(input)
        .into_data()
        .to_vec()
        .map_err(|e| CoreError::Inference(format!("{e:?}")))?;

    validate_probabilities(&probs, n_labels)?;
    tracing::debug!(?probs, "forward pass");
    Ok(probs.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
}

/// Check a probability vector against the label count.
pub fn validate_probabilities(probs: &[f32], n_labels: usize) -> Result<()> {
    if probs.len() != n_labels {
        return Err(CoreError::Inference(format!(
            "classifier produced {} probabilities for {n_labels} labels",
            probs.len()
        )));
    }
    if probs.iter().any(|p| !p.is_finite()) {
        return Err(CoreError::Inference("non-finite probabilities".to_string()));
    }
    let sum: f32 = probs.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(CoreError::Inference(format!(
            "probabilities sum to {sum}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DefaultBackend;
    use carcino_core::InputGeometry;
    use carcino_models::LesionNetConfig;
    use ndarray::Array3;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_input_tensor_layout() {
        let device = Default::default();
        let mut pixels = Array3::<f32>::zeros((2, 3, 3));
        pixels[[1, 2, 0]] = 1.0;
        let image = ImageTensor::new(pixels).unwrap();

        let tensor = to_input_tensor::<DefaultBackend>(&image, &device);
        assert_eq!(tensor.dims(), [1, 2, 3, 3]);
        let values: Vec<f32> = tensor.into_data().to_vec().unwrap();
        // row 1, col 2, channel 0
        assert_eq!(values[15], 1.0);
        assert_eq!(values.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let geometry = InputGeometry::new(16, 16);
        let model = LesionNetConfig::new(3)
            .with_filters(vec![4, 8])
            .init::<DefaultBackend>(&device);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..3 {
            let pixels = Array3::from_shape_fn((16, 16, 3), |_| rng.gen::<f32>());
            let image = ImageTensor::new(pixels).unwrap();
            image.ensure_geometry(geometry).unwrap();

            let probs = run_inference(&model, to_input_tensor(&image, &device), 3).unwrap();
            assert_eq!(probs.len(), 3);
            assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
            assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_label_count_mismatch() {
        let device = Default::default();
        let model = LesionNetConfig::new(2).with_filters(vec![4]).init::<DefaultBackend>(&device);
        let input = Tensor::<DefaultBackend, 4>::zeros([1, 8, 8, 3], &device);
        assert!(matches!(
            run_inference(&model, input, 3),
            Err(CoreError::Inference(_))
        ));
    }

    #[test]
    fn test_validate_probabilities() {
        assert!(validate_probabilities(&[0.1, 0.9], 2).is_ok());
        assert!(validate_probabilities(&[0.5, 0.6], 2).is_err());
        assert!(validate_probabilities(&[f32::NAN, 1.0], 2).is_err());
    }
}
