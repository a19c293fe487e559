//! Error types for carcino_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while classifying an image.
///
/// Heatmap failures never appear here: saliency and compositing problems are
/// recovered inside the explanation pipeline.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The bytes could not be decoded as an image.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The normalized image does not match the classifier geometry.
    #[error("Shape error: expected {expected}, got {got}")]
    Shape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// The caller-declared file extension does not name a supported image type.
    #[error("Unsupported image extension: {0}")]
    UnsupportedExtension(String),

    /// Classifier missing or forward pass failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Labels, geometry and model disagree.
    #[error("Invalid classifier contract: {0}")]
    InvalidContract(String),

    /// A spatial pass was requested on a layer that has no spatial output.
    #[error("Layer {layer} has no spatial output")]
    NotSpatial {
        /// Index into the classifier's layer descriptors.
        layer: usize,
    },

    /// Classification took longer than the configured wall-clock budget.
    #[error("Budget exceeded: took {elapsed_ms} ms, budget is {budget_ms} ms")]
    BudgetExceeded {
        /// Elapsed milliseconds.
        elapsed_ms: u64,
        /// Configured budget in milliseconds.
        budget_ms: u64,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether the error was caused by the caller's input rather than the service.
    #[must_use]
    pub const fn is_input_fault(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Shape { .. } | Self::UnsupportedExtension(_)
        )
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BudgetExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_faults() {
        assert!(CoreError::Decode("truncated".into()).is_input_fault());
        assert!(CoreError::Shape {
            expected: "(224, 224, 3)".into(),
            got: "(224, 224, 4)".into(),
        }
        .is_input_fault());
        assert!(CoreError::UnsupportedExtension(".gif".into()).is_input_fault());
        assert!(!CoreError::Inference("classifier not loaded".into()).is_input_fault());
    }

    #[test]
    fn test_retryable() {
        let err = CoreError::BudgetExceeded {
            elapsed_ms: 1500,
            budget_ms: 1000,
        };
        assert!(err.is_retryable());
        assert!(!err.is_input_fault());
        assert_eq!(
            err.to_string(),
            "Budget exceeded: took 1500 ms, budget is 1000 ms"
        );
    }
}
