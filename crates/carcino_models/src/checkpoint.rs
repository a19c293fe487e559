//! Model checkpointing and serialization utilities.
//!
//! Weights are stored with burn's named MessagePack recorder at full
//! precision. The recorder appends the `.mpk` extension itself.
//!
//! # Example
//!
//! ```rust,ignore
//! use carcino_models::checkpoint::{save_model, load_model};
//! use carcino_models::LesionNetConfig;
//!
//! let config = LesionNetConfig::new(2);
//! let model = config.init::<Autodiff<NdArray>>(&device);
//! save_model(&model, "weights/model.mpk")?;
//!
//! let restored = load_model(config.init(&device), "weights/model.mpk", &device)?;
//! ```

use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use carcino_core::CoreError;

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint or manifest.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint or manifest.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Manifest content is malformed or inconsistent.
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),

    /// Core error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<CheckpointError> for CoreError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Core(inner) => inner,
            CheckpointError::InvalidFormat(msg) => CoreError::InvalidContract(msg),
            other => CoreError::Inference(other.to_string()),
        }
    }
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// Save a model's weights to `path`.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    model
        .clone()
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| CheckpointError::Save(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "saved weights");
    Ok(())
}

/// Load weights from `path` into a freshly initialized `model`.
pub fn load_model<B, M>(model: M, path: impl AsRef<Path>, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    let model = model
        .load_file(path.to_path_buf(), &recorder(), device)
        .map_err(|e| CheckpointError::Load(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded weights");
    Ok(model)
}
