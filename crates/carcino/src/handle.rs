//! Classifier handle and hot-reload slot.
//!
//! A [`ClassifierHandle`] pairs a loaded classifier with the contract it was
//! trained under. burn modules are `Send` but not `Sync`, so the model sits
//! behind a mutex; that mutex is the only serialization point in a
//! prediction and covers inference and saliency, never decoding or
//! compositing.
//!
//! A [`ClassifierSlot`] is the process-wide reference to the current handle.
//! Replacement is swap-then-publish: the new handle is fully built first,
//! then the shared `Arc` is replaced under a short write lock. In-flight
//! requests keep the `Arc` they started with.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use carcino_core::{CoreError, InputGeometry, LayerDescriptor, LesionClassifier, Result};
use carcino_models::ModelManifest;
use parking_lot::{Mutex, MutexGuard, RwLock};

/// Input geometry and label set a classifier was trained with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierContract {
    /// Declared `(height, width)`.
    pub geometry: InputGeometry,
    /// Labels in output-index order.
    pub labels: Vec<String>,
}

impl ClassifierContract {
    /// Create a contract.
    pub fn new<I, S>(geometry: InputGeometry, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            geometry,
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Contract declared by a model manifest.
    pub fn from_manifest(manifest: &ModelManifest) -> Self {
        Self::new(manifest.geometry, manifest.labels.iter().cloned())
    }

    /// Check the contract against a classifier's output width.
    pub fn validate(&self, n_classes: usize) -> Result<()> {
        if self.geometry.is_empty() {
            return Err(CoreError::InvalidContract(format!(
                "empty input geometry {}",
                self.geometry
            )));
        }
        if self.labels.is_empty() {
            return Err(CoreError::InvalidContract("no labels".to_string()));
        }
        let unique: HashSet<&str> = self.labels.iter().map(String::as_str).collect();
        if unique.len() != self.labels.len() {
            return Err(CoreError::InvalidContract("duplicate labels".to_string()));
        }
        if self.labels.len() != n_classes {
            return Err(CoreError::InvalidContract(format!(
                "{} labels for a classifier with {n_classes} outputs",
                self.labels.len()
            )));
        }
        Ok(())
    }
}

/// A loaded, frozen classifier with its contract and device.
pub struct ClassifierHandle<B: AutodiffBackend> {
    model: Mutex<Box<dyn LesionClassifier<B>>>,
    contract: ClassifierContract,
    device: B::Device,
}

impl<B: AutodiffBackend> std::fmt::Debug for ClassifierHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierHandle")
            .field("contract", &self.contract)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl<B: AutodiffBackend> ClassifierHandle<B> {
    /// Wrap a classifier, validating it against `contract`.
    pub fn new(
        model: Box<dyn LesionClassifier<B>>,
        contract: ClassifierContract,
        device: B::Device,
    ) -> Result<Self> {
        contract.validate(model.n_classes())?;
        Ok(Self {
            model: Mutex::new(model),
            contract,
            device,
        })
    }

    /// Load a model directory (manifest plus weights).
    pub fn from_dir(dir: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let (manifest, model) = ModelManifest::load_dir::<B>(dir, &device)?;
        Self::new(model, ClassifierContract::from_manifest(&manifest), device)
    }

    /// Freshly initialized, untrained classifier for a manifest.
    pub fn placeholder(manifest: &ModelManifest, device: B::Device) -> Result<Self> {
        let model = manifest.init_classifier::<B>(&device)?;
        tracing::warn!(
            arch = manifest.architecture.name(),
            "using untrained placeholder classifier"
        );
        Self::new(model, ClassifierContract::from_manifest(manifest), device)
    }

    /// The contract.
    pub fn contract(&self) -> &ClassifierContract {
        &self.contract
    }

    /// Declared input geometry.
    pub fn geometry(&self) -> InputGeometry {
        self.contract.geometry
    }

    /// Labels in output-index order.
    pub fn labels(&self) -> &[String] {
        &self.contract.labels
    }

    /// Device tensors must be created on.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Ordered layer descriptors.
    pub fn layers(&self) -> Vec<LayerDescriptor> {
        self.model.lock().layers()
    }

    /// Grad-CAM target layer, if the classifier has one.
    pub fn target_layer(&self) -> Option<LayerDescriptor> {
        let model = self.model.lock();
        let layers = model.layers();
        model.last_spatial_layer().and_then(|i| layers.get(i).cloned())
    }

    /// Enter the serialization region around the model.
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn LesionClassifier<B>>> {
        self.model.lock()
    }
}

/// Process-wide reference to the current classifier.
pub struct ClassifierSlot<B: AutodiffBackend> {
    current: RwLock<Option<Arc<ClassifierHandle<B>>>>,
}

impl<B: AutodiffBackend> Default for ClassifierSlot<B> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<B: AutodiffBackend> ClassifierSlot<B> {
    /// A slot with no classifier loaded.
    pub fn empty() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// A slot holding `handle`.
    pub fn with_handle(handle: ClassifierHandle<B>) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(handle))),
        }
    }

    /// Replace the current handle, returning the previous one.
    pub fn publish(&self, handle: ClassifierHandle<B>) -> Option<Arc<ClassifierHandle<B>>> {
        let handle = Arc::new(handle);
        tracing::info!(
            labels = handle.labels().len(),
            geometry = %handle.geometry(),
            "publishing classifier"
        );
        self.current.write().replace(handle)
    }

    /// Snapshot of the current handle.
    pub fn current(&self) -> Option<Arc<ClassifierHandle<B>>> {
        self.current.read().clone()
    }

    /// Remove the current handle.
    pub fn unload(&self) -> Option<Arc<ClassifierHandle<B>>> {
        self.current.write().take()
    }

    /// Whether a classifier is loaded.
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }
}
