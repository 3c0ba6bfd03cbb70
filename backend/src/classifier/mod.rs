use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{ModelBackend, ModelConfig};
use crate::imaging::NormalizedTensor;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "torch")]
mod torch;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("The {0} backend is not compiled into this build")]
    BackendUnavailable(&'static str),
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Opaque pretrained binary classifier. `predict` returns the pneumonia
/// probability for a single normalized image.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, tensor: &NormalizedTensor) -> Result<f32, ClassifierError>;
}

/// Loads the configured model once. Called at startup; failure is fatal.
pub fn load_classifier(config: &ModelConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    if !config.path.exists() {
        return Err(ClassifierError::ModelNotFound(config.path.clone()));
    }

    log::info!(
        "Loading {} model from {}",
        config.backend.as_str(),
        config.path.display()
    );

    match config.backend {
        ModelBackend::Onnx => load_onnx(config),
        ModelBackend::Torch => load_torch(config),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(config: &ModelConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    let classifier = onnx::OnnxClassifier::load(config)
        .map_err(|e| ClassifierError::Load(format!("{e:#}")))?;
    Ok(Arc::new(classifier))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_config: &ModelConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    Err(ClassifierError::BackendUnavailable("onnx"))
}

#[cfg(feature = "torch")]
fn load_torch(config: &ModelConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    Ok(Arc::new(torch::TorchClassifier::load(config)?))
}

#[cfg(not(feature = "torch"))]
fn load_torch(_config: &ModelConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    Err(ClassifierError::BackendUnavailable("torch"))
}
