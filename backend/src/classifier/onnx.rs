//! ONNX model loading and inference via the `ort` crate.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use ort::session::Session;
use ort::value::TensorRef;

use super::{Classifier, ClassifierError};
use crate::config::ModelConfig;
use crate::imaging::NormalizedTensor;

pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(&config.path)?;

        Ok(Self {
            session: Mutex::new(session),
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
        })
    }

    /// Input shape: (1, 299, 299, 3). The first element of the output is
    /// the pneumonia probability.
    fn run(&self, tensor: &NormalizedTensor) -> Result<f32> {
        let input_tensor = TensorRef::from_array_view(tensor.as_array())?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow!("lock error: {e}"))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let output_array = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;
        let score = output_array
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("model produced an empty output"))?;

        Ok(score)
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn predict(&self, tensor: &NormalizedTensor) -> Result<f32, ClassifierError> {
        self.run(tensor)
            .map_err(|e| ClassifierError::Inference(format!("{e:#}")))
    }
}
