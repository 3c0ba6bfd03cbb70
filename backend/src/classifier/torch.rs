use std::sync::Mutex;

use tch::{CModule, Device, Kind, Tensor};

use super::{Classifier, ClassifierError};
use crate::config::ModelConfig;
use crate::imaging::NormalizedTensor;

/// TorchScript export of the classifier, fed NHWC input.
pub struct TorchClassifier {
    module: Mutex<CModule>,
    device: Device,
}

impl TorchClassifier {
    pub fn load(config: &ModelConfig) -> Result<Self, ClassifierError> {
        let device = Device::cuda_if_available();
        let module = CModule::load_on_device(&config.path, device)
            .map_err(|e| ClassifierError::Load(e.to_string()))?;
        log::info!("TorchScript model loaded on {:?}", device);
        Ok(Self {
            module: Mutex::new(module),
            device,
        })
    }
}

impl Classifier for TorchClassifier {
    fn name(&self) -> &str {
        "torch"
    }

    fn predict(&self, tensor: &NormalizedTensor) -> Result<f32, ClassifierError> {
        let data = tensor
            .as_array()
            .as_slice()
            .ok_or_else(|| ClassifierError::Inference("tensor is not contiguous".into()))?;
        let [n, h, w, c] = tensor.shape();
        let input = Tensor::from_slice(data)
            .view([n as i64, h as i64, w as i64, c as i64])
            .to_device(self.device);

        let module = self
            .module
            .lock()
            .map_err(|e| ClassifierError::Inference(format!("lock error: {e}")))?;
        let output = module
            .forward_ts(&[input])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let score = output
            .to_kind(Kind::Float)
            .view([-1])
            .f_double_value(&[0])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        Ok(score as f32)
    }
}
