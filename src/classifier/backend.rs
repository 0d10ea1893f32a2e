use crate::error::ModelError;
use ndarray::Array4;

/// Raw scores produced by a model, one per class
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Float(Vec<f32>),
    /// Quantized scores; dequantized with the configured scale and zero point
    Quantized(Vec<u8>),
}

impl ModelOutput {
    pub fn len(&self) -> usize {
        match self {
            ModelOutput::Float(scores) => scores.len(),
            ModelOutput::Quantized(scores) => scores.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dequantize(self, scale: f32, zero_point: i32) -> Vec<f32> {
        match self {
            ModelOutput::Float(scores) => scores,
            ModelOutput::Quantized(scores) => scores
                .into_iter()
                .map(|q| scale * (q as i32 - zero_point) as f32)
                .collect(),
        }
    }
}

/// A loaded model that maps one preprocessed image tensor to class scores.
///
/// Implementations need not be thread-safe; the classifier serialises calls.
pub trait InferenceBackend: Send {
    fn infer(&mut self, input: Array4<f32>) -> Result<ModelOutput, ModelError>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;

#[cfg(feature = "onnx")]
mod onnx {
    use super::{InferenceBackend, ModelOutput};
    use crate::error::ModelError;
    use ndarray::Array4;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;
    use tracing::info;

    /// ONNX Runtime session
    pub struct OnnxBackend {
        session: Session,
    }

    impl OnnxBackend {
        pub fn load(path: &Path) -> Result<Self, ModelError> {
            info!("Loading classification model from {}", path.display());

            let session = Session::builder()
                .and_then(|b| b.with_intra_threads(1))
                .and_then(|b| b.commit_from_file(path))
                .map_err(|e| ModelError::Load {
                    path: path.display().to_string(),
                    details: e.to_string(),
                })?;

            info!("Classification model loaded");
            Ok(Self { session })
        }
    }

    impl InferenceBackend for OnnxBackend {
        fn infer(&mut self, input: Array4<f32>) -> Result<ModelOutput, ModelError> {
            let tensor = Tensor::from_array(input).map_err(|e| ModelError::Invocation {
                details: format!("failed to create input tensor: {e}"),
            })?;

            let outputs =
                self.session
                    .run(ort::inputs![tensor])
                    .map_err(|e| ModelError::Invocation {
                        details: format!("inference failed: {e}"),
                    })?;

            if let Ok((_shape, scores)) = outputs[0].try_extract_tensor::<f32>() {
                return Ok(ModelOutput::Float(scores.to_vec()));
            }

            let (_shape, scores) =
                outputs[0]
                    .try_extract_tensor::<u8>()
                    .map_err(|e| ModelError::Output {
                        details: format!("expected f32 or u8 scores: {e}"),
                    })?;
            Ok(ModelOutput::Quantized(scores.to_vec()))
        }
    }
}
