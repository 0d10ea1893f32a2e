mod backend;
mod labels;
mod model;
#[cfg(test)]
mod tests;

#[cfg(feature = "onnx")]
pub use backend::OnnxBackend;
pub use backend::{InferenceBackend, ModelOutput};
pub use labels::{load_labels, parse_labels};
pub use model::{Classifier, Prediction};
