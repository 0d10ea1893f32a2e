use super::backend::InferenceBackend;
use super::labels::load_labels;
use crate::config::{ModelConfig, TensorLayout};
use crate::error::ModelError;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// One ranked class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

/// Image classifier over a fixed-size model.
///
/// Each call is independent. Inference itself is serialised because model
/// sessions are not safe for concurrent use; preprocessing and ranking run
/// outside the lock.
pub struct Classifier {
    backend: Mutex<Box<dyn InferenceBackend>>,
    labels: Vec<String>,
    input_width: u32,
    input_height: u32,
    layout: TensorLayout,
    min_confidence: f32,
    output_scale: f32,
    output_zero_point: i32,
    inferences: AtomicU64,
}

impl Classifier {
    pub fn new(
        config: &ModelConfig,
        backend: Box<dyn InferenceBackend>,
        labels: Vec<String>,
    ) -> Self {
        Self {
            backend: Mutex::new(backend),
            labels,
            input_width: config.input_width,
            input_height: config.input_height,
            layout: config.layout,
            min_confidence: config.min_confidence,
            output_scale: config.output_scale,
            output_zero_point: config.output_zero_point,
            inferences: AtomicU64::new(0),
        }
    }

    /// Load the labels and the ONNX model named in `config`
    #[cfg(feature = "onnx")]
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let labels = load_labels(Path::new(&config.labels_path))?;
        let backend = super::backend::OnnxBackend::load(Path::new(&config.path))?;
        Ok(Self::new(config, Box::new(backend), labels))
    }

    #[cfg(not(feature = "onnx"))]
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        load_labels(Path::new(&config.labels_path))?;
        Err(ModelError::Unavailable)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn inference_count(&self) -> u64 {
        self.inferences.load(Ordering::Relaxed)
    }

    /// Resize to the model input and scale each channel to `[-1, 1]`
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let (width, height) = (self.input_width, self.input_height);
        let rgb = image
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8();

        let (w, h) = (width as usize, height as usize);
        let mut tensor = match self.layout {
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
        };

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3usize {
                let value = pixel[c] as f32 / 127.5 - 1.0;
                match self.layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                }
            }
        }

        tensor
    }

    /// Classify an image, returning at most `top_k` predictions ordered by
    /// descending confidence and filtered to those above the threshold
    pub fn classify(
        &self,
        image: &DynamicImage,
        top_k: usize,
    ) -> Result<Vec<Prediction>, ModelError> {
        let input = self.preprocess(image);

        let output = {
            let mut backend = self.backend.lock();
            backend.infer(input)?
        };
        self.inferences.fetch_add(1, Ordering::Relaxed);

        if output.is_empty() {
            return Err(ModelError::Output {
                details: "model produced no scores".to_string(),
            });
        }
        if output.len() != self.labels.len() {
            debug!(
                "Model produced {} scores for {} labels",
                output.len(),
                self.labels.len()
            );
        }

        let scores = output.dequantize(self.output_scale, self.output_zero_point);
        let predictions = self.rank(&scores, top_k);
        trace!("Predictions: {:?}", predictions);
        Ok(predictions)
    }

    fn rank(&self, scores: &[f32], top_k: usize) -> Vec<Prediction> {
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        order
            .into_iter()
            .take(top_k)
            .filter(|&i| scores[i] > self.min_confidence)
            .map(|i| Prediction {
                label: self
                    .labels
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", i)),
                confidence: scores[i],
            })
            .collect()
    }
}
