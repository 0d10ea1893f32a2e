use super::*;
use crate::config::{ModelConfig, SortcamConfig, TensorLayout};
use crate::error::ModelError;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct FixedBackend {
    output: ModelOutput,
}

impl InferenceBackend for FixedBackend {
    fn infer(&mut self, _input: Array4<f32>) -> Result<ModelOutput, ModelError> {
        Ok(self.output.clone())
    }
}

struct FailingBackend;

impl InferenceBackend for FailingBackend {
    fn infer(&mut self, _input: Array4<f32>) -> Result<ModelOutput, ModelError> {
        Err(ModelError::Invocation {
            details: "tensor allocation failed".to_string(),
        })
    }
}

/// Flags any call that starts while another is still running
struct OverlapDetector {
    busy: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl InferenceBackend for OverlapDetector {
    fn infer(&mut self, _input: Array4<f32>) -> Result<ModelOutput, ModelError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(2));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
        Ok(ModelOutput::Float(vec![0.1, 0.9]))
    }
}

fn create_test_model_config() -> ModelConfig {
    ModelConfig {
        input_width: 8,
        input_height: 6,
        ..SortcamConfig::default().model
    }
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn solid_image(value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([value, value, value])))
}

#[test]
fn test_predictions_ranked_and_filtered() {
    let classifier = Classifier::new(
        &create_test_model_config(),
        Box::new(FixedBackend {
            output: ModelOutput::Float(vec![0.2, 0.005, 0.7, 0.095]),
        }),
        labels(&["empty", "noise", "good", "bad"]),
    );

    let predictions = classifier.classify(&solid_image(128), 4).unwrap();
    let names: Vec<&str> = predictions.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(names, vec!["good", "empty", "bad"]);
    assert!(predictions
        .windows(2)
        .all(|pair| pair[0].confidence >= pair[1].confidence));

    let top = classifier.classify(&solid_image(128), 1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].label, "good");
    assert_eq!(classifier.inference_count(), 2);
}

#[test]
fn test_quantized_scores_are_dequantized() {
    let classifier = Classifier::new(
        &create_test_model_config(),
        Box::new(FixedBackend {
            output: ModelOutput::Quantized(vec![0, 192, 64]),
        }),
        labels(&["empty", "good", "bad"]),
    );

    let predictions = classifier.classify(&solid_image(0), 3).unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].label, "good");
    assert!((predictions[0].confidence - 0.75).abs() < 1e-6);
    assert_eq!(predictions[1].label, "bad");
    assert!((predictions[1].confidence - 0.25).abs() < 1e-6);
}

#[test]
fn test_dequantize_with_zero_point() {
    let scores = ModelOutput::Quantized(vec![10, 138]).dequantize(0.5, 10);
    assert_eq!(scores, vec![0.0, 64.0]);
}

#[test]
fn test_scores_beyond_labels_get_placeholder_names() {
    let classifier = Classifier::new(
        &create_test_model_config(),
        Box::new(FixedBackend {
            output: ModelOutput::Float(vec![0.1, 0.9]),
        }),
        labels(&["only"]),
    );

    let predictions = classifier.classify(&solid_image(10), 1).unwrap();
    assert_eq!(predictions[0].label, "class_1");
}

#[test]
fn test_backend_failure_is_per_call() {
    let classifier = Classifier::new(
        &create_test_model_config(),
        Box::new(FailingBackend),
        labels(&["good", "bad"]),
    );

    let result = classifier.classify(&solid_image(10), 1);
    assert!(matches!(result, Err(ModelError::Invocation { .. })));
    assert_eq!(classifier.inference_count(), 0);
}

#[test]
fn test_preprocess_nhwc_range() {
    let classifier = Classifier::new(
        &create_test_model_config(),
        Box::new(FailingBackend),
        labels(&["x"]),
    );

    let white = classifier.preprocess(&solid_image(255));
    assert_eq!(white.shape(), &[1, 6, 8, 3]);
    assert!(white.iter().all(|&v| (v - 1.0).abs() < 1e-6));

    let black = classifier.preprocess(&solid_image(0));
    assert!(black.iter().all(|&v| (v + 1.0).abs() < 1e-6));
}

#[test]
fn test_preprocess_nchw_layout() {
    let config = ModelConfig {
        layout: TensorLayout::Nchw,
        ..create_test_model_config()
    };
    let classifier = Classifier::new(&config, Box::new(FailingBackend), labels(&["x"]));

    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([255, 0, 255])));
    let tensor = classifier.preprocess(&image);
    assert_eq!(tensor.shape(), &[1, 3, 6, 8]);
    assert!((tensor[[0, 0, 3, 4]] - 1.0).abs() < 1e-6);
    assert!((tensor[[0, 1, 3, 4]] + 1.0).abs() < 1e-6);
    assert!((tensor[[0, 2, 3, 4]] - 1.0).abs() < 1e-6);
}

#[test]
fn test_concurrent_calls_never_overlap_inference() {
    let busy = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));

    let classifier = Arc::new(Classifier::new(
        &create_test_model_config(),
        Box::new(OverlapDetector {
            busy: Arc::clone(&busy),
            overlapped: Arc::clone(&overlapped),
            calls: Arc::clone(&calls),
        }),
        labels(&["good", "bad"]),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let classifier = Arc::clone(&classifier);
            std::thread::spawn(move || classifier.classify(&solid_image(i * 30), 1))
        })
        .collect();

    for handle in handles {
        let predictions = handle.join().unwrap().unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].label, "bad");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[test]
fn test_parse_labels() {
    let parsed = parse_labels("0,good\n1, bad \n\nempty\r\n");
    assert_eq!(parsed, vec!["good", "bad", "empty"]);
}

#[test]
fn test_load_labels_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "0,good").unwrap();
    writeln!(file, "1,bad").unwrap();

    let loaded = load_labels(file.path()).unwrap();
    assert_eq!(loaded, vec!["good", "bad"]);
}

#[test]
fn test_load_labels_errors() {
    let missing = load_labels(std::path::Path::new("/nonexistent/labels.csv"));
    assert!(matches!(missing, Err(ModelError::Labels { .. })));

    let empty = tempfile::NamedTempFile::new().unwrap();
    assert!(matches!(
        load_labels(empty.path()),
        Err(ModelError::Labels { .. })
    ));
}

#[test]
fn test_from_config_without_model_fails() {
    let mut labels_file = tempfile::NamedTempFile::new().unwrap();
    writeln!(labels_file, "0,good").unwrap();

    let config = ModelConfig {
        path: "/nonexistent/model.onnx".to_string(),
        labels_path: labels_file.path().display().to_string(),
        ..SortcamConfig::default().model
    };

    assert!(matches!(
        Classifier::from_config(&config),
        Err(ModelError::Load { .. }) | Err(ModelError::Unavailable)
    ));
}
