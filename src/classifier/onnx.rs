// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Classifier backed by ONNX Runtime

use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::{preprocess, Classification, Classifier};
use crate::config::ModelConfig;
use crate::{LeafscanError, Result};

/// ResNet-style leaf classifier exported to ONNX
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    input_size: u32,
    labels: Vec<String>,
}

impl OnnxClassifier {
    /// Load the model once; it is never reloaded
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        if !path.exists() {
            return Err(LeafscanError::Inference(format!("Model not found at {:?}", path)));
        }

        let session = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?
            .with_intra_threads(config.intra_threads)
            .map_err(load_error)?
            .commit_from_file(path)
            .map_err(load_error)?;

        info!("Loaded classifier model from {:?} ({} classes)", path, config.classes.len());

        Ok(Self {
            session: Mutex::new(session),
            input_name: config.input_name.clone(),
            input_size: config.input_size,
            labels: config.classes.clone(),
        })
    }

    fn run(&self, input: Vec<f32>) -> Result<Vec<f32>> {
        let size = self.input_size as usize;
        let tensor = Tensor::from_array(([1usize, 3, size, size], input.into_boxed_slice()))
            .map_err(|e| LeafscanError::Inference(e.to_string()))?;

        let mut session = self.session
            .lock()
            .map_err(|_| LeafscanError::Inference("Model lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| LeafscanError::Inference(e.to_string()))?;

        let logits = outputs.iter().next()
            .ok_or_else(|| LeafscanError::Inference("Model returned no outputs".to_string()))?;

        let (_shape, data) = logits.1
            .try_extract_tensor::<f32>()
            .map_err(|e| LeafscanError::Inference(e.to_string()))?;

        Ok(data.to_vec())
    }
}

fn load_error(e: impl std::fmt::Display) -> LeafscanError {
    LeafscanError::Inference(format!("Failed to load model: {}", e))
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn classify(&self, image: &DynamicImage) -> Result<Classification> {
        let input = preprocess(image, self.input_size);
        let logits = self.run(input)?;
        let result = Classification::from_logits(&logits, &self.labels)?;
        debug!("Classified as {} ({:.2}%)", result.class_name, result.confidence);
        Ok(result)
    }
}
