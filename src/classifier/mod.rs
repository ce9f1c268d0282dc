// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Leaf health classification
//!
//! The [`Classifier`] trait is the seam between the HTTP layer and the model.
//! [`onnx::OnnxClassifier`] runs the pretrained network; tests substitute
//! their own implementation.

pub mod onnx;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::{LeafscanError, Result};

/// Outcome of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class_index: usize,
    pub class_name: String,
    /// Probability of the winning class as a percentage, two decimals
    pub confidence: f64,
}

/// Image classifier over a fixed label set
pub trait Classifier: Send + Sync {
    /// Name of this classifier
    fn name(&self) -> &'static str;

    /// Labels in output order
    fn labels(&self) -> &[String];

    /// Classify a decoded image
    fn classify(&self, image: &DynamicImage) -> Result<Classification>;

    /// Decode raw upload bytes and classify them
    fn classify_bytes(&self, bytes: &[u8]) -> Result<Classification> {
        let image = image::load_from_memory(bytes)?;
        self.classify(&image)
    }
}

impl Classification {
    /// Pick the most probable class from raw model logits
    pub fn from_logits(logits: &[f32], labels: &[String]) -> Result<Self> {
        if logits.len() != labels.len() {
            return Err(LeafscanError::Inference(format!(
                "Model produced {} scores for {} labels",
                logits.len(),
                labels.len()
            )));
        }

        let probs = softmax(logits);
        let (class_index, prob) = arg_max(&probs)
            .ok_or_else(|| LeafscanError::Inference("Model produced no scores".to_string()))?;

        Ok(Self {
            class_index,
            class_name: labels[class_index].clone(),
            confidence: to_percent(prob),
        })
    }
}

/// Resize to `size`×`size` RGB and lay out as a 1×3×H×W tensor in [0, 1]
pub fn preprocess(image: &DynamicImage, size: u32) -> Vec<f32> {
    let rgb = image
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    data
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest element; the first wins on ties
pub fn arg_max(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

/// Probability to a percentage rounded to two decimals
pub fn to_percent(prob: f32) -> f64 {
    let pct = (prob as f64 * 100.0).clamp(0.0, 100.0);
    (pct * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn labels() -> Vec<String> {
        crate::config::ModelConfig::default().classes
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_arg_max_prefers_first_on_tie() {
        assert_eq!(arg_max(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(arg_max(&[]), None);
    }

    #[test]
    fn test_to_percent_rounds_two_decimals() {
        assert_eq!(to_percent(0.123456), 12.35);
        assert_eq!(to_percent(1.0), 100.0);
        assert_eq!(to_percent(0.0), 0.0);
    }

    #[test]
    fn test_from_logits_picks_label() {
        let result = Classification::from_logits(&[0.1, 0.2, 5.0, 0.3], &labels()).unwrap();
        assert_eq!(result.class_index, 2);
        assert_eq!(result.class_name, "Signs of mold");
        assert!(result.confidence > 90.0 && result.confidence <= 100.0);
    }

    #[test]
    fn test_from_logits_uniform_scores() {
        let result = Classification::from_logits(&[0.0; 4], &labels()).unwrap();
        assert_eq!(result.class_index, 0);
        assert_eq!(result.confidence, 25.0);
    }

    #[test]
    fn test_from_logits_rejects_shape_mismatch() {
        assert!(Classification::from_logits(&[1.0, 2.0], &labels()).is_err());
    }

    #[test]
    fn test_preprocess_layout() {
        let mut img = RgbImage::new(4, 4);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([255, 0, 51]);
        }
        let tensor = preprocess(&DynamicImage::ImageRgb8(img), 2);

        assert_eq!(tensor.len(), 3 * 2 * 2);
        assert!(tensor[..4].iter().all(|&v| (v - 1.0).abs() < 0.01));
        assert!(tensor[4..8].iter().all(|&v| v.abs() < 0.01));
        assert!(tensor[8..].iter().all(|&v| (v - 0.2).abs() < 0.01));
    }
}
