//! Prediction results
//!
//! Turns a class probability vector into the predicted label and confidence.

use serde::Serialize;

use crate::inference::gradcam::argmax;
use crate::inference::labels::Vocabulary;

/// A single class prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassPrediction {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
}

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Predicted class index
    pub class_index: usize,

    /// Predicted class label
    pub label: String,

    /// Probability of the predicted class
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,

    /// Most likely classes, best first
    pub top_k: Vec<ClassPrediction>,
}

impl PredictionResult {
    /// Number of entries kept in `top_k`
    pub const TOP_K: usize = 3;

    pub fn new(probabilities: Vec<f32>, vocabulary: &Vocabulary) -> Self {
        let class_index = argmax(&probabilities);
        let confidence = probabilities.get(class_index).copied().unwrap_or(0.0);
        let label_of = |idx: usize| {
            vocabulary
                .get(idx)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown_{}", idx))
        };

        let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let top_k = ranked
            .into_iter()
            .take(Self::TOP_K)
            .map(|(idx, probability)| ClassPrediction {
                class_index: idx,
                label: label_of(idx),
                probability,
            })
            .collect();

        Self {
            class_index,
            label: label_of(class_index),
            confidence,
            probabilities,
            top_k,
        }
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = format!(
            "Prediction: {} (class {})\nConfidence: {:.2}%\n\nTop-{} predictions:\n",
            self.label,
            self.class_index,
            self.confidence * 100.0,
            self.top_k.len()
        );
        for (i, pred) in self.top_k.iter().enumerate() {
            output.push_str(&format!(
                "  {}. {} (class {}) - {:.2}%\n",
                i + 1,
                pred.label,
                pred.class_index,
                pred.probability * 100.0
            ));
        }
        output
    }
}
