//! Inference module: classification with Grad-CAM saliency
//!
//! This module provides:
//! - Image decoding and preprocessing into classifier input tensors
//! - Grad-CAM saliency against the last convolution of a classifier
//! - Heatmap colorization, blending and JPEG/base64 encoding
//! - Severity scoring and templated explanation text
//! - The [`Analyzer`] that runs the whole pipeline for one image

pub mod analyzer;
pub mod explanation;
pub mod gradcam;
pub mod labels;
pub mod overlay;
pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use analyzer::{Analysis, Analyzer};
pub use explanation::{generate_explanation, severity_from_confidence, SeverityBand};
pub use gradcam::{GradCam, GradCamOutput, Heatmap};
pub use labels::Vocabulary;
pub use overlay::{compose_overlay, Overlay};
pub use predictor::{ClassPrediction, PredictionResult};
pub use preprocess::{decode_image, Preprocessor};

/// Side length of the square classifier input and of the output heatmap
pub const MODEL_INPUT_SIZE: usize = 224;
