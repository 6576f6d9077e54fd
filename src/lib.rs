//! # AgroDetect
//!
//! Plant disease detection with visual explanations, built on the Burn framework.
//!
//! A leaf photo is classified by a convolutional network, and Grad-CAM attributes
//! the prediction to regions of the image. The result is the predicted disease,
//! its confidence, a heatmap overlay (JPEG, base64) and a short advisory text.
//!
//! ## Modules
//!
//! - `backend`: Burn backend selection (NdArray or CUDA, wrapped in `Autodiff`)
//! - `model`: Layer-stack interface, CNN classifier, last-convolution locator
//! - `inference`: Preprocessing, Grad-CAM, overlay compositing, explanations
//! - `utils`: Logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agrodetect::backend::{default_device, AnalysisBackend};
//! use agrodetect::inference::{Analyzer, Vocabulary};
//! use agrodetect::model::load_classifier;
//!
//! let device = default_device();
//! let (model, config) = load_classifier::<AnalysisBackend>(config_path, weights_path, &device)?;
//! let vocabulary = Vocabulary::load(labels_path)?;
//! let analyzer = Analyzer::new(model, vocabulary, config.normalization, device)?;
//!
//! let analysis = analyzer.analyze(&std::fs::read("leaf.jpg")?)?;
//! println!("{} ({:.1}%)", analysis.prediction.label, analysis.prediction.confidence * 100.0);
//! ```

pub mod backend;
pub mod inference;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use inference::{Analysis, Analyzer, Heatmap, PredictionResult, Vocabulary, MODEL_INPUT_SIZE};
pub use model::{LayerStack, PlantClassifier, PlantClassifierConfig};
pub use utils::error::{AgroDetectError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
