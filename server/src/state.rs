//! Application state for the AgroDetect server
//!
//! Holds the analyzer loaded at startup and the server start time.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use agrodetect::backend::{default_device, AnalysisBackend};
use agrodetect::inference::{Analyzer, Vocabulary};
use agrodetect::model::{load_classifier, PlantClassifier};

/// The analyzer type served over HTTP
pub type ServerAnalyzer = Analyzer<AnalysisBackend, PlantClassifier<AnalysisBackend>>;

/// Paths of the model artifacts
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Burn record file with the classifier weights
    pub model_path: PathBuf,
    /// Classifier config JSON
    pub config_path: PathBuf,
    /// JSON array of class labels
    pub labels_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/model.mpk"),
            config_path: PathBuf::from("model/config.json"),
            labels_path: PathBuf::from("model/class_names.json"),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Shared by all requests; serializes only the classifier evaluation
    pub analyzer: ServerAnalyzer,
    /// Name of the layer saliency is computed against
    pub model_layer: String,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(analyzer: ServerAnalyzer) -> Self {
        let model_layer = analyzer.layer().name.clone();
        Self {
            analyzer,
            model_layer,
            started_at: Instant::now(),
        }
    }

    /// Load the classifier and vocabulary named in `config`
    pub fn load(config: &ServerConfig) -> agrodetect::Result<Self> {
        let device = default_device();
        let (model, model_config) =
            load_classifier::<AnalysisBackend>(&config.config_path, &config.model_path, &device)?;
        let vocabulary = Vocabulary::load(&config.labels_path)?;
        let analyzer = Analyzer::new(model, vocabulary, model_config.normalization, device)?;

        Ok(Self::new(analyzer))
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
