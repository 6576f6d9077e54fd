//! Error Handling Module
//!
//! Defines the error type shared by the preprocessing, model and saliency code.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for AgroDetect operations
#[derive(Error, Debug)]
pub enum AgroDetectError {
    /// Uploaded bytes could not be decoded as an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The model has no convolution-like layer to attribute saliency to
    #[error("No convolution layer found in model")]
    NoConvolutionLayerFound,

    /// The located layer does not receive a gradient from the class output
    #[error("Gradient unavailable for layer '{0}'")]
    GradientUnavailable(String),

    /// A layer name or index that the model does not declare
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// Model artifact or model config could not be loaded
    #[error("Failed to load model from '{0}': {1}")]
    ModelLoad(PathBuf, String),

    /// Label vocabulary could not be loaded or does not match the model
    #[error("Failed to load vocabulary: {0}")]
    VocabularyLoad(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while evaluating the model or reading tensors back
    #[error("Inference error: {0}")]
    Inference(String),

    /// Overlay encoding error
    #[error("Encoding error: {0}")]
    Encode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for AgroDetect operations
pub type Result<T> = std::result::Result<T, AgroDetectError>;

impl AgroDetectError {
    /// Whether this error is caused by the request input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, AgroDetectError::InvalidImage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgroDetectError::GradientUnavailable("conv".to_string());
        assert_eq!(format!("{}", err), "Gradient unavailable for layer 'conv'");
    }

    #[test]
    fn test_model_load_error() {
        let path = PathBuf::from("/models/agrodetect.mpk");
        let err = AgroDetectError::ModelLoad(path, "file not found".to_string());
        assert!(format!("{}", err).contains("agrodetect.mpk"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AgroDetectError::InvalidImage("bad header".into()).is_client_error());
        assert!(!AgroDetectError::NoConvolutionLayerFound.is_client_error());
    }
}
