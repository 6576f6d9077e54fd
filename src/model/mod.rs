//! Model module for the classifiers consumed by the analysis pipeline
//!
//! This module provides:
//! - The layer-graph interface used for saliency attribution ([`LayerStack`])
//! - The last-convolution locator
//! - The CNN plant disease classifier built with Burn, and its artifact loading
//! - Input normalization settings stored alongside a model
//! - A tiny fixed-weight classifier for deterministic testing

pub mod cnn;
pub mod config;
pub mod layers;
pub mod tiny;

// Re-export main types for convenience
pub use cnn::{load_classifier, save_classifier, PlantClassifier, PlantClassifierConfig};
pub use config::Normalization;
pub use layers::{locate_last_conv, Activation, LayerInfo, LayerKind, LayerStack, LocatedLayer};
pub use tiny::{TinyLeafNet, TINY_CLASS_NAMES};
