//! Input normalization settings
//!
//! A classifier only predicts correctly when its input is normalized exactly
//! the way its training data was. The scheme is therefore stored with the
//! model config rather than hardcoded in the preprocessor.

use serde::{Deserialize, Serialize};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Pixel normalization expected by a classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// MobileNetV2 style: `x / 127.5 - 1`, values in [-1, 1]
    #[default]
    MobileNet,
    /// `(x / 255 - mean) / std` with ImageNet statistics
    ImageNet,
    /// `x / 255`, values in [0, 1]
    UnitRange,
}

impl Normalization {
    /// Normalize one 8-bit channel value
    pub fn apply(&self, channel: usize, value: u8) -> f32 {
        let value = value as f32;
        match self {
            Normalization::MobileNet => value / 127.5 - 1.0,
            Normalization::ImageNet => {
                (value / 255.0 - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
            }
            Normalization::UnitRange => value / 255.0,
        }
    }

    /// Smallest and largest value this normalization can produce
    pub fn range(&self) -> (f32, f32) {
        match self {
            Normalization::MobileNet => (-1.0, 1.0),
            Normalization::UnitRange => (0.0, 1.0),
            Normalization::ImageNet => (0..3).fold((f32::MAX, f32::MIN), |(lo, hi), c| {
                (lo.min(self.apply(c, 0)), hi.max(self.apply(c, 255)))
            }),
        }
    }
}

impl std::fmt::Display for Normalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Normalization::MobileNet => write!(f, "mobile_net"),
            Normalization::ImageNet => write!(f, "image_net"),
            Normalization::UnitRange => write!(f, "unit_range"),
        }
    }
}
