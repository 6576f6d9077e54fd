//! Image preprocessing
//!
//! Turns an uploaded image into the `[1, 3, size, size]` tensor the classifier
//! expects: resize, convert to float, normalize, add the batch dimension.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, RgbImage};

use crate::inference::MODEL_INPUT_SIZE;
use crate::model::Normalization;
use crate::utils::error::{AgroDetectError, Result};

/// Decode uploaded bytes into an image
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| AgroDetectError::InvalidImage(e.to_string()))
}

/// Resize an image to a square RGB raster
fn resize_image(image: &DynamicImage, size: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(size, size, filter).to_rgb8()
}

/// Normalize an RGB raster to a flat vector in CHW layout
fn normalize_image(rgb: &RgbImage, normalization: Normalization) -> Vec<f32> {
    let num_pixels = (rgb.width() * rgb.height()) as usize;
    let mut normalized = vec![0.0f32; 3 * num_pixels];

    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            normalized[c * num_pixels + i] = normalization.apply(c, pixel[c]);
        }
    }

    normalized
}

/// Converts images into classifier input tensors
#[derive(Debug, Clone)]
pub struct Preprocessor {
    /// Target side length
    pub image_size: u32,
    /// Normalization the classifier was trained with
    pub normalization: Normalization,
    /// Resampling filter used to reach `image_size`
    pub filter: FilterType,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(Normalization::default())
    }
}

impl Preprocessor {
    pub fn new(normalization: Normalization) -> Self {
        Self {
            image_size: MODEL_INPUT_SIZE as u32,
            normalization,
            filter: FilterType::CatmullRom,
        }
    }

    /// Configure image size
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }

    /// Normalized CHW values for an image
    pub fn pixels(&self, image: &DynamicImage) -> Vec<f32> {
        let resized = resize_image(image, self.image_size, self.filter);
        normalize_image(&resized, self.normalization)
    }

    /// Preprocess an image into a `[1, 3, size, size]` tensor
    pub fn preprocess<B: Backend>(&self, image: &DynamicImage, device: &B::Device) -> Tensor<B, 4> {
        let size = self.image_size as usize;
        Tensor::from_data(TensorData::new(self.pixels(image), [1, 3, size, size]), device)
    }
}
