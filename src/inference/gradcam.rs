//! Grad-CAM saliency
//!
//! Gradient-weighted class activation mapping for any [`LayerStack`]
//! classifier:
//!
//! 1. Evaluate the stack up to the last convolution and keep its feature map.
//! 2. Detach that feature map, mark it as requiring gradients and evaluate the
//!    rest of the stack from it, so the class probabilities and the activation
//!    come from the same forward pass.
//! 3. Take the predicted class (argmax) and backpropagate its probability to
//!    the feature map.
//! 4. Average the gradient over height and width to get one weight per channel.
//! 5. Sum the channels weighted by those weights, clip negatives, scale to a
//!    maximum of 1 and resample to the input resolution.

use burn::tensor::{
    backend::{AutodiffBackend, Backend},
    module::interpolate,
    ops::{InterpolateMode, InterpolateOptions},
    ElementConversion, Tensor,
};
use serde::Serialize;

use crate::inference::MODEL_INPUT_SIZE;
use crate::model::layers::{locate_last_conv, Activation, LayerStack, LocatedLayer};
use crate::utils::error::{AgroDetectError, Result};

/// A 2-D saliency map, row-major, values in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl Heatmap {
    /// Read a `[1, 1, height, width]` tensor back into a heatmap
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 4>) -> Result<Self> {
        let [_, _, height, width] = tensor.dims();
        let values = tensor
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| AgroDetectError::Inference(format!("heatmap read-back: {:?}", e)))?;

        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }
}

/// Result of one Grad-CAM evaluation
#[derive(Debug, Clone)]
pub struct GradCamOutput {
    /// Class probabilities from the same forward pass
    pub probabilities: Vec<f32>,
    /// Index of the explained (predicted) class
    pub class_index: usize,
    /// Normalized map at the feature map resolution
    pub feature_heatmap: Heatmap,
    /// Normalized map resampled to the output resolution
    pub heatmap: Heatmap,
}

/// Index of the first maximum
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value {
                (i, v)
            } else {
                (best, best_value)
            }
        })
        .0
}

/// Spatial mean of the gradients: `[1, c, h, w]` -> `[1, c, 1, 1]`
pub fn channel_weights<B: Backend>(gradients: Tensor<B, 4>) -> Tensor<B, 4> {
    gradients.mean_dim(2).mean_dim(3)
}

/// Channel-weighted sum of the activations: `[1, c, h, w]` -> `[1, 1, h, w]`
pub fn weighted_activation_map<B: Backend>(
    activations: Tensor<B, 4>,
    weights: Tensor<B, 4>,
) -> Tensor<B, 4> {
    (activations * weights).sum_dim(1)
}

/// Clip negatives and scale so the maximum is 1. An all-zero map stays zero.
pub fn relu_normalize<B: Backend>(map: Tensor<B, 4>) -> Tensor<B, 4> {
    let map = map.clamp_min(0.0);
    let max = map.clone().max().into_scalar().elem::<f32>();

    if max > 0.0 {
        map.div_scalar(max)
    } else {
        map.zeros_like()
    }
}

/// Bilinear resampling to `size x size`, kept inside [0, 1]
pub fn resize_heatmap<B: Backend>(map: Tensor<B, 4>, size: usize) -> Tensor<B, 4> {
    interpolate(
        map,
        [size, size],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
    .clamp(0.0, 1.0)
}

/// Grad-CAM engine bound to one model's last convolution
#[derive(Debug, Clone)]
pub struct GradCam {
    layer: LocatedLayer,
    output_size: usize,
}

impl GradCam {
    /// Locate the last convolution of `model` and check that it receives a
    /// gradient from the class output.
    pub fn new<B, M>(model: &M, device: &B::Device) -> Result<Self>
    where
        B: AutodiffBackend,
        M: LayerStack<B>,
    {
        let layer = locate_last_conv(&model.layers())?;
        let gradcam = Self {
            layer,
            output_size: MODEL_INPUT_SIZE,
        };

        let blank = Tensor::<B, 4>::zeros(
            [1, model.input_channels(), MODEL_INPUT_SIZE, MODEL_INPUT_SIZE],
            device,
        );
        gradcam.compute(model, blank)?;

        tracing::debug!(
            "Grad-CAM bound to layer '{}' ({}) at index {}",
            gradcam.layer.name,
            gradcam.layer.kind,
            gradcam.layer.index
        );
        Ok(gradcam)
    }

    /// Configure the side length of the resampled heatmap
    pub fn with_output_size(mut self, size: usize) -> Self {
        self.output_size = size;
        self
    }

    /// The layer saliency is attributed to
    pub fn layer(&self) -> &LocatedLayer {
        &self.layer
    }

    /// Classify `input` and compute the heatmap for the predicted class
    pub fn compute<B, M>(&self, model: &M, input: Tensor<B, 4>) -> Result<GradCamOutput>
    where
        B: AutodiffBackend,
        M: LayerStack<B>,
    {
        let split = self.layer.index + 1;

        let activation = model
            .forward_range(Activation::Spatial(input), 0..split)?
            .into_spatial(&self.layer.name)?
            .detach()
            .require_grad();

        let probabilities = model
            .forward_range(
                Activation::Spatial(activation.clone()),
                split..model.num_layers(),
            )?
            .into_flat("output")?;

        let probs = probabilities
            .clone()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| AgroDetectError::Inference(format!("probability read-back: {:?}", e)))?;
        if probs.is_empty() {
            return Err(AgroDetectError::Inference("model produced no classes".to_string()));
        }
        let class_index = argmax(&probs);

        let score = probabilities
            .slice([0..1, class_index..class_index + 1])
            .sum();
        let grads = score.backward();
        let gradients = activation
            .grad(&grads)
            .ok_or_else(|| AgroDetectError::GradientUnavailable(self.layer.name.clone()))?;

        let weights = channel_weights(gradients);
        let raw = weighted_activation_map(activation.inner(), weights);
        let normalized = relu_normalize(raw);
        let resized = resize_heatmap(normalized.clone(), self.output_size);

        Ok(GradCamOutput {
            probabilities: probs,
            class_index,
            feature_heatmap: Heatmap::from_tensor(normalized)?,
            heatmap: Heatmap::from_tensor(resized)?,
        })
    }
}
