//! Layer graph introspection
//!
//! A classifier exposes itself to the saliency code as an ordered stack of
//! named layers. Each layer can be applied on its own, which lets Grad-CAM
//! stop the evaluation at any layer and resume from its output without
//! knowing the concrete architecture.

use std::fmt;
use std::ops::Range;

use burn::tensor::{backend::Backend, Tensor};
use serde::Serialize;

use crate::utils::error::{AgroDetectError, Result};

/// Declared type of a layer in the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayerKind {
    Conv2d,
    DepthwiseConv2d,
    SeparableConv2d,
    BatchNorm,
    Relu,
    MaxPool2d,
    GlobalAvgPool2d,
    Flatten,
    Linear,
    Softmax,
}

impl LayerKind {
    /// Whether this layer produces a spatial feature map usable for saliency
    pub fn is_convolution(&self) -> bool {
        matches!(
            self,
            LayerKind::Conv2d | LayerKind::DepthwiseConv2d | LayerKind::SeparableConv2d
        )
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Conv2d => "Conv2d",
            LayerKind::DepthwiseConv2d => "DepthwiseConv2d",
            LayerKind::SeparableConv2d => "SeparableConv2d",
            LayerKind::BatchNorm => "BatchNorm",
            LayerKind::Relu => "Relu",
            LayerKind::MaxPool2d => "MaxPool2d",
            LayerKind::GlobalAvgPool2d => "GlobalAvgPool2d",
            LayerKind::Flatten => "Flatten",
            LayerKind::Linear => "Linear",
            LayerKind::Softmax => "Softmax",
        };
        write!(f, "{}", name)
    }
}

/// Name and type of one layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    pub name: String,
    pub kind: LayerKind,
}

impl LayerInfo {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// The layer chosen for saliency attribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedLayer {
    /// Position in the layer stack
    pub index: usize,
    pub name: String,
    pub kind: LayerKind,
}

/// Find the last convolution-like layer, scanning from the output backward.
///
/// The result only depends on the declared layer list, so callers compute it
/// once per loaded model.
pub fn locate_last_conv(layers: &[LayerInfo]) -> Result<LocatedLayer> {
    layers
        .iter()
        .enumerate()
        .rev()
        .find(|(_, layer)| layer.kind.is_convolution())
        .map(|(index, layer)| LocatedLayer {
            index,
            name: layer.name.clone(),
            kind: layer.kind,
        })
        .ok_or(AgroDetectError::NoConvolutionLayerFound)
}

/// Value flowing between two layers of the stack
#[derive(Debug, Clone)]
pub enum Activation<B: Backend> {
    /// Feature map `[batch, channels, height, width]`
    Spatial(Tensor<B, 4>),
    /// Flattened features or class scores `[batch, features]`
    Flat(Tensor<B, 2>),
}

impl<B: Backend> Activation<B> {
    pub fn into_spatial(self, layer: &str) -> Result<Tensor<B, 4>> {
        match self {
            Activation::Spatial(x) => Ok(x),
            Activation::Flat(x) => Err(AgroDetectError::Inference(format!(
                "layer '{}' expects a feature map, got flat tensor {:?}",
                layer,
                x.dims()
            ))),
        }
    }

    pub fn into_flat(self, layer: &str) -> Result<Tensor<B, 2>> {
        match self {
            Activation::Flat(x) => Ok(x),
            Activation::Spatial(x) => Err(AgroDetectError::Inference(format!(
                "layer '{}' expects a flat tensor, got feature map {:?}",
                layer,
                x.dims()
            ))),
        }
    }
}

/// A classifier that can be evaluated one declared layer at a time.
///
/// The last layer must produce the class probability vector `[batch, classes]`.
pub trait LayerStack<B: Backend> {
    /// Layers in evaluation order
    fn layers(&self) -> Vec<LayerInfo>;

    /// Apply the layer at `index` to its input
    fn apply_layer(&self, index: usize, input: Activation<B>) -> Result<Activation<B>>;

    /// Number of output classes
    fn num_classes(&self) -> usize;

    /// Number of input channels expected by the first layer
    fn input_channels(&self) -> usize {
        3
    }

    fn num_layers(&self) -> usize {
        self.layers().len()
    }

    /// Position of the layer called `name`
    fn layer_index(&self, name: &str) -> Result<usize> {
        self.layers()
            .iter()
            .position(|layer| layer.name == name)
            .ok_or_else(|| AgroDetectError::UnknownLayer(name.to_string()))
    }

    /// Evaluate the layers in `range` in order
    fn forward_range(&self, input: Activation<B>, range: Range<usize>) -> Result<Activation<B>> {
        if range.end > self.num_layers() {
            return Err(AgroDetectError::UnknownLayer(format!(
                "index {} out of {} layers",
                range.end - 1,
                self.num_layers()
            )));
        }
        range.into_iter().try_fold(input, |x, index| self.apply_layer(index, x))
    }

    /// Full evaluation: image tensor to class probabilities
    fn forward(&self, input: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        self.forward_range(Activation::Spatial(input), 0..self.num_layers())?
            .into_flat("output")
    }

    /// Evaluate up to and including `layer`, returning its feature map
    fn forward_until(&self, input: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 4>> {
        let index = self.layer_index(layer)?;
        self.forward_range(Activation::Spatial(input), 0..index + 1)?
            .into_spatial(layer)
    }

    /// Continue from the feature map produced by `layer` to the class probabilities
    fn forward_from(&self, activation: Tensor<B, 4>, layer: &str) -> Result<Tensor<B, 2>> {
        let index = self.layer_index(layer)?;
        self.forward_range(Activation::Spatial(activation), index + 1..self.num_layers())?
            .into_flat("output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(kinds: &[(&str, LayerKind)]) -> Vec<LayerInfo> {
        kinds
            .iter()
            .map(|(name, kind)| LayerInfo::new(*name, *kind))
            .collect()
    }

    #[test]
    fn test_locate_conv_before_trailing_dense() {
        let layers = stack(&[
            ("conv_a", LayerKind::Conv2d),
            ("relu_a", LayerKind::Relu),
            ("conv_b", LayerKind::Conv2d),
            ("pool", LayerKind::GlobalAvgPool2d),
            ("flatten", LayerKind::Flatten),
            ("dense", LayerKind::Linear),
        ]);

        let located = locate_last_conv(&layers).unwrap();
        assert_eq!(located.name, "conv_b");
        assert_eq!(located.index, 2);
        assert_eq!(located.kind, LayerKind::Conv2d);
    }

    #[test]
    fn test_locate_recognizes_depthwise_and_separable() {
        let depthwise = stack(&[
            ("conv", LayerKind::Conv2d),
            ("dw", LayerKind::DepthwiseConv2d),
            ("bn", LayerKind::BatchNorm),
        ]);
        assert_eq!(locate_last_conv(&depthwise).unwrap().name, "dw");

        let separable = stack(&[
            ("sep", LayerKind::SeparableConv2d),
            ("dense", LayerKind::Linear),
            ("softmax", LayerKind::Softmax),
        ]);
        assert_eq!(locate_last_conv(&separable).unwrap().name, "sep");
    }

    #[test]
    fn test_locate_without_conv_fails() {
        let layers = stack(&[
            ("flatten", LayerKind::Flatten),
            ("dense", LayerKind::Linear),
            ("softmax", LayerKind::Softmax),
        ]);
        assert!(matches!(
            locate_last_conv(&layers),
            Err(AgroDetectError::NoConvolutionLayerFound)
        ));
        assert!(matches!(
            locate_last_conv(&[]),
            Err(AgroDetectError::NoConvolutionLayerFound)
        ));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(LayerKind::SeparableConv2d.to_string(), "SeparableConv2d");
        assert!(!LayerKind::MaxPool2d.is_convolution());
    }
}
