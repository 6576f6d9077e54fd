//! Two-class, single-convolution classifier with fixed weights
//!
//! Used by tests and the CLI smoke path where a deterministic model is
//! needed. Inputs are expected in MobileNet normalization ([-1, 1]).
//!
//! Channel 0 of the convolution responds to green pixels, channel 1 to
//! brown/red pixels. The dense layer maps channel `i` to class `i`, so a mostly
//! green leaf is classified as class 0.

use burn::{
    module::{Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor, TensorData},
};

use crate::model::layers::{Activation, LayerInfo, LayerKind, LayerStack};
use crate::utils::error::{AgroDetectError, Result};

/// Class labels matching the fixed weights
pub const TINY_CLASS_NAMES: [&str; 2] = ["Leaf___healthy", "Leaf___rust_spot"];

/// Center tap of each 3x3 filter, per input channel (R, G, B)
const CENTER_TAPS: [[f32; 3]; 2] = [
    [-0.5, 1.0, 0.0], // green detector
    [1.0, -0.5, 0.0], // brown detector
];

/// Scale of the identity dense layer
const DENSE_GAIN: f32 = 4.0;

const LAYERS: [(&str, LayerKind); 6] = [
    ("conv", LayerKind::Conv2d),
    ("relu", LayerKind::Relu),
    ("global_pool", LayerKind::GlobalAvgPool2d),
    ("flatten", LayerKind::Flatten),
    ("dense", LayerKind::Linear),
    ("softmax", LayerKind::Softmax),
];

#[derive(Module, Debug)]
pub struct TinyLeafNet<B: Backend> {
    pub conv: Conv2d<B>,
    pub global_pool: AdaptiveAvgPool2d,
    pub dense: Linear<B>,
}

impl<B: Backend> TinyLeafNet<B> {
    /// Build the network with its fixed, deterministic weights
    pub fn with_fixed_weights(device: &B::Device) -> Self {
        let mut conv = Conv2dConfig::new([3, 2], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        // weight layout: [out, in, ky, kx]
        let mut weights = vec![0.0f32; 2 * 3 * 3 * 3];
        for (out, taps) in CENTER_TAPS.iter().enumerate() {
            for (channel, tap) in taps.iter().enumerate() {
                weights[((out * 3 + channel) * 3 + 1) * 3 + 1] = *tap;
            }
        }
        conv.weight = Param::from_tensor(Tensor::from_data(
            TensorData::new(weights, [2, 3, 3, 3]),
            device,
        ));
        conv.bias = Some(Param::from_tensor(Tensor::zeros([2], device)));

        let mut dense = LinearConfig::new(2, 2).init(device);
        dense.weight = Param::from_tensor(Tensor::from_data(
            TensorData::new(vec![DENSE_GAIN, 0.0, 0.0, DENSE_GAIN], [2, 2]),
            device,
        ));
        dense.bias = Some(Param::from_tensor(Tensor::zeros([2], device)));

        Self {
            conv,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dense,
        }
    }
}

impl<B: Backend> LayerStack<B> for TinyLeafNet<B> {
    fn layers(&self) -> Vec<LayerInfo> {
        LAYERS
            .iter()
            .map(|(name, kind)| LayerInfo::new(*name, *kind))
            .collect()
    }

    fn apply_layer(&self, index: usize, input: Activation<B>) -> Result<Activation<B>> {
        let (name, _) = LAYERS
            .get(index)
            .ok_or_else(|| AgroDetectError::UnknownLayer(format!("index {}", index)))?;

        let output = match index {
            0 => Activation::Spatial(self.conv.forward(input.into_spatial(name)?)),
            1 => Activation::Spatial(Relu::new().forward(input.into_spatial(name)?)),
            2 => Activation::Spatial(self.global_pool.forward(input.into_spatial(name)?)),
            3 => {
                let x = input.into_spatial(name)?;
                let [batch_size, channels, height, width] = x.dims();
                Activation::Flat(x.reshape([batch_size, channels * height * width]))
            }
            4 => Activation::Flat(self.dense.forward(input.into_flat(name)?)),
            _ => Activation::Flat(softmax(input.into_flat(name)?, 1)),
        };
        Ok(output)
    }

    fn num_classes(&self) -> usize {
        2
    }
}
