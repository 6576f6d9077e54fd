//! CNN Model Architecture for Plant Disease Classification
//!
//! This module implements the convolutional classifier served by AgroDetect
//! using the Burn framework. The network is exposed as a [`LayerStack`] so the
//! saliency code can split its evaluation at the last convolution.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::model::config::Normalization;
use crate::model::layers::{Activation, LayerInfo, LayerKind, LayerStack};
use crate::utils::error::{self, AgroDetectError};

/// Configuration for the PlantClassifier CNN model
#[derive(Config, Debug)]
pub struct PlantClassifierConfig {
    /// Number of output classes (38 for PlantVillage)
    #[config(default = "38")]
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "224")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Base number of convolutional filters, doubled after every block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Number of conv blocks (each halves the spatial resolution)
    #[config(default = "4")]
    pub num_blocks: usize,

    /// How many of the trailing blocks use depthwise-separable convolutions
    #[config(default = "0")]
    pub separable_blocks: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "256")]
    pub hidden_units: usize,

    /// Pixel normalization the weights were trained with
    #[config(default = "Normalization::MobileNet")]
    pub normalization: Normalization,
}

impl PlantClassifierConfig {
    /// Validate the configuration
    pub fn validate(&self) -> error::Result<()> {
        if self.num_classes == 0 {
            return Err(AgroDetectError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }
        if self.num_blocks == 0 {
            return Err(AgroDetectError::Config(
                "num_blocks must be at least 1".to_string(),
            ));
        }
        if self.separable_blocks > self.num_blocks {
            return Err(AgroDetectError::Config(format!(
                "separable_blocks ({}) exceeds num_blocks ({})",
                self.separable_blocks, self.num_blocks
            )));
        }
        if self.input_size >> self.num_blocks == 0 {
            return Err(AgroDetectError::Config(format!(
                "input_size {} is too small for {} pooling blocks",
                self.input_size, self.num_blocks
            )));
        }
        Ok(())
    }

    /// Channel count of the last conv block
    pub fn feature_channels(&self) -> usize {
        self.base_filters << (self.num_blocks - 1)
    }
}

/// Layers contributed by every [`ConvBlock`]: conv, bn, relu, pool
const LAYERS_PER_BLOCK: usize = 4;

/// Layers after the conv blocks
const HEAD_LAYERS: [(&str, LayerKind); 6] = [
    ("global_pool", LayerKind::GlobalAvgPool2d),
    ("flatten", LayerKind::Flatten),
    ("fc1", LayerKind::Linear),
    ("fc1_relu", LayerKind::Relu),
    ("fc2", LayerKind::Linear),
    ("softmax", LayerKind::Softmax),
];

/// A CNN block with Conv2d, BatchNorm, ReLU and MaxPool
///
/// When `pointwise` is set, `conv` is a depthwise convolution and the pair
/// forms one depthwise-separable convolution.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub pointwise: Option<Conv2d<B>>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        separable: bool,
        device: &B::Device,
    ) -> Self {
        let (conv, pointwise) = if separable {
            let depthwise = Conv2dConfig::new([in_channels, in_channels], [kernel_size, kernel_size])
                .with_groups(in_channels)
                .with_padding(PaddingConfig2d::Same)
                .init(device);
            let pointwise = Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device);
            (depthwise, Some(pointwise))
        } else {
            let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_padding(PaddingConfig2d::Same)
                .init(device);
            (conv, None)
        };

        Self {
            conv,
            pointwise,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    fn layer_infos(&self, prefix: &str) -> [LayerInfo; LAYERS_PER_BLOCK] {
        let conv_kind = if self.pointwise.is_some() {
            LayerKind::SeparableConv2d
        } else {
            LayerKind::Conv2d
        };
        [
            LayerInfo::new(format!("{prefix}_conv"), conv_kind),
            LayerInfo::new(format!("{prefix}_bn"), LayerKind::BatchNorm),
            LayerInfo::new(format!("{prefix}_relu"), LayerKind::Relu),
            LayerInfo::new(format!("{prefix}_pool"), LayerKind::MaxPool2d),
        ]
    }

    /// Apply one step of the block (0 = conv, 1 = bn, 2 = relu, 3 = pool)
    fn apply(&self, step: usize, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match step {
            0 => {
                let x = self.conv.forward(x);
                match &self.pointwise {
                    Some(pointwise) => pointwise.forward(x),
                    None => x,
                }
            }
            1 => batch_norm_inference(&self.bn, x),
            2 => self.relu.forward(x),
            _ => self.pool.forward(x),
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        (0..LAYERS_PER_BLOCK).fold(x, |x, step| self.apply(step, x))
    }
}

/// Batch norm with frozen running statistics.
///
/// `BatchNorm::forward` switches to batch statistics whenever the backend
/// tracks gradients, which is always the case during Grad-CAM.
pub fn batch_norm_inference<B: Backend>(bn: &BatchNorm<B, 2>, x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [channels] = bn.gamma.val().dims();
    let shape = [1, channels, 1, 1];

    let mean = bn.running_mean.value().reshape(shape);
    let var = bn.running_var.value().reshape(shape);
    let gamma = bn.gamma.val().reshape(shape);
    let beta = bn.beta.val().reshape(shape);

    (x - mean) / var.add_scalar(bn.epsilon).sqrt() * gamma + beta
}

/// Plant Disease Classifier CNN
///
/// Architecture:
/// - `num_blocks` convolutional blocks with doubling filter counts
/// - BatchNorm, ReLU and 2x2 MaxPool after each convolution
/// - Global Average Pooling
/// - Two fully connected layers and a softmax over the classes
#[derive(Module, Debug)]
pub struct PlantClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    num_classes: usize,
    in_channels: usize,
}

impl<B: Backend> PlantClassifier<B> {
    /// Create a new PlantClassifier from configuration (random weights)
    pub fn new(config: &PlantClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;
        let first_separable = config.num_blocks - config.separable_blocks.min(config.num_blocks);

        // 3 -> base -> 2*base -> ...
        let blocks = (0..config.num_blocks)
            .map(|i| {
                let in_channels = if i == 0 { config.in_channels } else { base << (i - 1) };
                ConvBlock::new(in_channels, base << i, 3, i >= first_separable, device)
            })
            .collect();

        Self {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(config.feature_channels(), config.hidden_units).init(device),
            fc2: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            num_classes: config.num_classes,
            in_channels: config.in_channels,
        }
    }

    fn apply_head(&self, step: usize, input: Activation<B>) -> error::Result<Activation<B>> {
        let name = HEAD_LAYERS[step].0;
        let output = match step {
            0 => Activation::Spatial(self.global_pool.forward(input.into_spatial(name)?)),
            1 => {
                // [B, C, 1, 1] -> [B, C]
                let x = input.into_spatial(name)?;
                let [batch_size, channels, height, width] = x.dims();
                Activation::Flat(x.reshape([batch_size, channels * height * width]))
            }
            2 => Activation::Flat(self.fc1.forward(input.into_flat(name)?)),
            3 => Activation::Flat(Relu::new().forward(input.into_flat(name)?)),
            4 => Activation::Flat(self.fc2.forward(input.into_flat(name)?)),
            _ => Activation::Flat(softmax(input.into_flat(name)?, 1)),
        };
        Ok(output)
    }
}

impl<B: Backend> LayerStack<B> for PlantClassifier<B> {
    fn layers(&self) -> Vec<LayerInfo> {
        let mut layers: Vec<LayerInfo> = self
            .blocks
            .iter()
            .enumerate()
            .flat_map(|(i, block)| block.layer_infos(&format!("block{}", i + 1)))
            .collect();
        layers.extend(
            HEAD_LAYERS
                .iter()
                .map(|(name, kind)| LayerInfo::new(*name, *kind)),
        );
        layers
    }

    fn apply_layer(&self, index: usize, input: Activation<B>) -> error::Result<Activation<B>> {
        let conv_layers = self.blocks.len() * LAYERS_PER_BLOCK;

        if index < conv_layers {
            let block = &self.blocks[index / LAYERS_PER_BLOCK];
            let x = input.into_spatial(&format!("block{}", index / LAYERS_PER_BLOCK + 1))?;
            return Ok(Activation::Spatial(block.apply(index % LAYERS_PER_BLOCK, x)));
        }

        let step = index - conv_layers;
        if step >= HEAD_LAYERS.len() {
            return Err(AgroDetectError::UnknownLayer(format!("index {}", index)));
        }
        self.apply_head(step, input)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn input_channels(&self) -> usize {
        self.in_channels
    }
}

/// Load a trained classifier from its config JSON and Burn record file
pub fn load_classifier<B: Backend>(
    config_path: &Path,
    weights_path: &Path,
    device: &B::Device,
) -> error::Result<(PlantClassifier<B>, PlantClassifierConfig)> {
    let config = PlantClassifierConfig::load(config_path)
        .map_err(|e| AgroDetectError::ModelLoad(config_path.to_path_buf(), format!("{:?}", e)))?;
    config.validate()?;

    let model = PlantClassifier::<B>::new(&config, device)
        .load_file(weights_path, &CompactRecorder::new(), device)
        .map_err(|e| AgroDetectError::ModelLoad(weights_path.to_path_buf(), format!("{:?}", e)))?;

    tracing::info!(
        "Loaded classifier from {:?} ({} classes, {} blocks, {} normalization)",
        weights_path,
        config.num_classes,
        config.num_blocks,
        config.normalization
    );

    Ok((model, config))
}

/// Save a classifier as config JSON plus Burn record file
pub fn save_classifier<B: Backend>(
    model: &PlantClassifier<B>,
    config: &PlantClassifierConfig,
    config_path: &Path,
    weights_path: &Path,
) -> error::Result<()> {
    config.save(config_path)?;
    model
        .clone()
        .save_file(weights_path, &CompactRecorder::new())
        .map_err(|e| AgroDetectError::ModelLoad(weights_path.to_path_buf(), format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> PlantClassifierConfig {
        PlantClassifierConfig::new()
            .with_num_classes(5)
            .with_input_size(32)
            .with_base_filters(4)
            .with_num_blocks(2)
            .with_hidden_units(8)
    }

    #[test]
    fn test_plant_classifier_output_is_distribution() {
        let device = Default::default();
        let model = PlantClassifier::<TestBackend>::new(&small_config(), &device);

        let input = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);
        let output = model.forward(input).unwrap();
        assert_eq!(output.dims(), [2, 5]);

        let sums: Vec<f32> = output.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_layer_names_and_kinds() {
        let device = Default::default();
        let model = PlantClassifier::<TestBackend>::new(&small_config(), &device);
        let layers = model.layers();

        assert_eq!(layers.len(), 2 * LAYERS_PER_BLOCK + HEAD_LAYERS.len());
        assert_eq!(layers[0], LayerInfo::new("block1_conv", LayerKind::Conv2d));
        assert_eq!(layers[4].name, "block2_conv");
        assert_eq!(layers.last().unwrap().kind, LayerKind::Softmax);
        assert_eq!(model.input_channels(), 3);
    }

    #[test]
    fn test_separable_blocks_report_separable_kind() {
        let device = Default::default();
        let config = small_config().with_separable_blocks(1);
        let model = PlantClassifier::<TestBackend>::new(&config, &device);
        let layers = model.layers();

        assert_eq!(layers[0].kind, LayerKind::Conv2d);
        assert_eq!(layers[4].kind, LayerKind::SeparableConv2d);

        let output = model
            .forward(Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device))
            .unwrap();
        assert_eq!(output.dims(), [1, 5]);
    }

    #[test]
    fn test_split_forward_matches_full_forward() {
        let device = Default::default();
        let model = PlantClassifier::<TestBackend>::new(&small_config(), &device);
        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 32, 32],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let full = model.forward(input.clone()).unwrap();
        let features = model.forward_until(input, "block2_conv").unwrap();
        assert_eq!(features.dims(), [1, 8, 16, 16]);
        let split = model.forward_from(features, "block2_conv").unwrap();

        let full: Vec<f32> = full.into_data().to_vec().unwrap();
        let split: Vec<f32> = split.into_data().to_vec().unwrap();
        for (a, b) in full.iter().zip(split.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unknown_layer() {
        let device = Default::default();
        let model = PlantClassifier::<TestBackend>::new(&small_config(), &device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);

        assert!(matches!(
            model.forward_until(input, "block9_conv"),
            Err(AgroDetectError::UnknownLayer(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(small_config().validate().is_ok());
        assert!(small_config().with_num_classes(0).validate().is_err());
        assert!(small_config().with_separable_blocks(3).validate().is_err());
        assert!(small_config().with_input_size(2).validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("model_config.json");
        let weights_path = dir.path().join("model.mpk");

        let device = Default::default();
        let config = small_config().with_normalization(Normalization::ImageNet);
        let model = PlantClassifier::<TestBackend>::new(&config, &device);
        save_classifier(&model, &config, &config_path, &weights_path).unwrap();

        let (loaded, loaded_config) =
            load_classifier::<TestBackend>(&config_path, &weights_path, &device).unwrap();
        assert_eq!(loaded_config.normalization, Normalization::ImageNet);
        assert_eq!(loaded.num_classes(), 5);
        assert_eq!(loaded.layers(), model.layers());
    }

    #[test]
    fn test_load_missing_config_fails() {
        let device = Default::default();
        let result = load_classifier::<TestBackend>(
            Path::new("/nonexistent/config.json"),
            Path::new("/nonexistent/model.mpk"),
            &device,
        );
        assert!(matches!(result, Err(AgroDetectError::ModelLoad(_, _))));
    }
}
