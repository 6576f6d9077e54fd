//! End-to-end analysis with the fixed-weight two-class classifier

use std::io::Cursor;

use agrodetect::inference::{Analyzer, GradCam, Heatmap, Vocabulary};
use agrodetect::model::{
    Activation, LayerInfo, LayerKind, LayerStack, Normalization, TinyLeafNet, TINY_CLASS_NAMES,
};
use agrodetect::{AgroDetectError, MODEL_INPUT_SIZE};
use base64::Engine;
use burn::backend::Autodiff;
use burn::tensor::{activation::softmax, backend::Backend, Tensor};
use burn_ndarray::NdArray;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

type TestBackend = Autodiff<NdArray>;

/// 300x300 leaf: left half green (0, 200, 0), right half brown (150, 75, 0)
fn half_green_png() -> Vec<u8> {
    let img = RgbImage::from_fn(300, 300, |x, _| {
        if x < 150 {
            Rgb([0, 200, 0])
        } else {
            Rgb([150, 75, 0])
        }
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

/// Mean heatmap value over the columns `[from, to)`
fn column_mean(heatmap: &Heatmap, from: usize, to: usize) -> f32 {
    let mut sum = 0.0;
    for y in 0..heatmap.height {
        for x in from..to {
            sum += heatmap.get(x, y);
        }
    }
    sum / ((to - from) * heatmap.height) as f32
}

fn tiny_analyzer() -> Analyzer<TestBackend, TinyLeafNet<TestBackend>> {
    let device = Default::default();
    let model = TinyLeafNet::with_fixed_weights(&device);
    let vocabulary: Vocabulary = TINY_CLASS_NAMES.into_iter().collect();
    Analyzer::new(model, vocabulary, Normalization::MobileNet, device).unwrap()
}

#[test]
fn test_half_green_leaf_is_healthy() {
    let analyzer = tiny_analyzer();
    assert_eq!(analyzer.layer().name, "conv");

    let analysis = analyzer.analyze(&half_green_png()).unwrap();

    assert_eq!(analysis.prediction.class_index, 0);
    assert_eq!(analysis.prediction.label, "Leaf___healthy");
    assert!(
        (analysis.prediction.confidence - 0.798).abs() < 0.03,
        "confidence {}",
        analysis.prediction.confidence
    );
    let total: f32 = analysis.prediction.probabilities.iter().sum();
    assert!((total - 1.0).abs() < 1e-5);

    assert_eq!(analysis.severity, (analysis.prediction.confidence * 100.0).round() as u8);
    assert!(analysis.explanation.contains("AI detected Leaf   healthy."));
    assert!(analysis.explanation.contains("high severity"));
}

#[test]
fn test_heatmap_highlights_green_half() {
    let analysis = tiny_analyzer().analyze(&half_green_png()).unwrap();

    assert!((analysis.feature_heatmap.max() - 1.0).abs() < 1e-6);

    let heatmap = &analysis.heatmap;
    assert_eq!((heatmap.width, heatmap.height), (MODEL_INPUT_SIZE, MODEL_INPUT_SIZE));
    assert!(heatmap.values.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!(column_mean(heatmap, 0, 100) > 0.9);
    assert!(column_mean(heatmap, 124, 224) < 0.1);
}

#[test]
fn test_overlay_is_decodable_jpeg() {
    let analysis = tiny_analyzer().analyze(&half_green_png()).unwrap();

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&analysis.overlay_base64)
        .unwrap();
    assert_eq!(decoded, analysis.overlay_jpeg);

    let overlay = image::load_from_memory(&analysis.overlay_jpeg).unwrap();
    assert_eq!(image::guess_format(&analysis.overlay_jpeg).unwrap(), ImageFormat::Jpeg);
    assert_eq!(
        (overlay.width(), overlay.height()),
        (MODEL_INPUT_SIZE as u32, MODEL_INPUT_SIZE as u32)
    );
}

#[test]
fn test_analysis_is_idempotent() {
    let analyzer = tiny_analyzer();
    let bytes = half_green_png();

    let first = analyzer.analyze(&bytes).unwrap();
    let second = analyzer.analyze(&bytes).unwrap();

    assert_eq!(first.prediction, second.prediction);
    assert_eq!(first.explanation, second.explanation);
    assert_eq!(first.heatmap, second.heatmap);
    assert_eq!(first.overlay_jpeg, second.overlay_jpeg);
}

#[test]
fn test_invalid_bytes_are_rejected() {
    let analyzer = tiny_analyzer();

    for bytes in [&b""[..], &b"GIF89a but not really"[..], &[0xFF, 0xD8, 0xFF][..]] {
        let result = analyzer.analyze(bytes);
        assert!(matches!(result, Err(AgroDetectError::InvalidImage(_))));
    }
}

/// Classifier without any convolution: pool, flatten, softmax
struct PoolOnly;

impl<B: Backend> LayerStack<B> for PoolOnly {
    fn layers(&self) -> Vec<LayerInfo> {
        vec![
            LayerInfo::new("pool", LayerKind::GlobalAvgPool2d),
            LayerInfo::new("flatten", LayerKind::Flatten),
            LayerInfo::new("softmax", LayerKind::Softmax),
        ]
    }

    fn apply_layer(&self, index: usize, input: Activation<B>) -> agrodetect::Result<Activation<B>> {
        Ok(match index {
            0 => Activation::Spatial(input.into_spatial("pool")?.mean_dim(2).mean_dim(3)),
            1 => {
                let x = input.into_spatial("flatten")?;
                let [batch, channels, _, _] = x.dims();
                Activation::Flat(x.reshape([batch, channels]))
            }
            _ => Activation::Flat(softmax(input.into_flat("softmax")?, 1)),
        })
    }

    fn num_classes(&self) -> usize {
        3
    }
}

#[test]
fn test_model_without_convolution_is_rejected() {
    let device = Default::default();
    let result = GradCam::new::<TestBackend, _>(&PoolOnly, &device);
    assert!(matches!(result, Err(AgroDetectError::NoConvolutionLayerFound)));
}

/// Declares a convolution, but its head replaces the features with a constant,
/// so the class output never depends on the convolution.
struct ConstantHead;

impl LayerStack<TestBackend> for ConstantHead {
    fn layers(&self) -> Vec<LayerInfo> {
        vec![
            LayerInfo::new("conv", LayerKind::Conv2d),
            LayerInfo::new("flatten", LayerKind::Flatten),
            LayerInfo::new("softmax", LayerKind::Softmax),
        ]
    }

    fn apply_layer(
        &self,
        index: usize,
        input: Activation<TestBackend>,
    ) -> agrodetect::Result<Activation<TestBackend>> {
        Ok(match index {
            0 => Activation::Spatial(input.into_spatial("conv")?),
            1 => {
                let x = input.into_spatial("flatten")?;
                let [batch, channels, _, _] = x.dims();
                Activation::Flat(Tensor::ones([batch, channels], &x.device()).require_grad())
            }
            _ => Activation::Flat(softmax(input.into_flat("softmax")?, 1)),
        })
    }

    fn num_classes(&self) -> usize {
        3
    }
}

#[test]
fn test_disconnected_convolution_fails_at_startup() {
    let device = Default::default();
    let result = GradCam::new::<TestBackend, _>(&ConstantHead, &device);

    assert!(matches!(
        result,
        Err(AgroDetectError::GradientUnavailable(ref layer)) if layer == "conv"
    ));
}
