//! End-to-end leaf analysis
//!
//! [`Analyzer`] owns everything that is loaded once at startup (the frozen
//! classifier, the Grad-CAM layer binding and the label vocabulary) and runs
//! the request pipeline: decode, preprocess, classify + Grad-CAM, composite,
//! explain.
//!
//! Only the classifier evaluation is serialized. Decoding, preprocessing,
//! compositing and explanation run without holding the model lock, so one
//! `Analyzer` can be shared between threads.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use burn::module::Module;
use burn::tensor::{backend::AutodiffBackend, Tensor};
use image::DynamicImage;
use serde::Serialize;

use crate::inference::explanation::{generate_explanation, severity_from_confidence, SeverityBand};
use crate::inference::gradcam::{GradCam, GradCamOutput, Heatmap};
use crate::inference::labels::Vocabulary;
use crate::inference::overlay::compose_overlay;
use crate::inference::predictor::PredictionResult;
use crate::inference::preprocess::{decode_image, Preprocessor};
use crate::model::{LayerStack, LocatedLayer, Normalization};
use crate::utils::error::Result;
use crate::utils::format_millis;

/// Result of analyzing one leaf image
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub prediction: PredictionResult,

    /// `round(confidence * 100)`
    pub severity: u8,

    pub band: SeverityBand,

    pub explanation: String,

    /// Base64 (standard alphabet, padded) of `overlay_jpeg`
    pub overlay_base64: String,

    /// JPEG-encoded heatmap overlay
    #[serde(skip)]
    pub overlay_jpeg: Vec<u8>,

    /// Saliency at the model input resolution
    #[serde(skip)]
    pub heatmap: Heatmap,

    /// Saliency at the feature map resolution, before resampling
    #[serde(skip)]
    pub feature_heatmap: Heatmap,

    pub inference_time_ms: f64,
}

/// Grad-CAM analyzer bound to one classifier
///
/// The model is evaluated on an autodiff backend so gradients can flow back to
/// the located convolution; its parameters are frozen with `no_grad`.
pub struct Analyzer<B: AutodiffBackend, M> {
    model: Mutex<M>,
    gradcam: GradCam,
    preprocessor: Preprocessor,
    vocabulary: Vocabulary,
    device: B::Device,
}

impl<B, M> Analyzer<B, M>
where
    B: AutodiffBackend,
    M: Module<B> + LayerStack<B>,
{
    /// Freeze `model`, locate its last convolution and check the vocabulary
    /// matches the class count.
    pub fn new(
        model: M,
        vocabulary: Vocabulary,
        normalization: Normalization,
        device: B::Device,
    ) -> Result<Self> {
        vocabulary.check_num_classes(model.num_classes())?;

        let model = model.no_grad();
        let gradcam = GradCam::new(&model, &device)?;

        tracing::info!(
            "Analyzer ready: {} classes, Grad-CAM layer '{}', {} normalization",
            vocabulary.len(),
            gradcam.layer().name,
            normalization
        );

        Ok(Self {
            model: Mutex::new(model),
            gradcam,
            preprocessor: Preprocessor::new(normalization),
            vocabulary,
            device,
        })
    }

    /// The convolution saliency is computed against
    pub fn layer(&self) -> &LocatedLayer {
        self.gradcam.layer()
    }

    /// Analyze encoded image bytes (any format the `image` crate decodes)
    pub fn analyze(&self, bytes: &[u8]) -> Result<Analysis> {
        let image = decode_image(bytes)?;
        tracing::debug!("Decoded {}x{} image", image.width(), image.height());
        self.analyze_image(&image)
    }

    /// Analyze an already decoded image
    pub fn analyze_image(&self, image: &DynamicImage) -> Result<Analysis> {
        let started = Instant::now();

        let input = self.preprocess(image);
        let cam = self.saliency(input)?;
        self.finish(image, cam, started)
    }

    /// Classifier input tensor for `image`
    pub fn preprocess(&self, image: &DynamicImage) -> Tensor<B, 4> {
        self.preprocessor.preprocess::<B>(image, &self.device)
    }

    /// Classify `input` and compute its Grad-CAM heatmap.
    ///
    /// This is the only step that takes the model lock. The model is never
    /// mutated, so a lock poisoned by a panicking caller is recovered.
    pub fn saliency(&self, input: Tensor<B, 4>) -> Result<GradCamOutput> {
        let model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        self.gradcam.compute(&*model, input)
    }

    /// Label, overlay and explanation for a Grad-CAM result on `image`
    pub fn finish(
        &self,
        image: &DynamicImage,
        cam: GradCamOutput,
        started: Instant,
    ) -> Result<Analysis> {
        let prediction = PredictionResult::new(cam.probabilities, &self.vocabulary);

        let overlay = compose_overlay(&cam.heatmap, image)?;

        let severity = severity_from_confidence(prediction.confidence);
        let band = SeverityBand::from_severity(severity);
        let explanation = generate_explanation(&prediction.label, severity);

        let elapsed = started.elapsed();
        tracing::info!(
            "Predicted {} ({:.1}%) in {}",
            prediction.label,
            prediction.confidence * 100.0,
            format_millis(elapsed)
        );

        Ok(Analysis {
            prediction,
            severity,
            band,
            explanation,
            overlay_base64: overlay.base64,
            overlay_jpeg: overlay.jpeg,
            heatmap: cam.heatmap,
            feature_heatmap: cam.feature_heatmap,
            inference_time_ms: duration_ms(elapsed),
        })
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
