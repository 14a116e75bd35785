use crate::config::{BackendConfig, Thresholds};
use crate::error::DetectError;
use crate::labels::LabelSchema;
use crate::processing::{draw, post, pre, Letterbox};
use detect_codec::{ChannelOrder, DetectionResult, ImageBuffer};
use image::RgbImage;
use ndarray::ArrayViewD;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "ort-backend")]
pub mod ort;

#[cfg(feature = "openvino-backend")]
pub mod openvino;

/// An inference runtime executing a YOLOv5 model.
///
/// A backend is loaded once and then shared read-only by every request, so
/// `infer_single` takes `&self` and implementations must give concurrent
/// calls separate execution contexts.
pub trait InferenceBackend: Send + Sync + 'static {
    /// Loads and compiles the model, then runs one warm-up pass.
    fn load(config: &BackendConfig) -> Result<Self, DetectError>
    where
        Self: Sized;

    fn name(&self) -> &'static str;

    /// Channel order `infer_single` expects its input in.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    /// Returns an annotated copy of `image` and the detections in
    /// original-image pixels.
    fn infer_single(
        &self,
        image: &ImageBuffer,
    ) -> Result<(ImageBuffer, DetectionResult), DetectError>;
}

/// Steps shared by every backend around the model execution itself.
#[derive(Debug, Clone)]
pub struct Pipeline {
    thresholds: Thresholds,
    input_size: u32,
    labels: LabelSchema,
}

impl Pipeline {
    pub fn new(thresholds: Thresholds, input_size: u32, labels: LabelSchema) -> Self {
        Self {
            thresholds,
            input_size,
            labels,
        }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, DetectError> {
        let labels = LabelSchema::load(&config.label_schema_path)?;
        tracing::info!(
            "Loaded {} class labels from {:?}",
            labels.len(),
            config.label_schema_path
        );
        Ok(Self::new(config.thresholds(), config.input_size, labels))
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn prepare(&self, image: &ImageBuffer) -> Result<(RgbImage, Letterbox), DetectError> {
        let rgb = image
            .to_rgb_image()
            .map_err(|e| DetectError::Inference(format!("invalid input image: {}", e)))?;
        Ok(pre::letterbox(&rgb, self.input_size))
    }

    pub fn finish(
        &self,
        image: &ImageBuffer,
        output: ArrayViewD<'_, f32>,
        letterbox: &Letterbox,
    ) -> Result<(ImageBuffer, DetectionResult), DetectError> {
        let detections = post::decode(output, &self.thresholds, letterbox, &self.labels)?;
        let annotated = draw::annotate(image, &detections, &self.labels)?;
        Ok((annotated, DetectionResult::new(detections, image.size())))
    }
}

/// Round-robin selection over a fixed pool of execution contexts.
#[derive(Debug, Default)]
pub(crate) struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub(crate) fn next(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % len.max(1)
    }
}
