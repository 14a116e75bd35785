use crate::{
    backend::InferenceBackend,
    error::DetectError,
    persist::{Artifacts, Persister},
};
use detect_codec::{decode_image, encode_detection, encode_image, ImageFormat};
use detect_proto::{yolo_detect_server::YoloDetect, DetectRequest, DetectResponse};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tonic::{async_trait, Request, Response, Status};

/// Outcome of the synchronous part of a request.
pub struct Handled {
    pub response: DetectResponse,
    pub artifacts: Option<Artifacts>,
}

pub struct DetectionService<B: InferenceBackend> {
    backend: Arc<B>,
    workers: Arc<Semaphore>,
    persister: Option<Arc<Persister>>,
}

impl<B: InferenceBackend> Clone for DetectionService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            workers: Arc::clone(&self.workers),
            persister: self.persister.clone(),
        }
    }
}

impl<B: InferenceBackend> DetectionService<B> {
    pub fn new(backend: B, workers: usize, persister: Option<Persister>) -> Self {
        Self {
            backend: Arc::new(backend),
            workers: Arc::new(Semaphore::new(workers.max(1))),
            persister: persister.map(Arc::new),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Decode, infer and encode one request. Blocks for the whole inference.
    pub fn handle_request(&self, payload: &[u8]) -> Result<Handled, DetectError> {
        let image = decode_image(payload).map_err(DetectError::Decode)?;
        tracing::debug!(
            "Decoded {}x{} image in {} order",
            image.width(),
            image.height(),
            image.order().as_str()
        );

        let image = image.to_order(self.backend.channel_order());
        let (annotated, result) = self.backend.infer_single(&image)?;

        tracing::debug!("Returning {} detections", result.len());
        for (i, detection) in result.detections.iter().enumerate() {
            let bbox = &detection.bounding_box;
            tracing::debug!(
                "Detection {}: class={} ({}), confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_id,
                detection.class_label,
                detection.confidence,
                bbox.x1,
                bbox.y1,
                bbox.x2,
                bbox.y2
            );
        }

        let response = DetectResponse {
            image: encode_image(&annotated, ImageFormat::Jpeg).map_err(DetectError::Encode)?,
            detect: encode_detection(&result).map_err(DetectError::Encode)?,
        };

        let artifacts = self
            .persister
            .as_ref()
            .map(|persister| persister.artifacts(image, result));

        Ok(Handled {
            response,
            artifacts,
        })
    }
}

#[async_trait]
impl<B: InferenceBackend> YoloDetect for DetectionService<B> {
    async fn detect(
        &self,
        request: Request<DetectRequest>,
    ) -> Result<Response<DetectResponse>, Status> {
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Status::unavailable("worker pool is closed"))?;

        let payload = request.into_inner().image;
        let service = self.clone();
        // The permit lives as long as the blocking work, even if this future
        // is dropped by a deadline or a disconnect.
        let handled = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            service.handle_request(&payload)
        })
            .await
            .map_err(|e| Status::internal(format!("worker task failed: {}", e)))?
            .map_err(|err| {
                tracing::warn!("Request failed: {}", err);
                Status::from(err)
            })?;

        if let (Some(persister), Some(artifacts)) = (&self.persister, handled.artifacts) {
            persister.spawn_save(artifacts);
        }

        Ok(Response::new(handled.response))
    }
}
