//! Client side of the `object_detect.YoloDetect` service.

use detect_codec::{
    container, decode_detection, decode_image, transport, CodecError, DetectionResult,
    ImageBuffer, ImageFormat,
};
use detect_proto::{yolo_detect_client::YoloDetectClient, DetectRequest};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tonic::transport::Channel;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to gRPC server: {0}")]
    ConnectionFailed(#[from] tonic::transport::Error),
    #[error("Maximum connection retries exceeded.")]
    MaxRetriesExceeded,
    #[error("gRPC request failed: {0}")]
    GrpcRequestFailed(#[from] tonic::Status),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to export detections: {0}")]
    Export(#[from] serde_json::Error),
}

/// Decoded `Detect` response.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub annotated: ImageBuffer,
    pub result: DetectionResult,
}

pub struct DetectClient {
    client: YoloDetectClient<Channel>,
}

impl DetectClient {
    /// Connects with jittered exponential back-off, giving up after
    /// `max_retries` attempts.
    pub async fn connect(
        address: String,
        max_retries: u32,
        max_message_size: usize,
    ) -> Result<Self, ClientError> {
        let mut retry_delay = Duration::from_millis(50);
        let max_retry_delay = Duration::from_secs(1);

        for attempt in 1..=max_retries {
            match timeout(
                Duration::from_secs(1),
                YoloDetectClient::connect(address.clone()),
            )
            .await
            {
                Ok(Ok(client)) => {
                    let client = client
                        .max_decoding_message_size(max_message_size)
                        .max_encoding_message_size(max_message_size);
                    return Ok(Self { client });
                }
                Ok(Err(e)) => {
                    tracing::error!("Failed to connect to gRPC server (attempt {}): {:?}", attempt, e);
                }
                Err(_) => {
                    tracing::error!("Connection timeout (attempt {})", attempt);
                }
            }

            if attempt < max_retries {
                let jitter = rand::random::<f32>() * 0.2 + 0.9;
                sleep(retry_delay.mul_f32(jitter)).await;
                retry_delay = (retry_delay * 2).min(max_retry_delay);
            }
        }

        Err(ClientError::MaxRetriesExceeded)
    }

    /// Sends the file as-is after checking locally that it is a readable image.
    pub async fn detect_file(&mut self, path: &Path) -> Result<Outcome, ClientError> {
        let bytes = std::fs::read(path).map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        container::decode(&bytes)?;
        self.detect_bytes(&bytes).await
    }

    /// `bytes` is a compressed image (JPEG, PNG, ...), not yet base64 encoded.
    pub async fn detect_bytes(&mut self, bytes: &[u8]) -> Result<Outcome, ClientError> {
        let request = DetectRequest {
            image: transport::encode(bytes),
        };
        let response = self.client.detect(request).await?.into_inner();

        Ok(Outcome {
            annotated: decode_image(&response.image)?,
            result: decode_detection(&response.detect)?,
        })
    }
}

/// Writes `<stem>_detected.jpg` and `<stem>.json` into `output_dir`.
pub fn save_outcome(
    outcome: &Outcome,
    output_dir: &Path,
    stem: &str,
) -> Result<(PathBuf, PathBuf), ClientError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ClientError::Io { path, source }
    };

    std::fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;

    let image_path = output_dir.join(format!("{}_detected.jpg", stem));
    let encoded = container::encode(&outcome.annotated, ImageFormat::Jpeg)?;
    std::fs::write(&image_path, encoded).map_err(io_error(&image_path))?;

    let json_path = output_dir.join(format!("{}.json", stem));
    let exported = serde_json::to_vec_pretty(&outcome.result)?;
    std::fs::write(&json_path, exported).map_err(io_error(&json_path))?;

    Ok((image_path, json_path))
}

pub fn log_detections(result: &DetectionResult) {
    tracing::info!(
        "{} detections on a {}x{} image",
        result.len(),
        result.image_size.width,
        result.image_size.height
    );
    for detection in &result.detections {
        let bbox = &detection.bounding_box;
        tracing::info!(
            "{} ({}) {:.3} [{:.1}, {:.1}, {:.1}, {:.1}]",
            detection.class_label,
            detection.class_id,
            detection.confidence,
            bbox.x1,
            bbox.y1,
            bbox.x2,
            bbox.y2
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detect_codec::{BoundingBox, ChannelOrder, Detection};

    fn outcome() -> Outcome {
        let annotated = ImageBuffer::filled(20, 10, ChannelOrder::Rgb, [1, 2, 3]);
        let result = DetectionResult::new(
            vec![Detection {
                class_id: 16,
                class_label: "dog".to_string(),
                confidence: 0.87,
                bounding_box: BoundingBox::new(1., 2., 15., 9.),
            }],
            annotated.size(),
        );
        Outcome { annotated, result }
    }

    #[test]
    fn test_save_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");

        let (image_path, json_path) = save_outcome(&outcome(), &out, "dog").unwrap();

        assert_eq!(image_path, out.join("dog_detected.jpg"));
        let saved = container::decode(&std::fs::read(&image_path).unwrap()).unwrap();
        assert_eq!((saved.width(), saved.height()), (20, 10));

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(json["detections"][0]["class_label"], "dog");
        assert_eq!(json["image_size"]["width"], 20);
    }

    #[tokio::test]
    async fn test_connect_gives_up() {
        // nothing listens on the discard port of localhost
        let err = DetectClient::connect("http://127.0.0.1:9".to_string(), 2, 1024)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::MaxRetriesExceeded));
    }
}
