use crate::error::DetectError;
use chrono::Utc;
use detect_codec::{container, DetectionResult, ImageBuffer, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What one request leaves behind on disk.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub id: String,
    pub image: ImageBuffer,
    pub result: DetectionResult,
}

#[derive(Debug)]
pub struct Persister {
    output_dir: PathBuf,
    sequence: AtomicU64,
}

impl Persister {
    pub fn new(output_dir: &Path) -> Result<Self, DetectError> {
        fs::create_dir_all(output_dir).map_err(|e| {
            DetectError::Persistence(format!("cannot create {:?}: {}", output_dir, e))
        })?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Timestamp with microseconds plus a process-wide sequence number, so
    /// concurrent requests never share an id.
    pub fn next_id(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{:06}",
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            sequence
        )
    }

    pub fn artifacts(&self, image: ImageBuffer, result: DetectionResult) -> Artifacts {
        Artifacts {
            id: self.next_id(),
            image,
            result,
        }
    }

    /// Writes `<id>.jpg` and `<id>.json`, returning both paths.
    pub fn save(&self, artifacts: &Artifacts) -> Result<(PathBuf, PathBuf), DetectError> {
        let image_path = self.output_dir.join(format!(
            "{}.{}",
            artifacts.id,
            ImageFormat::Jpeg.extension()
        ));
        let record_path = self.output_dir.join(format!("{}.json", artifacts.id));

        let image = container::encode(&artifacts.image, ImageFormat::Jpeg)
            .map_err(|e| DetectError::Persistence(format!("cannot encode image: {}", e)))?;
        fs::write(&image_path, image)
            .map_err(|e| DetectError::Persistence(format!("cannot write {:?}: {}", image_path, e)))?;

        let record = serde_json::to_vec_pretty(&artifacts.result)
            .map_err(|e| DetectError::Persistence(format!("cannot serialize result: {}", e)))?;
        fs::write(&record_path, record).map_err(|e| {
            DetectError::Persistence(format!("cannot write {:?}: {}", record_path, e))
        })?;

        Ok((image_path, record_path))
    }

    /// Fire-and-forget: failures are logged and never reach the caller.
    pub fn spawn_save(self: &Arc<Self>, artifacts: Artifacts) {
        let persister = Arc::clone(self);
        tokio::task::spawn_blocking(move || match persister.save(&artifacts) {
            Ok((image_path, _)) => tracing::debug!("Persisted request artifacts to {:?}", image_path),
            Err(e) => tracing::warn!("Dropping request artifacts {}: {}", artifacts.id, e),
        });
    }
}
