use super::{InferenceBackend, Pipeline, RoundRobin};
use crate::config::{BackendConfig, Device};
use crate::error::DetectError;
use crate::processing::pre;
use detect_codec::{DetectionResult, ImageBuffer};
use ndarray::{Array4, ArrayD};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::Mutex;

fn load_error(err: impl std::fmt::Display) -> DetectError {
    DetectError::ModelLoad(err.to_string())
}

/// ONNX Runtime has no preprocessing graph of its own, so normalization and
/// the NCHW transpose always happen on the host.
pub struct OrtBackend {
    sessions: Vec<Mutex<Session>>,
    next_session: RoundRobin,
    pipeline: Pipeline,
}

impl OrtBackend {
    fn build_session(config: &BackendConfig) -> Result<Session, DetectError> {
        let builder = Session::builder()
            .map_err(load_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?;

        let builder = match config.device() {
            Device::Cpu => builder,
            #[cfg(feature = "cuda")]
            Device::Gpu(device_id) => builder
                .with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build()
                        .error_on_failure(),
                ])
                .map_err(load_error)?,
            #[cfg(not(feature = "cuda"))]
            Device::Gpu(_) => {
                return Err(DetectError::ModelLoad(
                    "GPU mode requires the `cuda` feature".to_string(),
                ))
            }
            Device::Named(name) => {
                return Err(DetectError::ModelLoad(format!(
                    "unsupported ONNX Runtime device {}",
                    name
                )))
            }
        };

        builder.commit_from_file(&config.model_path).map_err(|e| {
            DetectError::ModelLoad(format!("cannot load {:?}: {}", config.model_path, e))
        })
    }

    fn run_inference(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, DetectError> {
        let index = self.next_session.next(self.sessions.len());
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| DetectError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| DetectError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| DetectError::Inference(format!("session run failed: {}", e)))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectError::Inference(format!("failed to extract tensor: {}", e)))?;

        Ok(output.into_owned())
    }

    fn warm_up(&self) -> Result<(), DetectError> {
        let size = self.pipeline.input_size() as usize;
        let input = Array4::<f32>::zeros((1, 3, size, size));
        for _ in 0..self.sessions.len() {
            self.run_inference(&input)?;
        }
        Ok(())
    }
}

impl InferenceBackend for OrtBackend {
    fn load(config: &BackendConfig) -> Result<Self, DetectError> {
        ort::init()
            .with_name("yolo_detect")
            .commit()
            .map_err(|e| DetectError::ModelLoad(format!("cannot initialize ONNX Runtime: {}", e)))?;

        if config.use_native_preprocessing {
            tracing::info!("ONNX Runtime normalizes on the host, ignoring use_native_preprocessing");
        }

        let pipeline = Pipeline::from_config(config)?;
        let sessions = (0..config.num_instances)
            .map(|_| Self::build_session(config).map(Mutex::new))
            .collect::<Result<Vec<_>, DetectError>>()?;

        tracing::info!(
            "Created {} ONNX Runtime sessions for {:?} on {}",
            sessions.len(),
            config.model_path,
            config.mode
        );

        let backend = Self {
            sessions,
            next_session: RoundRobin::default(),
            pipeline,
        };
        backend
            .warm_up()
            .map_err(|e| DetectError::ModelLoad(format!("warm-up failed: {}", e)))?;

        Ok(backend)
    }

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn infer_single(
        &self,
        image: &ImageBuffer,
    ) -> Result<(ImageBuffer, DetectionResult), DetectError> {
        let (letterboxed, letterbox) = self.pipeline.prepare(image)?;
        let input = pre::to_nchw(&letterboxed);
        let output = self.run_inference(&input)?;
        self.pipeline.finish(image, output.view(), &letterbox)
    }
}
