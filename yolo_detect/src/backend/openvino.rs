use super::{InferenceBackend, Pipeline, RoundRobin};
use crate::config::{BackendConfig, Device};
use crate::error::DetectError;
use crate::processing::pre;
use detect_codec::{DetectionResult, ImageBuffer};
use ndarray::{Array4, ArrayD, IxDyn};
use openvino::{
    prepostprocess, CompiledModel, Core, DeviceType, ElementType, InferRequest, Layout, Model,
    Shape, Tensor,
};
use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;

fn load_error(err: impl std::fmt::Display) -> DetectError {
    DetectError::ModelLoad(err.to_string())
}

fn inference_error(err: impl std::fmt::Display) -> DetectError {
    DetectError::Inference(err.to_string())
}

/// With native preprocessing the compiled graph accepts `[1, H, W, 3]` and
/// performs the NHWC -> NCHW conversion itself; otherwise the host feeds the
/// model's own `[1, 3, H, W]` layout.
pub struct OpenVinoBackend {
    // Infer requests are derived from the compiled model, which must outlive them.
    requests: Vec<Mutex<InferRequest>>,
    _compiled: Mutex<CompiledModel>,
    next_request: RoundRobin,
    input_name: String,
    output_name: String,
    native_preprocessing: bool,
    pipeline: Pipeline,
}

fn device_type(device: &Device) -> DeviceType<'static> {
    match device {
        Device::Cpu => DeviceType::CPU,
        Device::Gpu(0) => DeviceType::GPU,
        Device::Gpu(id) => DeviceType::Other(Cow::Owned(format!("GPU.{}", id))),
        Device::Named(name) => DeviceType::Other(Cow::Owned(name.clone())),
    }
}

fn read_model(core: &mut Core, model_path: &Path) -> Result<Model, DetectError> {
    let model_file = model_path
        .to_str()
        .ok_or_else(|| DetectError::ModelLoad(format!("non UTF-8 model path {:?}", model_path)))?;
    // IR models keep their weights next to the .xml; ONNX files embed them.
    let weights = model_path.with_extension("bin");
    let weights_file = if model_path.extension().is_some_and(|ext| ext == "xml") {
        weights.to_str().unwrap_or_default()
    } else {
        ""
    };

    core.read_model_from_file(model_file, weights_file)
        .map_err(|e| DetectError::ModelLoad(format!("cannot read {:?}: {}", model_path, e)))
}

/// Moves the NHWC -> NCHW layout change into the compiled graph. Scaling to
/// [0, 1] is not available in-graph through these bindings and stays on the
/// host (`pre::to_nhwc`).
fn with_native_preprocessing(mut model: Model) -> Result<Model, DetectError> {
    let pipeline = prepostprocess::Pipeline::new(&mut model).map_err(load_error)?;

    let input_info = pipeline.get_input_info_by_index(0).map_err(load_error)?;
    let mut tensor_info = input_info.get_tensor_info().map_err(load_error)?;
    tensor_info
        .set_element_type(ElementType::F32)
        .map_err(load_error)?;
    tensor_info
        .set_layout(Layout::new("NHWC").map_err(load_error)?)
        .map_err(load_error)?;
    let mut model_info = input_info.get_model_info().map_err(load_error)?;
    model_info
        .set_layout(Layout::new("NCHW").map_err(load_error)?)
        .map_err(load_error)?;

    let output_info = pipeline.get_output_info_by_index(0).map_err(load_error)?;
    let mut output_tensor_info = output_info.get_tensor_info().map_err(load_error)?;
    output_tensor_info
        .set_element_type(ElementType::F32)
        .map_err(load_error)?;

    pipeline.build_new_model().map_err(load_error)
}

impl OpenVinoBackend {
    fn run_inference(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, DetectError> {
        let index = self.next_request.next(self.requests.len());
        let mut request = self.requests[index]
            .lock()
            .map_err(|e| inference_error(format!("infer request mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with infer request {}", index);
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let shape = Shape::new(&dims).map_err(inference_error)?;
        let mut tensor = Tensor::new(ElementType::F32, &shape).map_err(inference_error)?;
        let buffer = tensor.get_data_mut::<f32>().map_err(inference_error)?;
        for (dst, src) in buffer.iter_mut().zip(input.iter()) {
            *dst = *src;
        }

        request
            .set_tensor(&self.input_name, &tensor)
            .map_err(inference_error)?;
        request.infer().map_err(inference_error)?;

        let output = request
            .get_tensor(&self.output_name)
            .map_err(inference_error)?;
        let dims: Vec<usize> = output
            .get_shape()
            .map_err(inference_error)?
            .get_dimensions()
            .iter()
            .map(|&d| d as usize)
            .collect();
        let data = output.get_data::<f32>().map_err(inference_error)?.to_vec();

        ArrayD::from_shape_vec(IxDyn(&dims), data)
            .map_err(|e| inference_error(format!("invalid tensor shape: {}", e)))
    }

    fn input_tensor(&self, letterboxed: &image::RgbImage) -> Array4<f32> {
        if self.native_preprocessing {
            pre::to_nhwc(letterboxed)
        } else {
            pre::to_nchw(letterboxed)
        }
    }

    fn warm_up(&self) -> Result<(), DetectError> {
        let size = self.pipeline.input_size() as usize;
        let input = if self.native_preprocessing {
            Array4::<f32>::zeros((1, size, size, 3))
        } else {
            Array4::<f32>::zeros((1, 3, size, size))
        };
        for _ in 0..self.requests.len() {
            self.run_inference(&input)?;
        }
        Ok(())
    }
}

impl InferenceBackend for OpenVinoBackend {
    fn load(config: &BackendConfig) -> Result<Self, DetectError> {
        let pipeline = Pipeline::from_config(config)?;

        let mut core = Core::new().map_err(load_error)?;
        let model = read_model(&mut core, &config.model_path)?;
        let input_name = model
            .get_input_by_index(0)
            .and_then(|node| node.get_name())
            .map_err(load_error)?;
        let output_name = model
            .get_output_by_index(0)
            .and_then(|node| node.get_name())
            .map_err(load_error)?;

        let model = if config.use_native_preprocessing {
            with_native_preprocessing(model)?
        } else {
            model
        };

        let device = device_type(&config.device());
        let mut compiled = core.compile_model(&model, device).map_err(load_error)?;
        let requests = (0..config.num_instances)
            .map(|_| compiled.create_infer_request().map(Mutex::new))
            .collect::<Result<Vec<_>, _>>()
            .map_err(load_error)?;

        tracing::info!(
            "Compiled {:?} for OpenVINO device {} with {} infer requests (native preprocessing: {})",
            config.model_path,
            config.mode,
            requests.len(),
            config.use_native_preprocessing
        );

        let backend = Self {
            requests,
            _compiled: Mutex::new(compiled),
            next_request: RoundRobin::default(),
            input_name,
            output_name,
            native_preprocessing: config.use_native_preprocessing,
            pipeline,
        };
        backend
            .warm_up()
            .map_err(|e| DetectError::ModelLoad(format!("warm-up failed: {}", e)))?;

        Ok(backend)
    }

    fn name(&self) -> &'static str {
        "openvino"
    }

    fn infer_single(
        &self,
        image: &ImageBuffer,
    ) -> Result<(ImageBuffer, DetectionResult), DetectError> {
        let (letterboxed, letterbox) = self.pipeline.prepare(image)?;
        let input = self.input_tensor(&letterboxed);
        let output = self.run_inference(&input)?;
        self.pipeline.finish(image, output.view(), &letterbox)
    }
}
