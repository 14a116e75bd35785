use detect_codec::CodecError;
use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("invalid image payload: {0}")]
    Decode(#[source] CodecError),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to encode response: {0}")]
    Encode(#[source] CodecError),
    #[error("failed to persist artifacts: {0}")]
    Persistence(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<DetectError> for Status {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Decode(_) => Status::invalid_argument(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
    #[error(transparent)]
    Detect(#[from] DetectError),
}
