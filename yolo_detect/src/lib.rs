mod inference_service;
mod server;

pub mod backend;
pub mod config;
pub mod error;
pub mod labels;
pub mod persist;
pub mod processing;
pub mod telemetry;

pub use backend::{InferenceBackend, Pipeline};
pub use error::{DetectError, ServerError};
pub use inference_service::{DetectionService, Handled};
pub use server::{load_backend, start_server, GrpcServer};
