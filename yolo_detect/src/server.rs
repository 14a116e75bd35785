use crate::{
    backend::InferenceBackend,
    config::{BackendConfig, BackendKind, Config, ServerConfig},
    error::{DetectError, ServerError},
    inference_service::DetectionService,
    persist::Persister,
};
use detect_proto::yolo_detect_server::YoloDetectServer;
use std::future::Future;
use std::net::SocketAddr;
use tokio::{net::TcpListener, signal};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;

pub struct GrpcServer {
    router: Router,
}

impl GrpcServer {
    /// Mounts the detection service next to health and reflection. The
    /// worker pool lives in the service; the message size limit applies in
    /// both directions.
    pub async fn new<B: InferenceBackend>(
        service: DetectionService<B>,
        config: &ServerConfig,
    ) -> Result<Self, ServerError> {
        let (health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<YoloDetectServer<DetectionService<B>>>()
            .await;

        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(detect_proto::FILE_DESCRIPTOR_SET)
            .build_v1alpha()?;

        let detect_service = YoloDetectServer::new(service)
            .max_decoding_message_size(config.max_message_size())
            .max_encoding_message_size(config.max_message_size());

        let mut builder = Server::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let router = builder
            .add_service(health_service)
            .add_service(reflection_service)
            .add_service(detect_service);

        Ok(Self { router })
    }

    pub async fn run(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Detection service listening on {}", addr);
        self.router.serve_with_shutdown(addr, shutdown).await?;
        Ok(())
    }

    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Detection service listening on {}", listener.local_addr()?);
        self.router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;
        Ok(())
    }
}

/// Loads the model off the async runtime; the service never starts serving
/// when this fails.
pub async fn load_backend<B: InferenceBackend>(config: &BackendConfig) -> Result<B, DetectError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || B::load(&config))
        .await
        .map_err(|e| DetectError::ModelLoad(format!("loader task failed: {}", e)))?
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let persister = if config.persistence.enabled {
        let persister = Persister::new(&config.persistence.output_dir)?;
        tracing::info!("Persisting request artifacts to {:?}", persister.output_dir());
        Some(persister)
    } else {
        None
    };

    match config.backend.kind {
        #[cfg(feature = "ort-backend")]
        BackendKind::Ort => serve::<crate::backend::ort::OrtBackend>(&config, persister).await,
        #[cfg(feature = "openvino-backend")]
        BackendKind::OpenVino => {
            serve::<crate::backend::openvino::OpenVinoBackend>(&config, persister).await
        }
        #[allow(unreachable_patterns)]
        kind => Err(DetectError::ModelLoad(format!(
            "backend {} is not compiled in, enable its cargo feature",
            kind.as_str()
        ))
        .into()),
    }
}

async fn serve<B: InferenceBackend>(
    config: &Config,
    persister: Option<Persister>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = load_backend::<B>(&config.backend).await?;
    tracing::info!(
        "Loaded {} backend from {:?}",
        backend.name(),
        config.backend.model_path
    );

    let service = DetectionService::new(backend, config.server.workers, persister);
    let addr = config.server.socket_addr()?;
    let grpc_server = GrpcServer::new(service, &config.server).await?;

    let shutdown = async {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown")
    };

    grpc_server.run(addr, shutdown).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
