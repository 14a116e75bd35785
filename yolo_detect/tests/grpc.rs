use detect_codec::{
    decode_detection, decode_image, encode_image, transport, BoundingBox, ChannelOrder, Detection,
    DetectionResult, ImageBuffer, ImageFormat, ImageSize,
};
use detect_proto::{yolo_detect_client::YoloDetectClient, DetectRequest};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Channel;
use tonic::Code;
use yolo_detect::config::{BackendConfig, ServerConfig};
use yolo_detect::{DetectError, DetectionService, GrpcServer, InferenceBackend};

/// Reports the whole frame as a single box whose class id is the width of
/// the image, so a response can be traced back to its request.
struct EchoBackend {
    delay: Duration,
}

impl InferenceBackend for EchoBackend {
    fn load(_config: &BackendConfig) -> Result<Self, DetectError> {
        Ok(Self {
            delay: Duration::ZERO,
        })
    }

    fn name(&self) -> &'static str {
        "echo"
    }

    fn infer_single(
        &self,
        image: &ImageBuffer,
    ) -> Result<(ImageBuffer, DetectionResult), DetectError> {
        std::thread::sleep(self.delay);
        let pixels = image.as_bytes();
        let detections = if pixels.iter().all(|&v| v == pixels[0]) {
            Vec::new()
        } else {
            vec![Detection {
                class_id: image.width(),
                class_label: format!("w{}", image.width()),
                confidence: 0.5,
                bounding_box: BoundingBox::new(0., 0., image.width() as f32, image.height() as f32),
            }]
        };
        Ok((image.clone(), DetectionResult::new(detections, image.size())))
    }
}

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(backend: EchoBackend, config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = DetectionService::new(backend, config.workers, None);
        let server = GrpcServer::new(service, &config).await.unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_with_listener(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn client(&self) -> YoloDetectClient<Channel> {
        let endpoint = format!("http://{}", self.addr);
        for _ in 0..50 {
            if let Ok(client) = YoloDetectClient::connect(endpoint.clone()).await {
                return client.max_decoding_message_size(64 * 1024 * 1024);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("server at {} never came up", endpoint);
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap();
    }
}

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        workers: 4,
        max_message_size_mb: 1,
        request_timeout_ms: None,
    }
}

fn striped(width: u32, height: u32) -> Vec<u8> {
    let mut image = ImageBuffer::filled(width, height, ChannelOrder::Rgb, [0, 0, 0])
        .into_rgb_image()
        .unwrap();
    for (x, _, p) in image.enumerate_pixels_mut() {
        if x % 4 < 2 {
            p.0 = [200, 40, 90];
        }
    }
    encode_image(&ImageBuffer::from_rgb_image(image), ImageFormat::Png).unwrap()
}

#[tokio::test]
async fn detect_round_trip() {
    let server = TestServer::start(EchoBackend { delay: Duration::ZERO }, server_config()).await;
    let mut client = server.client().await;

    let response = client
        .detect(DetectRequest {
            image: striped(64, 40),
        })
        .await
        .unwrap()
        .into_inner();

    let result = decode_detection(&response.detect).unwrap();
    assert_eq!(result.image_size, ImageSize::new(40, 64, 3));
    assert_eq!(result.detections.len(), 1);
    assert_eq!(result.detections[0].class_label, "w64");

    let annotated = decode_image(&response.image).unwrap();
    assert_eq!((annotated.width(), annotated.height()), (64, 40));

    server.stop().await;
}

#[tokio::test]
async fn malformed_payload_then_valid_request() {
    let server = TestServer::start(EchoBackend { delay: Duration::ZERO }, server_config()).await;
    let mut client = server.client().await;

    let status = client
        .detect(DetectRequest {
            image: transport::encode(b"definitely not a jpeg"),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let response = client
        .detect(DetectRequest {
            image: striped(32, 32),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(decode_detection(&response.detect).unwrap().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn blank_image_has_no_detections() {
    let server = TestServer::start(EchoBackend { delay: Duration::ZERO }, server_config()).await;
    let mut client = server.client().await;

    let blank = ImageBuffer::filled(48, 24, ChannelOrder::Rgb, [90, 90, 90]);
    let response = client
        .detect(DetectRequest {
            image: encode_image(&blank, ImageFormat::Png).unwrap(),
        })
        .await
        .unwrap()
        .into_inner();

    let result = decode_detection(&response.detect).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.image_size, ImageSize::new(24, 48, 3));

    server.stop().await;
}

#[tokio::test]
async fn concurrent_requests_do_not_mix_results() {
    let server = TestServer::start(
        EchoBackend {
            delay: Duration::from_millis(20),
        },
        server_config(),
    )
    .await;
    let client = server.client().await;

    let widths: Vec<u32> = (1..=12).map(|i| 16 + i * 8).collect();
    let requests = widths.iter().map(|&width| {
        let mut client = client.clone();
        async move {
            let response = client
                .detect(DetectRequest {
                    image: striped(width, 24),
                })
                .await?
                .into_inner();
            Ok::<_, tonic::Status>((width, response))
        }
    });

    let responses = futures::future::try_join_all(requests).await.unwrap();
    assert_eq!(responses.len(), widths.len());
    for (width, response) in responses {
        let result = decode_detection(&response.detect).unwrap();
        assert_eq!(result.image_size, ImageSize::new(24, width, 3));
        assert_eq!(result.detections[0].class_id, width);
        assert_eq!(
            result.detections[0].bounding_box,
            BoundingBox::new(0., 0., width as f32, 24.)
        );
    }

    server.stop().await;
}

#[tokio::test]
async fn oversized_message_is_rejected() {
    let server = TestServer::start(EchoBackend { delay: Duration::ZERO }, server_config()).await;
    let mut client = server.client().await;

    let status = client
        .detect(DetectRequest {
            image: vec![b'A'; 2 * 1024 * 1024],
        })
        .await
        .unwrap_err();
    assert!(matches!(
        status.code(),
        Code::OutOfRange | Code::ResourceExhausted
    ));

    // the connection stays usable after the rejection
    let response = client
        .detect(DetectRequest {
            image: striped(16, 16),
        })
        .await;
    assert!(response.is_ok());

    server.stop().await;
}

#[tokio::test]
async fn slow_inference_hits_request_timeout() {
    let config = ServerConfig {
        request_timeout_ms: Some(50),
        ..server_config()
    };
    let server = TestServer::start(
        EchoBackend {
            delay: Duration::from_millis(500),
        },
        config,
    )
    .await;
    let mut client = server.client().await;

    let status = client
        .detect(DetectRequest {
            image: striped(16, 16),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        status.code(),
        Code::Cancelled | Code::DeadlineExceeded
    ));

    server.stop().await;
}

#[tokio::test]
async fn health_reports_serving() {
    use tonic_health::pb::{
        health_check_response::ServingStatus, health_client::HealthClient, HealthCheckRequest,
    };

    let server = TestServer::start(EchoBackend { delay: Duration::ZERO }, server_config()).await;
    let _ = server.client().await;

    let channel = tonic::transport::Endpoint::from_shared(format!("http://{}", server.addr))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let mut health = HealthClient::new(channel);
    let response = health
        .check(HealthCheckRequest {
            service: "object_detect.YoloDetect".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, ServingStatus::Serving as i32);

    server.stop().await;
}
