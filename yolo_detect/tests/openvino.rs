//! Runs the OpenVINO backend against real YOLOv5 weights. Uses the same
//! environment as the `model` test; OpenVINO reads the `.onnx` directly.
//!
//! ```text
//! cargo test -p yolo_detect --features openvino-backend --test openvino -- --ignored
//! ```
#![cfg(feature = "openvino-backend")]

mod common;

use common::{assert_equivalent, backend_config, photo};
use detect_codec::{ChannelOrder, ImageBuffer, ImageSize};
use yolo_detect::backend::openvino::OpenVinoBackend;
use yolo_detect::config::BackendKind;
use yolo_detect::{load_backend, InferenceBackend};

async fn openvino(native_preprocessing: bool) -> OpenVinoBackend {
    let mut config = backend_config(BackendKind::OpenVino);
    config.use_native_preprocessing = native_preprocessing;
    load_backend(&config).await.unwrap()
}

#[tokio::test]
#[ignore = "needs YOLOv5 weights and OpenVINO"]
async fn photo_yields_detections_inside_the_frame() {
    let backend = openvino(true).await;

    let (annotated, result) = backend.infer_single(&photo()).unwrap();

    assert_eq!(result.image_size, ImageSize::new(480, 640, 3));
    assert_eq!(annotated.size(), result.image_size);
    assert!(!result.is_empty());
    for detection in &result.detections {
        assert!(detection.confidence >= 0.25);
        let b = &detection.bounding_box;
        assert!(0.0 <= b.x1 && b.x2 <= 640.0 && 0.0 <= b.y1 && b.y2 <= 480.0);
    }
}

#[tokio::test]
#[ignore = "needs YOLOv5 weights and OpenVINO"]
async fn blank_image_yields_nothing() {
    let backend = openvino(true).await;
    let blank = ImageBuffer::filled(640, 480, ChannelOrder::Rgb, [255, 255, 255]);

    let (_, result) = backend.infer_single(&blank).unwrap();

    assert!(result.is_empty());
}

#[tokio::test]
#[ignore = "needs YOLOv5 weights and OpenVINO"]
async fn inference_is_deterministic() {
    let backend = openvino(true).await;
    let image = photo();

    let (_, first) = backend.infer_single(&image).unwrap();
    let (_, second) = backend.infer_single(&image).unwrap();

    assert_equivalent(&first, &second, 1e-4);
}

#[tokio::test]
#[ignore = "needs YOLOv5 weights and OpenVINO"]
async fn native_and_host_preprocessing_agree() {
    let image = photo();

    let (_, native) = openvino(true).await.infer_single(&image).unwrap();
    let (_, host) = openvino(false).await.infer_single(&image).unwrap();

    assert_equivalent(&native, &host, 1e-3);
}

#[cfg(feature = "ort-backend")]
#[tokio::test]
#[ignore = "needs YOLOv5 weights and OpenVINO"]
async fn matches_onnx_runtime() {
    use yolo_detect::backend::ort::OrtBackend;

    let image = photo();
    let ort: OrtBackend = load_backend(&backend_config(BackendKind::Ort)).await.unwrap();

    let (_, expected) = ort.infer_single(&image).unwrap();
    let (_, actual) = openvino(true).await.infer_single(&image).unwrap();

    assert_equivalent(&expected, &actual, 1e-2);
}
