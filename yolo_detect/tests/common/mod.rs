#![allow(dead_code)]

use detect_codec::{DetectionResult, ImageBuffer};
use std::path::PathBuf;
use yolo_detect::config::{BackendConfig, BackendKind};

/// Real-weights configuration from `YOLO_MODEL_PATH` and `YOLO_LABELS_PATH`.
pub fn backend_config(kind: BackendKind) -> BackendConfig {
    let var = |name: &str| {
        PathBuf::from(std::env::var(name).unwrap_or_else(|_| panic!("{} is not set", name)))
    };
    BackendConfig {
        kind,
        model_path: var("YOLO_MODEL_PATH"),
        mode: "cpu".to_string(),
        label_schema_path: var("YOLO_LABELS_PATH"),
        confidence_threshold: 0.25,
        score_threshold: 0.2,
        nms_threshold: 0.45,
        use_native_preprocessing: true,
        input_size: 640,
        num_instances: 2,
    }
}

/// `YOLO_TEST_IMAGE` resized to 640x480.
pub fn photo() -> ImageBuffer {
    let path = std::env::var("YOLO_TEST_IMAGE").expect("YOLO_TEST_IMAGE is not set");
    let image = image::open(path).unwrap().to_rgb8();
    let image = image::imageops::resize(&image, 640, 480, image::imageops::FilterType::Triangle);
    ImageBuffer::from_rgb_image(image)
}

/// Same classes and boxes within a small tolerance.
pub fn assert_equivalent(a: &DetectionResult, b: &DetectionResult, tolerance: f32) {
    assert_eq!(a.image_size, b.image_size);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.detections.iter().zip(&b.detections) {
        assert_eq!(x.class_id, y.class_id);
        assert!((x.confidence - y.confidence).abs() < tolerance);
        for (p, q) in [
            (x.bounding_box.x1, y.bounding_box.x1),
            (x.bounding_box.y1, y.bounding_box.y1),
            (x.bounding_box.x2, y.bounding_box.x2),
            (x.bounding_box.y2, y.bounding_box.y2),
        ] {
            assert!((p - q).abs() < tolerance * 100.);
        }
    }
}
