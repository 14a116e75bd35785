use crate::frame::ImageSize;
use serde::{Deserialize, Serialize};

/// Corners in original-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_label: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

/// Detections for one request plus the size of the image they were found in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub image_size: ImageSize,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>, image_size: ImageSize) -> Self {
        Self {
            detections,
            image_size,
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
