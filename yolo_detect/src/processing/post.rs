use crate::config::Thresholds;
use crate::error::DetectError;
use crate::labels::LabelSchema;
use crate::processing::Letterbox;
use detect_codec::{BoundingBox, Detection};
use ndarray::{ArrayViewD, Axis, Ix2};

/// Leading columns of a YOLOv5 output row: cx, cy, w, h, objectness.
const BOX_COLUMNS: usize = 5;

fn intersection(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let width = (box1.x2.min(box2.x2) - box1.x1.max(box2.x1)).max(0.);
    let height = (box1.y2.min(box2.y2) - box1.y1.max(box2.y1)).max(0.);
    width * height
}

fn union(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    box1.area() + box2.area() - intersection(box1, box2)
}

pub fn iou(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let union = union(box1, box2);
    if union <= 0. {
        return 0.;
    }
    intersection(box1, box2) / union
}

/// Decodes a `[1, N, 5 + classes]` tensor into detections in original-image
/// pixels, ordered by descending confidence.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn decode(
    output: ArrayViewD<'_, f32>,
    thresholds: &Thresholds,
    letterbox: &Letterbox,
    labels: &LabelSchema,
) -> Result<Vec<Detection>, DetectError> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[2] <= BOX_COLUMNS {
        return Err(DetectError::Inference(format!(
            "unexpected output shape {:?}, expected [1, N, 5 + classes]",
            shape
        )));
    }

    let rows = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| DetectError::Inference(format!("invalid output tensor: {}", e)))?;

    let mut candidates = Vec::new();
    for row in rows.axis_iter(Axis(0)) {
        let objectness = row[4];
        // written so that NaN never passes
        if !(objectness >= thresholds.confidence) {
            continue;
        }

        let Some((class_id, class_score)) = row
            .iter()
            .skip(BOX_COLUMNS)
            .copied()
            .enumerate()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
        else {
            continue;
        };

        let confidence = objectness * class_score;
        if !(confidence >= thresholds.score) {
            continue;
        }

        let (xc, yc, w, h) = (row[0], row[1], row[2], row[3]);
        let bounding_box = letterbox.to_original(BoundingBox::new(
            xc - w / 2.,
            yc - h / 2.,
            xc + w / 2.,
            yc + h / 2.,
        ));

        candidates.push(Detection {
            class_id: class_id as u32,
            class_label: labels.label(class_id as u32),
            confidence,
            bounding_box,
        });
    }

    Ok(non_max_suppression(candidates, thresholds.nms))
}

/// Class-agnostic greedy suppression: a box is dropped when its IoU with an
/// already kept, more confident box exceeds `threshold`.
pub fn non_max_suppression(mut candidates: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept
            .iter()
            .any(|k| iou(&k.bounding_box, &candidate.bounding_box) > threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
