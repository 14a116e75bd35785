use crate::error::DetectError;
use crate::labels::LabelSchema;
use ab_glyph::{FontRef, PxScale};
use detect_codec::{Detection, ImageBuffer};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};

const LINE_THICKNESS: i32 = 2;
const LABEL_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

fn label_font() -> Result<FontRef<'static>, DetectError> {
    FontRef::try_from_slice(LABEL_FONT)
        .map_err(|e| DetectError::Inference(format!("cannot load label font: {}", e)))
}

/// Returns a copy of `image` with one outline and one `label confidence` tag
/// per detection, in the channel order of the input.
pub fn annotate(
    image: &ImageBuffer,
    detections: &[Detection],
    labels: &LabelSchema,
) -> Result<ImageBuffer, DetectError> {
    if detections.is_empty() {
        return Ok(image.clone());
    }
    let order = image.order();
    let mut canvas = image
        .to_rgb_image()
        .map_err(|e| DetectError::Inference(format!("cannot annotate image: {}", e)))?;

    let font = label_font()?;
    for detection in detections {
        let color = Rgb(labels.color(detection.class_id));
        if draw_box(&mut canvas, detection, color) {
            draw_label(&mut canvas, detection, color, &font);
        }
    }

    Ok(ImageBuffer::from_rgb_image(canvas).to_order(order))
}

/// Returns false for boxes too small to draw.
fn draw_box(canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) -> bool {
    let bbox = detection.bounding_box;
    let x1 = bbox.x1.floor() as i32;
    let y1 = bbox.y1.floor() as i32;
    let x2 = bbox.x2.ceil() as i32;
    let y2 = bbox.y2.ceil() as i32;
    if x2 - x1 < 1 || y2 - y1 < 1 {
        return false;
    }

    for inset in 0..LINE_THICKNESS {
        let width = x2 - x1 - 2 * inset;
        let height = y2 - y1 - 2 * inset;
        if width < 1 || height < 1 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
    true
}

/// Filled tag in the class colour above the box, or inside its top edge when
/// the box touches the top of the image.
fn draw_label(canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>, font: &FontRef) {
    let text = format!("{} {:.2}", detection.class_label, detection.confidence);
    let scale = PxScale::from(LABEL_FONT_SIZE);
    let (text_width, text_height) = text_size(scale, font, &text);
    let label_width = text_width as i32 + 2 * LABEL_PADDING;
    let label_height = text_height as i32 + 2 * LABEL_PADDING;

    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let x = (detection.bounding_box.x1.floor() as i32).clamp(0, width - 1);
    let top = detection.bounding_box.y1.floor() as i32;
    let y = if top - label_height >= 0 {
        top - label_height
    } else {
        top.clamp(0, height - 1)
    };

    let visible_width = label_width.min(width - x);
    let visible_height = label_height.min(height - y);
    if visible_width < 1 || visible_height < 1 {
        return;
    }

    let rect = Rect::at(x, y).of_size(visible_width as u32, visible_height as u32);
    draw_filled_rect_mut(canvas, rect, color);
    draw_text_mut(
        canvas,
        LABEL_TEXT_COLOR,
        x + LABEL_PADDING,
        y + LABEL_PADDING,
        scale,
        font,
        &text,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use detect_codec::{BoundingBox, ChannelOrder};

    fn detection(bbox: BoundingBox) -> Detection {
        Detection {
            class_id: 0,
            class_label: "person".to_string(),
            confidence: 0.9,
            bounding_box: bbox,
        }
    }

    #[test]
    fn test_annotate_draws_outline() {
        let image = ImageBuffer::filled(100, 100, ChannelOrder::Rgb, [0, 0, 0]);
        let labels = LabelSchema::default();
        let annotated = annotate(
            &image,
            &[detection(BoundingBox::new(30., 40., 70., 80.))],
            &labels,
        )
        .unwrap();

        let rgb = annotated.into_rgb_image().unwrap();
        assert_eq!(rgb.get_pixel(30, 60).0, labels.color(0));
        assert_eq!(rgb.get_pixel(31, 60).0, labels.color(0));
        assert_eq!(rgb.get_pixel(50, 60).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(5, 5).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(5, 95).0, [0, 0, 0]);
    }

    #[test]
    fn test_annotate_draws_label_above_box() {
        let image = ImageBuffer::filled(160, 100, ChannelOrder::Rgb, [0, 0, 0]);
        let labels = LabelSchema::default();
        let annotated = annotate(
            &image,
            &[detection(BoundingBox::new(30., 40., 70., 80.))],
            &labels,
        )
        .unwrap();
        let rgb = annotated.into_rgb_image().unwrap();

        let font = label_font().unwrap();
        let (text_width, text_height) =
            text_size(PxScale::from(LABEL_FONT_SIZE), &font, "person 0.90");
        let label_height = text_height + 2 * LABEL_PADDING as u32;
        let label_width = text_width + 2 * LABEL_PADDING as u32;
        let top = 40 - label_height;

        // background in the class colour, starting at the box's left edge
        assert_eq!(rgb.get_pixel(30, top).0, labels.color(0));
        assert_eq!(rgb.get_pixel(29, top).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(30, top - 1).0, [0, 0, 0]);

        // text pixels blend towards white inside the tag
        let text_pixels = (top..40)
            .flat_map(|y| (30..30 + label_width).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let p = rgb.get_pixel(x, y).0;
                p != labels.color(0) && p != [0, 0, 0]
            })
            .count();
        assert!(text_pixels > 10);
    }

    #[test]
    fn test_label_moves_inside_box_at_top_edge() {
        let image = ImageBuffer::filled(160, 100, ChannelOrder::Rgb, [0, 0, 0]);
        let labels = LabelSchema::default();
        let annotated = annotate(
            &image,
            &[detection(BoundingBox::new(30., 0., 150., 90.))],
            &labels,
        )
        .unwrap();
        let rgb = annotated.into_rgb_image().unwrap();

        let font = label_font().unwrap();
        let (text_width, text_height) =
            text_size(PxScale::from(LABEL_FONT_SIZE), &font, "person 0.90");
        let label_width = text_width + 2 * LABEL_PADDING as u32;
        let label_height = text_height + 2 * LABEL_PADDING as u32;

        // bottom-right padding corner of the tag, below the top outline
        assert_eq!(
            rgb.get_pixel(30 + label_width - 1, label_height - 1).0,
            labels.color(0)
        );
        assert_eq!(rgb.get_pixel(30 + label_width + 2, label_height / 2).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(100, 60).0, [0, 0, 0]);
    }

    #[test]
    fn test_annotate_keeps_channel_order_and_input() {
        let image = ImageBuffer::filled(20, 10, ChannelOrder::Bgr, [1, 2, 3]);
        let annotated = annotate(
            &image,
            &[detection(BoundingBox::new(0., 0., 20., 10.))],
            &LabelSchema::default(),
        )
        .unwrap();

        assert_eq!(annotated.order(), ChannelOrder::Bgr);
        assert_eq!(annotated.size(), image.size());
        assert_ne!(annotated, image);
        assert_eq!(image.as_bytes()[..3], [1, 2, 3]);
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        let image = ImageBuffer::filled(8, 8, ChannelOrder::Rgb, [0, 0, 0]);
        let annotated = annotate(
            &image,
            &[detection(BoundingBox::new(4., 4., 4., 4.))],
            &LabelSchema::default(),
        )
        .unwrap();

        assert_eq!(annotated, image);
    }
}
