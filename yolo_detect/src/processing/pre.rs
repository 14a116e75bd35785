use detect_codec::BoundingBox;
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array, Array4};

/// Grey used by YOLOv5 for letterbox padding.
pub const PAD_VALUE: u8 = 114;

/// Geometry of an aspect-preserving resize into a square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub input_size: u32,
    pub original_width: u32,
    pub original_height: u32,
    pub scale: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn new(original_width: u32, original_height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / original_width as f32)
            .min(input_size as f32 / original_height as f32);
        let resized_width = ((original_width as f32 * scale).round() as u32).clamp(1, input_size);
        let resized_height = ((original_height as f32 * scale).round() as u32).clamp(1, input_size);

        Self {
            input_size,
            original_width,
            original_height,
            scale,
            resized_width,
            resized_height,
            pad_x: (input_size - resized_width) / 2,
            pad_y: (input_size - resized_height) / 2,
        }
    }

    /// Maps a box from model-input pixels back to original-image pixels,
    /// clipped to the original image.
    pub fn to_original(&self, bbox: BoundingBox) -> BoundingBox {
        let width = self.original_width as f32;
        let height = self.original_height as f32;
        let x = |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0., width);
        let y = |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0., height);

        BoundingBox::new(x(bbox.x1), y(bbox.y1), x(bbox.x2), y(bbox.y2))
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let resized = imageops::resize(
            image,
            self.resized_width,
            self.resized_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(
            self.input_size,
            self.input_size,
            Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]),
        );
        imageops::replace(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }
}

pub fn letterbox(image: &RgbImage, input_size: u32) -> (RgbImage, Letterbox) {
    let geometry = Letterbox::new(image.width(), image.height(), input_size);
    (geometry.apply(image), geometry)
}

/// `[1, 3, H, W]` planar tensor scaled to `[0, 1]`.
pub fn to_nchw(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut input = Array::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }
    input
}

/// `[1, H, W, 3]` interleaved tensor scaled to `[0, 1]`, for runtimes that
/// reorder the layout inside their own preprocessing graph.
pub fn to_nhwc(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    Array::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| image.get_pixel(x as u32, y as u32)[c] as f32 / 255.,
    )
}
