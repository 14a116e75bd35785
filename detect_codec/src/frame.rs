use crate::error::CodecError;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub const CHANNELS: u8 = 3;

/// Order of the three interleaved colour channels of an [`ImageBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelOrder::Rgb => "rgb",
            ChannelOrder::Bgr => "bgr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// `(height, width, channels)` of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
    pub channels: u8,
}

impl ImageSize {
    pub fn new(height: u32, width: u32, channels: u8) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

/// Interleaved 8-bit pixels, row major, with an explicit channel order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(
        width: u32,
        height: u32,
        order: ChannelOrder,
        data: Vec<u8>,
    ) -> Result<Self, CodecError> {
        let expected = width as usize * height as usize * CHANNELS as usize;
        if data.len() != expected {
            return Err(CodecError::Shape {
                len: data.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    pub fn filled(width: u32, height: u32, order: ChannelOrder, pixel: [u8; 3]) -> Self {
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS as usize)
            .collect();
        Self {
            width,
            height,
            order,
            data,
        }
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            order: ChannelOrder::Rgb,
            data: image.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.height, self.width, CHANNELS)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Swaps the first and last channel of every pixel when `order` differs
    /// from the current one.
    pub fn to_order(mut self, order: ChannelOrder) -> Self {
        if self.order != order {
            for pixel in self.data.chunks_exact_mut(CHANNELS as usize) {
                pixel.swap(0, 2);
            }
            self.order = order;
        }
        self
    }

    pub fn into_rgb_image(self) -> Result<RgbImage, CodecError> {
        let image = self.to_order(ChannelOrder::Rgb);
        let (width, height, len) = (image.width, image.height, image.data.len());
        RgbImage::from_raw(width, height, image.data).ok_or(CodecError::Shape {
            len,
            width,
            height,
        })
    }

    pub fn to_rgb_image(&self) -> Result<RgbImage, CodecError> {
        self.clone().into_rgb_image()
    }
}
