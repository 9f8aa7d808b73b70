//! Geometric image helpers for building person-centred examples

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

use crate::error::{DataError, Result};

/// Default side of the square canvas
pub const CANVAS_SIZE: u32 = 224;

/// Default margin grown around a detection box
pub const CROP_OFFSET: f32 = 10.0;

/// Axis-aligned box in pixel coordinates `(x1, y1)`-`(x2, y2)`
#[derive(Debug, Clone, Copy, PartialEq)]
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

    /// The box grown by `offset` on every side
    pub fn expand(&self, offset: f32) -> Self {
        Self {
            x1: self.x1 - offset,
            y1: self.y1 - offset,
            x2: self.x2 + offset,
            y2: self.y2 + offset,
        }
    }
}

/// Crop `bbox` grown by `offset`, filling pixels outside the image with black
///
/// Coordinates are rounded to the nearest pixel; the region may extend past
/// any edge of the source.
pub fn crop_with_offset(image: &DynamicImage, bbox: BoundingBox, offset: f32) -> RgbImage {
    let region = bbox.expand(offset);
    let left = region.x1.round() as i64;
    let top = region.y1.round() as i64;
    let width = (region.x2.round() as i64 - left).max(0) as u32;
    let height = (region.y2.round() as i64 - top).max(0) as u32;

    let (src_w, src_h) = image.dimensions();
    let src = image.to_rgb8();

    RgbImage::from_fn(width, height, |x, y| {
        let sx = left + x as i64;
        let sy = top + y as i64;
        if sx >= 0 && sy >= 0 && (sx as u32) < src_w && (sy as u32) < src_h {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

/// Paste `image` centred on a white `new_size` square canvas
///
/// The image is downscaled (aspect preserved, sides rounded) only when its
/// longest side exceeds `new_size`; smaller images keep their size.
pub fn paste_image_centered(image: &RgbImage, new_size: u32) -> Result<RgbImage> {
    if new_size == 0 {
        return Err(DataError::InvalidSize(new_size));
    }

    let (mut width, mut height) = image.dimensions();
    let max_size = width.max(height);
    if max_size > new_size {
        let scale = new_size as f64 / max_size as f64;
        width = ((width as f64 * scale).round() as u32).max(1);
        height = ((height as f64 * scale).round() as u32).max(1);
    }

    let mut canvas = RgbImage::from_pixel(new_size, new_size, Rgb([255, 255, 255]));
    if width == 0 || height == 0 {
        return Ok(canvas);
    }

    let resized = if (width, height) == image.dimensions() {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::CatmullRom)
    };

    let x = (new_size - width) / 2;
    let y = (new_size - height) / 2;
    imageops::replace(&mut canvas, &resized, x as i64, y as i64);

    Ok(canvas)
}

/// Resize the whole image to `(width * ratio_w, height * ratio_h)` of `base`,
/// truncating to whole pixels
pub fn stretch(image: &DynamicImage, base: u32, ratio_w: f64, ratio_h: f64) -> Result<RgbImage> {
    let width = (base as f64 * ratio_w) as u32;
    let height = (base as f64 * ratio_h) as u32;
    if width == 0 {
        return Err(DataError::InvalidSize(width));
    }
    if height == 0 {
        return Err(DataError::InvalidSize(height));
    }
    Ok(imageops::resize(&image.to_rgb8(), width, height, FilterType::CatmullRom))
}
