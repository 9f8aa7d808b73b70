//! Conversion between images and normalized pixel tensors
//!
//! Pixels map to `[-1, 1]` as `x / 255 * 2 - 1`; channel-first layout.

use burn::prelude::*;
use image::{imageops, DynamicImage, GrayImage, RgbImage};

use crate::error::{DataError, Result};

/// Channel-first `[channels, height, width]` values in `[-1, 1]`
///
/// `channels` must be 1 (grayscale) or 3 (RGB); anything else is treated as RGB.
pub fn image_to_values(image: &DynamicImage, channels: usize) -> Vec<f32> {
    let normalize = |v: u8| v as f32 / 255.0 * 2.0 - 1.0;

    if channels == 1 {
        return image.to_luma8().pixels().map(|p| normalize(p.0[0])).collect();
    }

    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let plane = (w * h) as usize;
    let mut values = vec![0.0f32; plane * 3];
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            values[c * plane + i] = normalize(pixel.0[c]);
        }
    }
    values
}

/// Convert `[batch, channels, h, w]` in `[-1, 1]` back to images
///
/// Values are clamped before quantisation. One channel gives grayscale
/// images, three give RGB; other channel counts use the first channel.
pub fn tensor_to_images<B: Backend>(tensor: Tensor<B, 4>) -> Result<Vec<DynamicImage>> {
    let [batch, channels, h, w] = tensor.dims();
    if channels == 0 {
        return Err(DataError::TensorData("tensor has no channels".to_string()));
    }

    let tensor = ((tensor.clamp(-1.0, 1.0) + 1.0) * 127.5).round();
    let floats: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|err| DataError::TensorData(format!("{err:?}")))?;

    let plane = h * w;
    if floats.len() != batch * channels * plane {
        return Err(DataError::TensorData(format!(
            "expected {} values, got {}",
            batch * channels * plane,
            floats.len()
        )));
    }
    let (w, h) = (w as u32, h as u32);

    let images = (0..batch)
        .map(|b| {
            let base = b * channels * plane;
            let value =
                |c: usize, x: u32, y: u32| floats[base + c * plane + (y * w + x) as usize] as u8;

            if channels == 3 {
                DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                    image::Rgb([value(0, x, y), value(1, x, y), value(2, x, y)])
                }))
            } else {
                DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
                    image::Luma([value(0, x, y)])
                }))
            }
        })
        .collect();

    Ok(images)
}

/// Tile images into a grid `columns` wide, row-major
pub fn image_grid(images: &[DynamicImage], columns: usize) -> RgbImage {
    let columns = columns.max(1);
    let (cell_w, cell_h) = images
        .first()
        .map(|img| (img.width(), img.height()))
        .unwrap_or((0, 0));
    let rows = images.len().div_ceil(columns);

    let mut grid = RgbImage::new(cell_w * columns as u32, cell_h * rows as u32);
    for (i, img) in images.iter().enumerate() {
        let x = (i % columns) as u32 * cell_w;
        let y = (i / columns) as u32 * cell_h;
        imageops::replace(&mut grid, &img.to_rgb8(), x as i64, y as i64);
    }
    grid
}
