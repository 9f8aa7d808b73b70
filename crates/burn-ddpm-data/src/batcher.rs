//! Batchers turning dataset items into training tensors

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use image::DynamicImage;

use burn_ddpm_diffusion::PixelBatch;

use crate::convert::image_to_values;
use crate::dataset::ImageItem;
use crate::pipeline::PairedExample;

/// Paired examples as tensors
#[derive(Debug, Clone)]
pub struct PairBatch<B: Backend> {
    /// Original person images `[batch, 3, h, w]`
    pub pixel_values: Tensor<B, 4>,
    /// Stretched images `[batch, 3, h, w]`
    pub transformed: Tensor<B, 4>,
    /// `[batch, keypoint_len]`
    pub keys_ori: Tensor<B, 2>,
    /// `[batch, keypoint_len]`
    pub keys_trans: Tensor<B, 2>,
}

impl<B: Backend> PixelBatch<B> for PairBatch<B> {
    fn pixel_values(&self) -> Tensor<B, 4> {
        self.pixel_values.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PairBatcher;

impl<B: Backend> Batcher<B, PairedExample, PairBatch<B>> for PairBatcher {
    fn batch(&self, items: Vec<PairedExample>, device: &B::Device) -> PairBatch<B> {
        let images = |pick: fn(&PairedExample) -> &image::RgbImage| {
            let tensors = items
                .iter()
                .map(|item| {
                    let img = pick(item);
                    let (w, h) = img.dimensions();
                    let values = image_to_values(&DynamicImage::ImageRgb8(img.clone()), 3);
                    Tensor::<B, 3>::from_data(
                        TensorData::new(values, [3, h as usize, w as usize]),
                        device,
                    )
                })
                .collect();
            Tensor::stack::<4>(tensors, 0)
        };

        let keys = |pick: fn(&PairedExample) -> &Vec<f32>| {
            let tensors = items
                .iter()
                .map(|item| {
                    let k = pick(item);
                    Tensor::<B, 1>::from_data(TensorData::new(k.clone(), [k.len()]), device)
                })
                .collect();
            Tensor::stack::<2>(tensors, 0)
        };

        PairBatch {
            pixel_values: images(|e| &e.image_ori),
            transformed: images(|e| &e.image_trans),
            keys_ori: keys(|e| &e.keys_ori),
            keys_trans: keys(|e| &e.keys_trans),
        }
    }
}

/// Unlabelled images as a tensor
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// `[batch, channels, size, size]` in `[-1, 1]`
    pub pixel_values: Tensor<B, 4>,
}

impl<B: Backend> PixelBatch<B> for ImageBatch<B> {
    fn pixel_values(&self) -> Tensor<B, 4> {
        self.pixel_values.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBatcher;

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let tensors = items
            .into_iter()
            .map(|item| {
                let shape = [item.channels, item.size, item.size];
                Tensor::<B, 3>::from_data(TensorData::new(item.values, shape), device)
            })
            .collect();

        ImageBatch {
            pixel_values: Tensor::stack(tensors, 0),
        }
    }
}
