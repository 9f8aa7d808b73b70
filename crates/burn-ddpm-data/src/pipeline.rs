//! Paired original/transformed example generation

use burn::data::dataset::InMemDataset;
use image::{DynamicImage, RgbImage};
use rand::Rng;

use crate::error::Result;
use crate::image_ops::{crop_with_offset, paste_image_centered, stretch, CANVAS_SIZE, CROP_OFFSET};
use crate::keypoints::{flatten_and_pad, PersonDetector, PoseEstimator, KEYPOINT_LEN};

/// Pascal VOC class index of "person"
pub const PERSON_CLASS: u32 = 14;

/// A source image with its annotated object classes
#[derive(Debug, Clone)]
pub struct AnnotatedImage {
    pub image: DynamicImage,
    pub classes: Vec<u32>,
}

impl AnnotatedImage {
    /// True when the only annotated object is a single person
    pub fn is_single_person(&self) -> bool {
        self.classes == [PERSON_CLASS]
    }
}

/// A person image and a stretched variant, each with its pose vector
#[derive(Debug, Clone)]
pub struct PairedExample {
    /// Person crop centred on the canvas
    pub image_ori: RgbImage,
    pub keys_ori: Vec<f32>,
    /// Whole source image stretched, then centred on the canvas
    pub image_trans: RgbImage,
    pub keys_trans: Vec<f32>,
}

/// Train and validation datasets of paired examples
pub struct PairedSplits {
    pub train: InMemDataset<PairedExample>,
    pub validation: InMemDataset<PairedExample>,
}

/// Builds [`PairedExample`]s with a detector and a pose estimator
pub struct PairGenerator<D, P> {
    detector: D,
    pose: P,
    /// Side of the square output canvas
    pub canvas_size: u32,
    /// Margin grown around the detected person
    pub offset: f32,
    /// Length of each keypoint vector
    pub keypoint_len: usize,
    /// Horizontal stretch range `[lo, hi)`
    pub ratio_w: (f64, f64),
    /// Vertical stretch range `[lo, hi)`
    pub ratio_h: (f64, f64),
}

impl<D: PersonDetector, P: PoseEstimator> PairGenerator<D, P> {
    pub fn new(detector: D, pose: P) -> Self {
        Self {
            detector,
            pose,
            canvas_size: CANVAS_SIZE,
            offset: CROP_OFFSET,
            keypoint_len: KEYPOINT_LEN,
            ratio_w: (0.9, 1.0),
            ratio_h: (1.0, 1.2),
        }
    }

    /// Generate one pair, or `None` when no person is detected
    pub fn generate<R: Rng>(
        &self,
        image: &DynamicImage,
        rng: &mut R,
    ) -> Result<Option<PairedExample>> {
        let boxes = self.detector.detect(image)?;
        let Some(&person) = boxes.first() else {
            return Ok(None);
        };

        let crop = crop_with_offset(image, person, self.offset);
        let image_ori = paste_image_centered(&crop, self.canvas_size)?;
        let keys_ori = flatten_and_pad(&self.pose.estimate(&image_ori)?, self.keypoint_len);

        let ratio_w = rng.random_range(self.ratio_w.0..self.ratio_w.1);
        let ratio_h = rng.random_range(self.ratio_h.0..self.ratio_h.1);
        let stretched = stretch(image, self.canvas_size, ratio_w, ratio_h)?;
        let image_trans = paste_image_centered(&stretched, self.canvas_size)?;
        let keys_trans = flatten_and_pad(&self.pose.estimate(&image_trans)?, self.keypoint_len);

        Ok(Some(PairedExample {
            image_ori,
            keys_ori,
            image_trans,
            keys_trans,
        }))
    }

    /// Pairs for every single-person image in `images`, skipping images
    /// without a detection
    pub fn generate_all<I, R>(&self, images: I, rng: &mut R) -> Result<Vec<PairedExample>>
    where
        I: IntoIterator<Item = AnnotatedImage>,
        R: Rng,
    {
        let mut examples = Vec::new();
        for annotated in images {
            if !annotated.is_single_person() {
                continue;
            }
            if let Some(example) = self.generate(&annotated.image, rng)? {
                examples.push(example);
            }
        }
        Ok(examples)
    }
}

/// Filter both splits to single-person images and generate their pairs
pub fn create_dataset<D, P, I, J, R>(
    train: I,
    validation: J,
    generator: &PairGenerator<D, P>,
    rng: &mut R,
) -> Result<PairedSplits>
where
    D: PersonDetector,
    P: PoseEstimator,
    I: IntoIterator<Item = AnnotatedImage>,
    J: IntoIterator<Item = AnnotatedImage>,
    R: Rng,
{
    let train = generator.generate_all(train, rng)?;
    let validation = generator.generate_all(validation, rng)?;

    Ok(PairedSplits {
        train: InMemDataset::new(train),
        validation: InMemDataset::new(validation),
    })
}
