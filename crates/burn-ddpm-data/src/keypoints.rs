//! Detection and pose collaborators plus keypoint vectorisation

use image::{DynamicImage, RgbImage};

use crate::error::Result;
use crate::image_ops::BoundingBox;

/// Default length of a flattened keypoint vector
pub const KEYPOINT_LEN: usize = 32;

/// A 2D body keypoint in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Finds people in an image
///
/// Boxes are ordered by the detector's preference; only the first is used.
pub trait PersonDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<BoundingBox>>;
}

/// Estimates the keypoints of the most prominent person in an image
///
/// An empty result means no pose was found.
pub trait PoseEstimator {
    fn estimate(&self, image: &RgbImage) -> Result<Vec<Keypoint>>;
}

/// Flatten keypoints to `[x0, y0, x1, y1, ..]`, truncated or zero-padded to
/// exactly `max_len` values
pub fn flatten_and_pad(keypoints: &[Keypoint], max_len: usize) -> Vec<f32> {
    let mut flat: Vec<f32> = keypoints
        .iter()
        .flat_map(|k| [k.x, k.y])
        .take(max_len)
        .collect();
    flat.resize(max_len, 0.0);
    flat
}
