//! Datasets, batchers and image conversion for burn-ddpm
//!
//! Two sources of training data:
//!
//! - [`ImageFolderDataset`]: a directory of unlabelled images
//! - [`create_dataset`]: paired person examples built from annotated images
//!   with a [`PersonDetector`] and a [`PoseEstimator`]

pub mod batcher;
pub mod convert;
pub mod dataset;
pub mod error;
pub mod image_ops;
pub mod keypoints;
pub mod pipeline;

pub use batcher::{ImageBatch, ImageBatcher, PairBatch, PairBatcher};
pub use convert::{image_grid, image_to_values, tensor_to_images};
pub use dataset::{ImageFolderDataset, ImageItem};
pub use error::{DataError, Result};
pub use image_ops::{crop_with_offset, paste_image_centered, stretch, BoundingBox};
pub use keypoints::{flatten_and_pad, Keypoint, PersonDetector, PoseEstimator};
pub use pipeline::{
    create_dataset, AnnotatedImage, PairGenerator, PairedExample, PairedSplits, PERSON_CLASS,
};
