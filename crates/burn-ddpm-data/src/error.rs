//! Errors raised while preparing datasets

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("person detector failed: {0}")]
    Detector(String),

    #[error("pose estimator failed: {0}")]
    PoseEstimator(String),

    #[error("no images found in {0}")]
    EmptyDirectory(PathBuf),

    #[error("invalid image size: {0}")]
    InvalidSize(u32),

    #[error("cannot read tensor as pixels: {0}")]
    TensorData(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
