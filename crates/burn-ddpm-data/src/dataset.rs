//! Unlabelled image-folder dataset for unconditional training

use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataset::Dataset;
use image::imageops::FilterType;

use crate::convert::image_to_values;
use crate::error::{DataError, Result};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// One image as channel-first values in `[-1, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub values: Vec<f32>,
    pub channels: usize,
    pub size: usize,
}

/// Square images loaded eagerly from a directory
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    items: Vec<ImageItem>,
    paths: Vec<PathBuf>,
}

impl ImageFolderDataset {
    /// Load every image in `dir` (non-recursive, sorted by path), resized to
    /// `image_size` x `image_size` with `channels` 1 or 3
    pub fn new(dir: impl AsRef<Path>, image_size: u32, channels: usize) -> Result<Self> {
        if image_size == 0 {
            return Err(DataError::InvalidSize(image_size));
        }

        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            return Err(DataError::EmptyDirectory(dir.to_path_buf()));
        }
        paths.sort();

        let items = paths
            .iter()
            .map(|path| -> Result<ImageItem> {
                let image = image::open(path)?.resize_exact(
                    image_size,
                    image_size,
                    FilterType::CatmullRom,
                );
                Ok(ImageItem {
                    values: image_to_values(&image, channels),
                    channels,
                    size: image_size as usize,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { items, paths })
    }

    /// Source files, in item order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, name: &str, value: u8) {
        RgbImage::from_pixel(10, 6, Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_loads_sorted_and_resized() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", 255);
        write_image(dir.path(), "a.png", 0);
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let dataset = ImageFolderDataset::new(dir.path(), 4, 1).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.paths()[0].ends_with("a.png"));

        let first = dataset.get(0).unwrap();
        assert_eq!(first.values.len(), 16);
        assert!(first.values.iter().all(|&v| v < -0.99));

        let second = dataset.get(1).unwrap();
        assert!(second.values.iter().all(|&v| v > 0.99));
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_rgb_channels() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "img.PNG", 128);

        let item = ImageFolderDataset::new(dir.path(), 8, 3).unwrap().get(0).unwrap();
        assert_eq!(item.values.len(), 3 * 8 * 8);
        assert_eq!(item.channels, 3);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageFolderDataset::new(dir.path(), 28, 1).unwrap_err();
        assert!(matches!(err, DataError::EmptyDirectory(_)));
    }

    #[test]
    fn test_missing_directory() {
        let err = ImageFolderDataset::new("/nonexistent/burn-ddpm", 28, 1).unwrap_err();
        assert!(matches!(err, DataError::Io(_)));
    }
}
