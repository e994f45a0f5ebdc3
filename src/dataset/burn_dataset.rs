//! Burn Dataset integration for leaf images
//!
//! `LeafDataset` decodes images lazily through Burn's `Dataset` trait and
//! `LeafBatcher` turns decoded items into normalized image/target tensors.

use std::path::{Path, PathBuf};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::imageops::FilterType;
use image::ImageReader;
use tracing::warn;

use super::folder::ImageFolder;
use super::{IMAGENET_MEAN, IMAGENET_STD};
use crate::utils::error::{Result, TrainerError};

/// A decoded image ready for batching
#[derive(Clone, Debug)]
pub struct LeafItem {
    /// CHW pixels in [0, 1], length `3 * img_size * img_size`
    pub image: Vec<f32>,
    pub label: usize,
    pub path: PathBuf,
}

impl LeafItem {
    /// Decode, convert to RGB and resize to a square `img_size` image
    ///
    /// The resize is bilinear and ignores the aspect ratio.
    pub fn from_path(path: &Path, label: usize, img_size: usize) -> Result<Self> {
        let img = ImageReader::open(path)
            .map_err(|e| TrainerError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| TrainerError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .decode()
            .map_err(|e| TrainerError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .resize_exact(img_size as u32, img_size as u32, FilterType::Triangle)
            .to_rgb8();

        let plane = img_size * img_size;
        let mut image = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * img_size + x as usize;
            image[offset] = pixel[0] as f32 / 255.0;
            image[plane + offset] = pixel[1] as f32 / 255.0;
            image[2 * plane + offset] = pixel[2] as f32 / 255.0;
        }

        Ok(Self {
            image,
            label,
            path: path.to_path_buf(),
        })
    }
}

/// Lazily decoding dataset over `(path, label)` pairs
#[derive(Debug, Clone)]
pub struct LeafDataset {
    samples: Vec<(PathBuf, usize)>,
    img_size: usize,
}

impl LeafDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, img_size: usize) -> Self {
        Self { samples, img_size }
    }

    pub fn from_folder(folder: &ImageFolder, img_size: usize) -> Self {
        Self::new(folder.labeled_paths(), img_size)
    }
}

impl Dataset<LeafItem> for LeafDataset {
    /// `None` past the end, or when the image cannot be decoded
    fn get(&self, index: usize) -> Option<LeafItem> {
        let (path, label) = self.samples.get(index)?;

        match LeafItem::from_path(path, *label, self.img_size) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping image: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of normalized images and their labels
#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    /// [batch_size, 3, img_size, img_size]
    pub images: Tensor<B, 4>,
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> LeafBatch<B> {
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds `LeafBatch`es, applying ImageNet mean/std normalization
#[derive(Clone, Debug)]
pub struct LeafBatcher {
    img_size: usize,
}

impl LeafBatcher {
    pub fn new(img_size: usize) -> Self {
        Self { img_size }
    }
}

impl<B: Backend> Batcher<B, LeafItem, LeafBatch<B>> for LeafBatcher {
    fn batch(&self, items: Vec<LeafItem>, device: &B::Device) -> LeafBatch<B> {
        let batch_size = items.len();
        let size = self.img_size;

        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
        let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        LeafBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn write_image(path: &Path, width: u32, height: u32, color: [u8; 3]) {
        RgbImage::from_pixel(width, height, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn test_item_is_resized_chw_unit_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("leaf.png");
        write_image(&path, 40, 20, [255, 0, 51]);

        let item = LeafItem::from_path(&path, 3, 8).unwrap();
        assert_eq!(item.image.len(), 3 * 8 * 8);
        assert_eq!(item.label, 3);

        assert!((item.image[0] - 1.0).abs() < 1e-6);
        assert!(item.image[64].abs() < 1e-6);
        assert!((item.image[128] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_undecodable_image_is_skipped() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.png");
        let bad = dir.path().join("bad.jpg");
        write_image(&good, 4, 4, [0, 128, 0]);
        std::fs::write(&bad, b"not an image").unwrap();

        assert!(LeafItem::from_path(&bad, 0, 4).is_err());

        let dataset = LeafDataset::new(vec![(good, 0), (bad, 1)], 4);
        assert_eq!(dataset.len(), 2);
        assert!(dataset.get(0).is_some());
        assert!(dataset.get(1).is_none());
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_batcher_normalizes_with_imagenet_stats() {
        let item = LeafItem {
            image: vec![0.5; 3 * 2 * 2],
            label: 1,
            path: PathBuf::from("mem"),
        };
        let device = Default::default();
        let batch: LeafBatch<TestBackend> = LeafBatcher::new(2).batch(vec![item.clone(), item], &device);

        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.len(), 2);

        let values: Vec<f32> = batch.images.into_data().iter::<f32>().collect();
        let expected_red = (0.5 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let expected_blue = (0.5 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        assert!((values[0] - expected_red).abs() < 1e-5);
        assert!((values[8] - expected_blue).abs() < 1e-5);

        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![1, 1]);
    }
}
