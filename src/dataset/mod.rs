//! Dataset module for class-per-folder leaf image datasets
//!
//! This module provides:
//! - Folder scanning with sorted class-to-label mapping
//! - Burn Dataset/Batcher implementations with ImageNet normalization
//! - Epoch batching with seeded shuffling and parallel decoding

pub mod burn_dataset;
pub mod feed;
pub mod folder;

pub use burn_dataset::{LeafBatch, LeafBatcher, LeafDataset, LeafItem};
pub use feed::DataFeed;
pub use folder::{FolderStats, ImageFolder, ImageSample};

/// Supported image file extensions (lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif"];

/// ImageNet channel means (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
