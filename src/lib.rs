//! # Plant Disease Trainer
//!
//! Transfer learning for plant disease classification using the Burn framework.
//!
//! A frozen EfficientNet-B0 backbone extracts features from leaf images and a
//! small head (global average pooling, dropout, dense softmax) learns the
//! disease classes. Training monitors validation loss for save-best-only
//! checkpointing and early stopping.
//!
//! ## Modules
//!
//! - `config`: Training configuration (defaults, TOML file, overrides)
//! - `dataset`: Class-per-folder scanning, Burn Dataset/Batcher, epoch batching
//! - `model`: EfficientNet-B0 backbone and the transfer classifier
//! - `training`: Training loop, early stopping, checkpoints, evaluation, history
//! - `utils`: Logging, metrics, errors and formatting helpers
//!
//! ## Dataset layout
//!
//! ```text
//! data_dir/
//! ├── train/<class_name>/*.jpg
//! └── val/<class_name>/*.jpg
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plant_disease_trainer::backend::{default_device, TrainingBackend};
//! use plant_disease_trainer::{run_training, TrainConfig};
//!
//! let config = TrainConfig::new("data/plant_disease");
//! let outcome = run_training::<TrainingBackend>(&config, &default_device())?;
//! println!("best epoch: {:?}", outcome.metadata.best_epoch);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ConfigOverrides, TrainConfig};
pub use dataset::{DataFeed, ImageFolder, LeafBatch, LeafBatcher, LeafDataset, LeafItem};
pub use model::{EfficientNetB0, TransferClassifier, TransferClassifierConfig};
pub use training::{evaluate, load_model, run_training, EvaluationReport, ModelMetadata, TrainingOutcome};
pub use utils::error::{Result, TrainerError};

/// Default square input size of the backbone
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
