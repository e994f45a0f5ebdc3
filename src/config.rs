//! Training configuration
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional TOML file, and command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, TrainerError};

/// Smallest input the backbone accepts (it downsamples by 32)
pub const MIN_IMAGE_SIZE: usize = 32;

/// Full configuration of one training run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    /// Root directory containing `train/` and `val/`
    pub data_dir: PathBuf,
    /// Maximum number of epochs
    pub epochs: usize,
    /// Images per batch
    pub batch_size: usize,
    /// Square resize target in pixels
    pub img_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Dropout rate in the classification head
    pub dropout: f64,
    /// Early-stopping patience in epochs (0 disables early stopping)
    pub patience: usize,
    /// Directory for checkpoints, the final model and its metadata
    pub output_dir: PathBuf,
    /// Burn record holding pretrained backbone weights
    pub backbone_weights: Option<PathBuf>,
    /// Seed for per-epoch shuffling
    pub seed: u64,
    /// Shuffle the training feed every epoch
    pub shuffle: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            epochs: 10,
            batch_size: 32,
            img_size: crate::IMAGE_SIZE,
            learning_rate: 1e-3,
            dropout: crate::model::DEFAULT_DROPOUT,
            patience: 4,
            output_dir: PathBuf::from("saved_model"),
            backbone_weights: None,
            seed: 42,
            shuffle: true,
        }
    }
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub img_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub dropout: Option<f64>,
    pub patience: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub backbone_weights: Option<PathBuf>,
    pub seed: Option<u64>,
    pub no_shuffle: bool,
}

impl TrainConfig {
    /// Defaults for the given dataset root
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load from a TOML file; absent keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TrainerError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            TrainerError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(epochs) = overrides.epochs {
            self.epochs = epochs;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.batch_size = batch_size;
        }
        if let Some(img_size) = overrides.img_size {
            self.img_size = img_size;
        }
        if let Some(lr) = overrides.learning_rate {
            self.learning_rate = lr;
        }
        if let Some(dropout) = overrides.dropout {
            self.dropout = dropout;
        }
        if let Some(patience) = overrides.patience {
            self.patience = patience;
        }
        if let Some(output_dir) = overrides.output_dir {
            self.output_dir = output_dir;
        }
        if overrides.backbone_weights.is_some() {
            self.backbone_weights = overrides.backbone_weights;
        }
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }
        if overrides.no_shuffle {
            self.shuffle = false;
        }
    }

    /// Reject values the training loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(TrainerError::Config("data_dir must be set".to_string()));
        }
        if self.epochs == 0 {
            return Err(TrainerError::Config("epochs must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(TrainerError::Config("batch_size must be greater than 0".to_string()));
        }
        if self.img_size < MIN_IMAGE_SIZE {
            return Err(TrainerError::Config(format!(
                "img_size must be at least {}, got {}",
                MIN_IMAGE_SIZE, self.img_size
            )));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainerError::Config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainerError::Config(format!(
                "dropout must be in [0.0, 1.0), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    pub fn train_dir(&self) -> PathBuf {
        self.data_dir.join("train")
    }

    pub fn val_dir(&self) -> PathBuf {
        self.data_dir.join("val")
    }
}
