//! Model checkpointing and metadata
//!
//! Layout of an output directory:
//! - `best_model.mpk`: weights of the epoch with the lowest validation loss
//! - `final_model.mpk`: weights after training (best weights if early stopping fired)
//! - `model_meta.json`: class names and settings needed to rebuild the model
//! - `history.csv`: per-epoch metrics

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::early_stopping::improves;
use crate::model::{TransferClassifier, TransferClassifierConfig};
use crate::utils::error::{Result, TrainerError};

pub const BEST_MODEL_NAME: &str = "best_model";
pub const FINAL_MODEL_NAME: &str = "final_model";
pub const METADATA_FILE: &str = "model_meta.json";
pub const HISTORY_FILE: &str = "history.csv";

/// Everything needed to rebuild a trained classifier besides its weights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetadata {
    pub class_names: Vec<String>,
    pub num_classes: usize,
    pub img_size: usize,
    pub dropout: f64,
    pub backbone: String,
    pub epochs_run: usize,
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub best_val_accuracy: Option<f64>,
    pub early_stopped: bool,
    pub created_at: String,
}

impl ModelMetadata {
    pub fn new(class_names: Vec<String>, img_size: usize, dropout: f64, backbone: &str) -> Self {
        Self {
            num_classes: class_names.len(),
            class_names,
            img_size,
            dropout,
            backbone: backbone.to_string(),
            epochs_run: 0,
            best_epoch: None,
            best_val_loss: None,
            best_val_accuracy: None,
            early_stopped: false,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Metadata saved to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TrainerError::PathNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        let metadata: ModelMetadata = serde_json::from_str(&json)?;

        if metadata.num_classes != metadata.class_names.len() {
            return Err(TrainerError::Model(format!(
                "Metadata lists {} class names but num_classes is {}",
                metadata.class_names.len(),
                metadata.num_classes
            )));
        }
        Ok(metadata)
    }

    pub fn model_config(&self) -> TransferClassifierConfig {
        TransferClassifierConfig::new(self.num_classes).with_dropout(self.dropout)
    }
}

/// Write a classifier record; returns the path including the `.mpk` extension
pub fn save_model<B: Backend>(model: &TransferClassifier<B>, path: &Path) -> Result<PathBuf> {
    model.clone().save_file(path.to_path_buf(), &CompactRecorder::new())?;
    Ok(path.with_extension("mpk"))
}

/// Saves the model whenever validation loss strictly improves
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    path: PathBuf,
    best: f64,
    saves: usize,
}

impl BestCheckpoint {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(BEST_MODEL_NAME),
            best: f64::INFINITY,
            saves: 0,
        }
    }

    /// Returns true when the model was written
    pub fn observe<B: Backend>(&mut self, model: &TransferClassifier<B>, val_loss: f64) -> Result<bool> {
        if !improves(val_loss, self.best) {
            debug!("val_loss {:.4} did not improve from {:.4}", val_loss, self.best);
            return Ok(false);
        }

        let saved = save_model(model, &self.path)?;
        info!("Best model saved to {:?}", saved);
        self.best = val_loss;
        self.saves += 1;
        Ok(true)
    }

    pub fn path(&self) -> PathBuf {
        self.path.with_extension("mpk")
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

/// Rebuild the final classifier saved in `output_dir`
pub fn load_model<B: Backend>(
    output_dir: &Path,
    device: &B::Device,
) -> Result<(TransferClassifier<B>, ModelMetadata)> {
    let metadata = ModelMetadata::load(&output_dir.join(METADATA_FILE))?;

    let record_path = output_dir.join(FINAL_MODEL_NAME).with_extension("mpk");
    if !record_path.exists() {
        return Err(TrainerError::PathNotFound(record_path));
    }

    let model = metadata
        .model_config()
        .init::<B>(device)
        .load_file(record_path.clone(), &CompactRecorder::new(), device)?;
    info!("Loaded model from {:?} ({} classes)", record_path, metadata.num_classes);

    Ok((model, metadata))
}
