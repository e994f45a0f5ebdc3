//! Per-epoch training history and its CSV export

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::utils::error::Result;

/// Metrics recorded at the end of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Epoch with the lowest finite validation loss (earliest on ties)
    pub fn best(&self) -> Option<&EpochRecord> {
        self.records
            .iter()
            .filter(|r| !r.val_loss.is_nan())
            .fold(None, |best: Option<&EpochRecord>, r| match best {
                Some(b) if b.val_loss <= r.val_loss => Some(b),
                _ => Some(r),
            })
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::from("epoch,train_loss,train_accuracy,val_loss,val_accuracy,elapsed_secs\n");
        for r in &self.records {
            csv.push_str(&format!(
                "{},{:.6},{:.6},{:.6},{:.6},{:.2}\n",
                r.epoch, r.train_loss, r.train_accuracy, r.val_loss, r.val_accuracy, r.elapsed_secs
            ));
        }
        csv
    }

    pub fn save_csv(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_csv())?;
        info!("History saved to {:?}", path);
        Ok(())
    }
}
