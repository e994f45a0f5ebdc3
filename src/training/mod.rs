//! Training module for transfer learning
//!
//! This module provides:
//! - The training loop (frozen backbone, trainable head, Adam)
//! - Early stopping and save-best-only checkpointing on validation loss
//! - Evaluation with loss, accuracy and confusion matrix
//! - Per-epoch history export

pub mod checkpoint;
pub mod early_stopping;
pub mod evaluate;
pub mod history;
pub mod trainer;

pub use checkpoint::{load_model, BestCheckpoint, ModelMetadata};
pub use early_stopping::{EarlyStopping, StopDecision};
pub use evaluate::{evaluate, EvaluationReport};
pub use history::{EpochRecord, TrainingHistory};
pub use trainer::{run_training, TrainingOutcome};
