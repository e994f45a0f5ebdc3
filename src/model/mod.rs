//! Model module for transfer learning using the Burn framework
//!
//! This module provides:
//! - The EfficientNet-B0 feature extractor used as a frozen backbone
//! - The transfer classifier with its trainable pooling/dropout/dense head
//!
//! Pretrained backbone weights are loaded from a Burn record; without one the
//! backbone keeps its random initialization.

pub mod classifier;
pub mod efficientnet;

pub use classifier::{ClassifierHead, TransferClassifier, TransferClassifierConfig};
pub use efficientnet::{EfficientNetB0, BACKBONE_NAME, FEATURE_CHANNELS};

/// Default dropout rate of the classification head
pub const DEFAULT_DROPOUT: f64 = 0.3;
