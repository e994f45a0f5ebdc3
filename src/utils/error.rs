//! Error Handling Module
//!
//! Defines the error type shared by the dataset, model and training modules.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the transfer-learning trainer
#[derive(Error, Debug)]
pub enum TrainerError {
    /// Error decoding or resizing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with the on-disk dataset layout
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error building, saving or loading a model
    #[error("Model error: {0}")]
    Model(String),

    /// Error during the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for TrainerError {
    fn from(err: serde_json::Error) -> Self {
        TrainerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TrainerError {
    fn from(err: toml::de::Error) -> Self {
        TrainerError::Config(err.to_string())
    }
}

impl From<burn::record::RecorderError> for TrainerError {
    fn from(err: burn::record::RecorderError) -> Self {
        TrainerError::Model(format!("{:?}", err))
    }
}

/// Convenience Result type for trainer operations
pub type Result<T> = std::result::Result<T, TrainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrainerError::Dataset("no class directories".to_string());
        assert_eq!(format!("{}", err), "Dataset error: no class directories");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/train/Tomato___healthy/leaf.jpg");
        let err = TrainerError::ImageLoad(path, "unexpected EOF".to_string());
        let msg = err.to_string();
        assert!(msg.contains("leaf.jpg"));
        assert!(msg.contains("unexpected EOF"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TrainerError = io_err.into();
        assert!(matches!(err, TrainerError::Io(_)));
    }

    #[test]
    fn test_toml_error_becomes_config_error() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("epochs = = 3");
        let err: TrainerError = parse.unwrap_err().into();
        assert!(matches!(err, TrainerError::Config(_)));
    }
}
