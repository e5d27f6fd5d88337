//! Error Handling Module
//!
//! Defines the error type shared by every stage of the plant-health pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for plant-health operations
#[derive(Error, Debug)]
pub enum PlantHealthError {
    /// Error decoding or processing an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset layout or contents
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction, saving or loading
    #[error("Model error: {0}")]
    Model(String),

    /// Error raised while training
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for PlantHealthError {
    fn from(err: serde_json::Error) -> Self {
        PlantHealthError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PlantHealthError {
    fn from(err: toml::de::Error) -> Self {
        PlantHealthError::Config(err.to_string())
    }
}

impl From<burn::record::RecorderError> for PlantHealthError {
    fn from(err: burn::record::RecorderError) -> Self {
        PlantHealthError::Model(format!("{:?}", err))
    }
}

/// Convenience Result type for plant-health operations
pub type Result<T> = std::result::Result<T, PlantHealthError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| PlantHealthError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| PlantHealthError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| PlantHealthError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| PlantHealthError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlantHealthError::Dataset("expected 2 classes, found 3".to_string());
        assert_eq!(format!("{}", err), "Dataset error: expected 2 classes, found 3");
    }

    #[test]
    fn test_image_load_error() {
        let path = PathBuf::from("/data/train/healthy/leaf_001.jpg");
        let err = PlantHealthError::ImageLoad(path, "truncated file".to_string());
        assert!(format!("{}", err).contains("leaf_001.jpg"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parsed: std::result::Result<toml::Value, toml::de::Error> = toml::from_str("epochs = ");
        let err: PlantHealthError = parsed.unwrap_err().into();
        assert!(matches!(err, PlantHealthError::Config(_)));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let with_context = opt.context("class directory has no name");
        assert!(matches!(with_context, Err(PlantHealthError::InvalidInput(_))));
    }
}
