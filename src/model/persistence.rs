//! Model Persistence
//!
//! A saved model is two files sharing a stem:
//! - `<stem>.mpk`: weights, written by burn's full-precision file recorder
//! - `<stem>.json`: the [`ClassifierConfig`] needed to rebuild the architecture

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    record::{DefaultFileRecorder, FullPrecisionSettings},
    tensor::backend::Backend,
};
use tracing::info;

use super::classifier::{ClassifierConfig, ImageClassifier};
use crate::utils::error::{PlantHealthError, Result};

/// Extension appended by burn's default file recorder
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Path of the weight file written for `path`
pub fn weights_path(path: &Path) -> PathBuf {
    path.with_extension(WEIGHTS_EXTENSION)
}

/// Path of the architecture file written for `path`
pub fn config_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

/// Save weights and architecture; returns the weight file path
///
/// Existing files are overwritten.
pub fn save_model<B: Backend>(
    model: &ImageClassifier<B>,
    config: &ClassifierConfig,
    path: &Path,
) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    config
        .save(config_path(path))
        .map_err(|e| PlantHealthError::Model(format!("Failed to save model config: {}", e)))?;

    let recorder = DefaultFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(path, &recorder)
        .map_err(|e| PlantHealthError::Model(format!("Failed to save model: {:?}", e)))?;

    let written = weights_path(path);
    info!("Model saved to {:?}", written);
    Ok(written)
}

/// Rebuild the architecture from `<path>.json` and load `<path>.mpk`
pub fn load_model<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(ImageClassifier<B>, ClassifierConfig)> {
    let config_file = config_path(path);
    if !config_file.exists() {
        return Err(PlantHealthError::PathNotFound(config_file));
    }

    let weights_file = weights_path(path);
    if !weights_file.exists() {
        return Err(PlantHealthError::PathNotFound(weights_file));
    }

    let config = ClassifierConfig::load(&config_file)
        .map_err(|e| PlantHealthError::Model(format!("Failed to load model config: {}", e)))?;

    let recorder = DefaultFileRecorder::<FullPrecisionSettings>::new();
    let model = config
        .init::<B>(device)
        .load_file(path, &recorder, device)
        .map_err(|e| PlantHealthError::Model(format!("Failed to load model: {:?}", e)))?
        .freeze_backbone();

    info!("Model loaded from {:?}", weights_file);
    Ok((model, config))
}
