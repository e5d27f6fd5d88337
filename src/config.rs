//! Pipeline Configuration Module
//!
//! Every knob of the training pipeline lives in [`PipelineConfig`]. All
//! fields have defaults, so a TOML file only needs to list what it changes:
//!
//! ```toml
//! [paths]
//! data_dir = "/content/drive/MyDrive/plant_dataset"
//!
//! [training]
//! epochs = 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::utils::error::{PlantHealthError, Result};

/// Top-level configuration for the whole pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub data: DataConfig,
    pub augmentation: AugmentationConfig,
    pub model: ModelSettings,
    pub training: TrainingSettings,
}

/// Dataset and artifact locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Dataset root containing the train and test directories
    pub data_dir: PathBuf,

    /// Name of the training directory under `data_dir`
    pub train_subdir: String,

    /// Name of the test directory under `data_dir`
    pub test_subdir: String,

    /// Directory receiving checkpoints, the final model and charts
    pub output_dir: PathBuf,

    /// File stem of the best-epoch checkpoint
    pub checkpoint_name: String,

    /// File stem of the final model
    pub model_name: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            train_subdir: "train".to_string(),
            test_subdir: "test".to_string(),
            output_dir: PathBuf::from("output"),
            checkpoint_name: "best_model".to_string(),
            model_name: "plant_health_distribution_model".to_string(),
        }
    }
}

/// Input pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Images are resized to `image_size x image_size`
    pub image_size: usize,

    /// Samples per batch
    pub batch_size: usize,

    /// Fraction of each training class held out for validation
    pub validation_split: f64,

    /// Seed for shuffling and augmentation
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            image_size: crate::IMAGE_SIZE,
            batch_size: crate::BATCH_SIZE,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

/// Classifier head and backbone settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Width of the hidden dense layer
    pub hidden_units: usize,

    /// Dropout rate applied after the hidden layer
    pub dropout: f64,

    /// Optional burn record holding pretrained backbone weights
    pub backbone_weights: Option<PathBuf>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            hidden_units: 128,
            dropout: 0.5,
            backbone_weights: None,
        }
    }
}

/// Optimizer and callback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Maximum number of epochs
    pub epochs: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Epochs without `val_loss` improvement before stopping
    pub patience: usize,

    /// Minimum decrease of `val_loss` that counts as an improvement
    pub min_delta: f64,

    /// Reload the best-epoch weights when early stopping triggers
    pub restore_best_weights: bool,

    /// Only write the checkpoint when `val_loss` improves
    pub save_best_only: bool,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 20,
            learning_rate: 1e-3,
            patience: 5,
            min_delta: 0.0,
            restore_best_weights: true,
            save_best_only: true,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PlantHealthError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            PlantHealthError::Config(format!("Failed to parse config {}: {e}", path.display()))
        })
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PlantHealthError::Serialization(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let data = &self.data;
        if data.image_size == 0 || data.image_size % 32 != 0 {
            return Err(PlantHealthError::Config(
                "image_size must be a positive multiple of 32".to_string(),
            ));
        }

        if data.batch_size == 0 {
            return Err(PlantHealthError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&data.validation_split) {
            return Err(PlantHealthError::Config(
                "validation_split must be in range [0.0, 1.0)".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(PlantHealthError::Config(
                "dropout must be in range [0.0, 1.0)".to_string(),
            ));
        }

        if self.model.hidden_units == 0 {
            return Err(PlantHealthError::Config(
                "hidden_units must be greater than 0".to_string(),
            ));
        }

        if self.training.epochs == 0 {
            return Err(PlantHealthError::Config(
                "epochs must be greater than 0".to_string(),
            ));
        }

        if !self.training.learning_rate.is_finite() || self.training.learning_rate <= 0.0 {
            return Err(PlantHealthError::Config(
                "learning_rate must be a positive finite number".to_string(),
            ));
        }

        if !self.training.min_delta.is_finite() || self.training.min_delta < 0.0 {
            return Err(PlantHealthError::Config(
                "min_delta must be a finite, non-negative number".to_string(),
            ));
        }

        self.augmentation.validate()
    }

    /// `<data_dir>/<train_subdir>`
    pub fn train_dir(&self) -> PathBuf {
        self.paths.data_dir.join(&self.paths.train_subdir)
    }

    /// `<data_dir>/<test_subdir>`
    pub fn test_dir(&self) -> PathBuf {
        self.paths.data_dir.join(&self.paths.test_subdir)
    }

    /// Path (without extension) of the best-epoch checkpoint
    pub fn checkpoint_path(&self) -> PathBuf {
        self.paths.output_dir.join(&self.paths.checkpoint_name)
    }

    /// Path (without extension) of the final model
    pub fn model_path(&self) -> PathBuf {
        self.paths.output_dir.join(&self.paths.model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.data.image_size, 224);
        assert_eq!(config.data.batch_size, 32);
        assert_eq!(config.training.epochs, 20);
        assert_eq!(config.training.patience, 5);
        assert_eq!(config.model.hidden_units, 128);
        assert!(config.training.restore_best_weights);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths() {
        let mut config = PipelineConfig::default();
        config.paths.data_dir = PathBuf::from("/datasets/plants");
        config.paths.output_dir = PathBuf::from("/tmp/out");

        assert_eq!(config.train_dir(), PathBuf::from("/datasets/plants/train"));
        assert_eq!(config.test_dir(), PathBuf::from("/datasets/plants/test"));
        assert_eq!(config.checkpoint_path(), PathBuf::from("/tmp/out/best_model"));
        assert_eq!(
            config.model_path(),
            PathBuf::from("/tmp/out/plant_health_distribution_model")
        );
    }

    #[test]
    fn test_partial_toml() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [data]
            batch_size = 8

            [training]
            epochs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.data.batch_size, 8);
        assert_eq!(config.data.image_size, 224);
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.patience, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.data.image_size = 100;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.data.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.data.validation_split = 1.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.model.dropout = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        for lr in [f64::NAN, f64::INFINITY] {
            let mut config = PipelineConfig::default();
            config.training.learning_rate = lr;
            assert!(matches!(config.validate(), Err(PlantHealthError::Config(_))));
        }

        for delta in [f64::NAN, f64::INFINITY] {
            let mut config = PipelineConfig::default();
            config.training.min_delta = delta;
            assert!(matches!(config.validate(), Err(PlantHealthError::Config(_))));
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");

        let mut config = PipelineConfig::default();
        config.training.epochs = 7;
        config.model.backbone_weights = Some(PathBuf::from("weights/efficientnet_b0"));
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let result = PipelineConfig::load(Path::new("/nonexistent/pipeline.toml"));
        assert!(matches!(result, Err(PlantHealthError::Config(_))));
    }
}
