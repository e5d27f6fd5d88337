//! # Plant Health
//!
//! A Rust library for binary plant-health classification with transfer
//! learning on the Burn framework.
//!
//! ## Features
//!
//! - **Frozen EfficientNet-B0** feature extractor with a small trainable head
//! - **Directory-labelled data pipeline**: seeded shuffling, random affine
//!   augmentation and a validation subset
//! - **Training callbacks**: early stopping with best-weight restore and
//!   best-only checkpointing
//! - **Evaluation & visualisation**: test accuracy, SVG training curves and a
//!   grid of sample predictions
//!
//! ## Modules
//!
//! - `config`: TOML pipeline configuration
//! - `dataset`: Image folders, augmentation and batch producers
//! - `model`: EfficientNet-B0 backbone, classifier head and persistence
//! - `training`: Training loop, history and callbacks
//! - `inference`: Evaluation and prediction
//! - `pipeline`: The end-to-end train / evaluate / predict stages
//! - `utils`: Logging, metrics, charts and errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plant_health::backend::TrainingBackend;
//! use plant_health::config::PipelineConfig;
//! use plant_health::pipeline::run_training_pipeline;
//!
//! let mut config = PipelineConfig::default();
//! config.paths.data_dir = "data/plant_health".into();
//! let outcome = run_training_pipeline::<TrainingBackend>(&config)?;
//! println!("{}", outcome.evaluation);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::PipelineConfig;
pub use dataset::{BatchProducer, DataProducers, ImageFolder};
pub use inference::{EvaluationResult, PredictionSet};
pub use model::{ClassifierConfig, ImageClassifier};
pub use pipeline::{run_training_pipeline, PipelineOutcome};
pub use training::{EarlyStopping, History, ModelCheckpoint, Trainer};
pub use utils::error::{PlantHealthError, Result};
pub use utils::metrics::BinaryMetrics;

/// Default side length of the square input images
pub const IMAGE_SIZE: usize = 224;

/// Default number of samples per batch
pub const BATCH_SIZE: usize = 32;

/// Probability above which a sample is assigned label `1`
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
