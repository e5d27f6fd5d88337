//! Dataset module for directory-labelled plant images
//!
//! This module handles:
//! - Scanning `<root>/<class>/<image>` directories
//! - The training/validation split
//! - Training-time augmentation
//! - Lazy batch production and burn batching

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod producer;

pub use augmentation::{AugmentationConfig, Augmenter, TransformParams};
pub use burn_dataset::{ImageBatch, ImageBatcher, ImageItem};
pub use loader::{DatasetStats, ImageFolder, ImageSample, Subset};
pub use producer::{BatchProducer, DataProducers};
