//! Inference module for evaluation and prediction
//!
//! This module provides:
//! - Test-set evaluation (loss and accuracy)
//! - Batched prediction over a producer, keeping the inputs for plotting
//! - Single image and directory prediction

pub mod evaluate;
pub mod predictor;

// Re-export main types for convenience
pub use evaluate::{count_correct, evaluate, EvaluationResult};
pub use predictor::{
    collect_predictions, predict_image, predict_path, threshold, PredictionResult, PredictionSet,
};
