//! Model Evaluation
//!
//! Loss and accuracy of a model over every batch of a producer, with the
//! batch means weighted by batch size.

use burn::{
    nn::loss::BinaryCrossEntropyLossConfig,
    tensor::{activation::sigmoid, backend::Backend, ElementConversion, Int, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::BatchProducer;
use crate::model::ImageClassifier;
use crate::utils::error::{PlantHealthError, Result};
use crate::DECISION_THRESHOLD;

/// Loss and accuracy over a whole producer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Mean binary cross-entropy
    pub loss: f64,
    /// Fraction of samples classified correctly
    pub accuracy: f64,
    /// Number of samples evaluated
    pub samples: usize,
}

impl std::fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Test Loss: {:.4} | Test Accuracy: {:.2}% ({} samples)",
            self.loss,
            self.accuracy * 100.0,
            self.samples
        )
    }
}

/// Number of samples whose thresholded probability matches the label
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2, Int>) -> usize {
    let predictions = sigmoid(logits).greater_elem(DECISION_THRESHOLD).int();
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Evaluate `model` on every batch of `producer`, in producer order
///
/// Call with an inference-mode model (`model.valid()` when coming from
/// training) so dropout is disabled.
pub fn evaluate<B: Backend>(
    model: &ImageClassifier<B>,
    producer: &mut BatchProducer,
    device: &B::Device,
) -> Result<EvaluationResult> {
    if producer.is_empty() {
        return Err(PlantHealthError::Dataset(
            "cannot evaluate on an empty producer".to_string(),
        ));
    }

    let loss_fn = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init::<B>(device);

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;
    let mut samples = 0usize;

    for batch_idx in 0..producer.len() {
        let batch = producer.get_batch::<B>(batch_idx, device)?;
        let batch_size = batch.len();

        let logits = model.forward(batch.images);
        let loss: f64 = loss_fn
            .forward(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();

        loss_sum += loss * batch_size as f64;
        correct += count_correct(logits, batch.targets);
        samples += batch_size;
    }

    debug!("Evaluated {} samples", samples);

    Ok(EvaluationResult {
        loss: loss_sum / samples.max(1) as f64,
        accuracy: correct as f64 / samples.max(1) as f64,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageSample;
    use crate::model::ClassifierConfig;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    type TestBackend = NdArray;

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![2.0f32, -1.0, 0.5, -3.0], [4, 1]),
            &device,
        );
        let targets = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::new(vec![1i64, 0, 0, 1], [4, 1]),
            &device,
        );

        assert_eq!(count_correct(logits, targets), 2);
    }

    #[test]
    fn test_evaluate_counts_every_sample() {
        let dir = tempdir().unwrap();
        let samples: Vec<ImageSample> = (0..5)
            .map(|i| {
                let path = dir.path().join(format!("leaf_{}.png", i));
                RgbImage::from_pixel(32, 32, Rgb([40, 160, 40])).save(&path).unwrap();
                ImageSample { path, label: i % 2 }
            })
            .collect();
        let mut producer = BatchProducer::new(samples, 2, 32);

        let device = Default::default();
        let model = ClassifierConfig::new()
            .with_image_size(32)
            .with_hidden_units(8)
            .init::<TestBackend>(&device);

        let result = evaluate(&model, &mut producer, &device).unwrap();
        assert_eq!(result.samples, 5);
        assert!(result.loss.is_finite() && result.loss >= 0.0);

        // Identical images get identical predictions: either all label-0 or all label-1 samples are right
        let acc = result.accuracy;
        assert!((acc - 0.6).abs() < 1e-9 || (acc - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_display() {
        let result = EvaluationResult {
            loss: 0.25,
            accuracy: 0.875,
            samples: 10,
        };
        assert!(result.to_string().contains("Test Accuracy: 87.50%"));
    }
}
