//! Metrics Module for Binary Classification
//!
//! Provides the metrics reported after evaluating a plant-health model:
//! - Accuracy
//! - Precision, Recall, F1-score for the positive class (index 1)
//! - 2x2 confusion counts

use serde::{Deserialize, Serialize};

use super::error::{PlantHealthError, Result};

/// Confusion counts and derived scores for a binary classifier
///
/// The positive class is the second class in sorted directory order
/// (label `1`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    /// True positives
    pub true_positives: usize,

    /// True negatives
    pub true_negatives: usize,

    /// False positives
    pub false_positives: usize,

    /// False negatives
    pub false_negatives: usize,
}

impl BinaryMetrics {
    /// Build confusion counts from aligned predictions and labels
    pub fn from_predictions(predictions: &[u8], ground_truth: &[u8]) -> Result<Self> {
        if predictions.len() != ground_truth.len() {
            return Err(PlantHealthError::InvalidInput(format!(
                "{} predictions for {} labels",
                predictions.len(),
                ground_truth.len()
            )));
        }

        let mut metrics = Self::default();
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            metrics.add(actual, pred);
        }

        Ok(metrics)
    }

    /// Add a single prediction
    pub fn add(&mut self, actual: u8, predicted: u8) {
        match (actual > 0, predicted > 0) {
            (true, true) => self.true_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_positives += 1,
            (true, false) => self.false_negatives += 1,
        }
    }

    /// Total number of samples counted
    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// Fraction of correct predictions
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            (self.true_positives + self.true_negatives) as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Precision = TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        let predicted_positive = self.true_positives + self.false_positives;
        if predicted_positive > 0 {
            self.true_positives as f64 / predicted_positive as f64
        } else {
            0.0
        }
    }

    /// Recall = TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        let actual_positive = self.true_positives + self.false_negatives;
        if actual_positive > 0 {
            self.true_positives as f64 / actual_positive as f64
        } else {
            0.0
        }
    }

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        }
    }

    /// Pretty print the confusion counts, labelled with the class names
    pub fn display(&self, class_names: &[String]) -> String {
        let negative = class_names.first().map(String::as_str).unwrap_or("class 0");
        let positive = class_names.get(1).map(String::as_str).unwrap_or("class 1");
        let width = negative.len().max(positive.len()).max(8);

        let mut output = String::new();
        output.push_str(&format!("{:>width$} | {:>width$} {:>width$}\n", "actual", negative, positive));
        output.push_str(&format!("{}\n", "-".repeat(3 * width + 4)));
        output.push_str(&format!(
            "{:>width$} | {:>width$} {:>width$}\n",
            negative, self.true_negatives, self.false_positives
        ));
        output.push_str(&format!(
            "{:>width$} | {:>width$} {:>width$}\n",
            positive, self.false_negatives, self.true_positives
        ));
        output.push_str(&format!(
            "Accuracy: {:.2}% | Precision: {:.4} | Recall: {:.4} | F1: {:.4}\n",
            self.accuracy() * 100.0,
            self.precision(),
            self.recall(),
            self.f1()
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_counts() {
        let predictions = vec![1, 0, 1, 1, 0, 0];
        let ground_truth = vec![1, 0, 0, 1, 1, 0];

        let metrics = BinaryMetrics::from_predictions(&predictions, &ground_truth).unwrap();

        assert_eq!(metrics.true_positives, 2);
        assert_eq!(metrics.true_negatives, 2);
        assert_eq!(metrics.false_positives, 1);
        assert_eq!(metrics.false_negatives, 1);
        assert_eq!(metrics.total(), 6);
        assert!((metrics.accuracy() - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_precision_recall_f1() {
        let metrics = BinaryMetrics {
            true_positives: 8,
            true_negatives: 5,
            false_positives: 2,
            false_negatives: 4,
        };

        assert!((metrics.precision() - 0.8).abs() < 1e-9);
        assert!((metrics.recall() - 8.0 / 12.0).abs() < 1e-9);
        let expected_f1 = 2.0 * 0.8 * (8.0 / 12.0) / (0.8 + 8.0 / 12.0);
        assert!((metrics.f1() - expected_f1).abs() < 1e-9);
    }

    #[test]
    fn test_no_positive_predictions() {
        let metrics = BinaryMetrics::from_predictions(&[0, 0], &[1, 0]).unwrap();
        assert_eq!(metrics.precision(), 0.0);
        assert_eq!(metrics.f1(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(BinaryMetrics::from_predictions(&[0, 1], &[1]).is_err());
    }

    #[test]
    fn test_display_uses_class_names() {
        let metrics = BinaryMetrics::from_predictions(&[1, 0], &[1, 0]).unwrap();
        let names = vec!["diseased".to_string(), "healthy".to_string()];
        let text = metrics.display(&names);
        assert!(text.contains("diseased"));
        assert!(text.contains("healthy"));
        assert!(text.contains("100.00%"));
    }
}
