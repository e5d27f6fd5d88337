//! Training History
//!
//! Per-epoch metric series recorded by the trainer: `accuracy`,
//! `val_accuracy`, `loss` and `val_loss`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Metrics of a single finished epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// Epoch index (0-based)
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Metric series, one value per epoch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub accuracy: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub loss: Vec<f64>,
    pub val_loss: Vec<f64>,
}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the metrics of one epoch
    pub fn push(&mut self, logs: &EpochLogs) {
        self.accuracy.push(logs.accuracy);
        self.val_accuracy.push(logs.val_accuracy);
        self.loss.push(logs.loss);
        self.val_loss.push(logs.val_loss);
    }

    /// Series by metric name
    pub fn get(&self, metric: &str) -> Option<&[f64]> {
        match metric {
            "accuracy" => Some(&self.accuracy),
            "val_accuracy" => Some(&self.val_accuracy),
            "loss" => Some(&self.loss),
            "val_loss" => Some(&self.val_loss),
            _ => None,
        }
    }

    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.loss.len()
    }

    /// Check if no epoch has been recorded
    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    /// Epoch with the lowest validation loss
    pub fn best_epoch(&self) -> Option<usize> {
        self.val_loss
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// Save as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn logs(epoch: usize, val_loss: f64) -> EpochLogs {
        EpochLogs {
            epoch,
            loss: 0.7,
            accuracy: 0.5,
            val_loss,
            val_accuracy: 0.6,
        }
    }

    #[test]
    fn test_push_and_get() {
        let mut history = History::new();
        history.push(&logs(0, 0.9));
        history.push(&logs(1, 0.4));

        assert_eq!(history.len(), 2);
        assert_eq!(history.get("val_loss"), Some(&[0.9, 0.4][..]));
        assert_eq!(history.get("accuracy"), Some(&[0.5, 0.5][..]));
        assert!(history.get("precision").is_none());
    }

    #[test]
    fn test_best_epoch() {
        let mut history = History::new();
        assert_eq!(history.best_epoch(), None);

        for (epoch, v) in [0.9, 0.3, 0.5].into_iter().enumerate() {
            history.push(&logs(epoch, v));
        }
        assert_eq!(history.best_epoch(), Some(1));
    }

    #[test]
    fn test_json_keys_and_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = History::new();
        history.push(&logs(0, 0.8));
        history.save_json(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for key in ["accuracy", "val_accuracy", "loss", "val_loss"] {
            assert!(raw.get(key).is_some(), "missing key {}", key);
        }

        assert_eq!(History::load_json(&path).unwrap(), history);
    }
}
