//! Training Callbacks
//!
//! Callbacks are invoked by the trainer after every epoch. They can ask
//! the trainer to stop, optionally handing back weights to continue with.
//!
//! - [`EarlyStopping`]: stop after `patience` epochs without improvement
//! - [`ModelCheckpoint`]: persist the model whenever the monitored metric improves

use std::fmt;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use tracing::{debug, info};

use super::history::EpochLogs;
use crate::model::{save_model, ClassifierConfig, ImageClassifier};
use crate::utils::error::Result;

/// Metric a callback watches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monitor {
    Loss,
    Accuracy,
    ValLoss,
    ValAccuracy,
}

impl Monitor {
    /// Read the monitored value from epoch logs
    pub fn value(&self, logs: &EpochLogs) -> f64 {
        match self {
            Monitor::Loss => logs.loss,
            Monitor::Accuracy => logs.accuracy,
            Monitor::ValLoss => logs.val_loss,
            Monitor::ValAccuracy => logs.val_accuracy,
        }
    }

    /// Accuracies improve upwards, losses downwards
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Monitor::Accuracy | Monitor::ValAccuracy)
    }

    /// Value every real measurement improves on
    pub fn initial_best(&self) -> f64 {
        if self.higher_is_better() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    }

    /// Whether `current` beats `best` by more than `min_delta`
    pub fn is_improvement(&self, current: f64, best: f64, min_delta: f64) -> bool {
        if self.higher_is_better() {
            current - min_delta > best
        } else {
            current + min_delta < best
        }
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Monitor::Loss => "loss",
            Monitor::Accuracy => "accuracy",
            Monitor::ValLoss => "val_loss",
            Monitor::ValAccuracy => "val_accuracy",
        };
        write!(f, "{}", name)
    }
}

/// What the trainer should do after a callback ran
#[derive(Debug)]
pub enum CallbackAction<M> {
    /// Keep training
    Continue,
    /// Stop after this epoch
    Stop,
    /// Stop after this epoch and continue with the given weights
    StopWithWeights(M),
}

impl<M> CallbackAction<M> {
    /// Whether the action ends training
    pub fn is_stop(&self) -> bool {
        !matches!(self, CallbackAction::Continue)
    }
}

/// Hook invoked by the trainer at epoch boundaries
pub trait TrainingCallback<M> {
    /// Called once before the first epoch
    fn on_train_begin(&mut self) {}

    /// Called after each epoch's validation pass
    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &M) -> Result<CallbackAction<M>>;

    /// Called once after the last epoch
    fn on_train_end(&mut self) {}
}

/// Stop training when the monitored metric stops improving
#[derive(Debug, Clone)]
pub struct EarlyStopping<M> {
    pub monitor: Monitor,
    pub patience: usize,
    pub min_delta: f64,
    pub restore_best_weights: bool,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
    best_weights: Option<M>,
}

impl<M: Clone> EarlyStopping<M> {
    /// Watch `val_loss` with the given patience
    pub fn new(patience: usize) -> Self {
        Self {
            monitor: Monitor::ValLoss,
            patience,
            min_delta: 0.0,
            restore_best_weights: false,
            best: Monitor::ValLoss.initial_best(),
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
            best_weights: None,
        }
    }

    /// Change the monitored metric
    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self.best = monitor.initial_best();
        self
    }

    /// Minimum change that counts as an improvement
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta.abs();
        self
    }

    /// Hand back the best weights when stopping
    pub fn with_restore_best_weights(mut self, restore: bool) -> Self {
        self.restore_best_weights = restore;
        self
    }

    /// Best monitored value so far
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Epoch of the best monitored value
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Epochs since the last improvement
    pub fn wait(&self) -> usize {
        self.wait
    }

    /// Epoch at which training was stopped, if it was
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl<M: Clone> TrainingCallback<M> for EarlyStopping<M> {
    fn on_train_begin(&mut self) {
        self.best = self.monitor.initial_best();
        self.best_epoch = None;
        self.wait = 0;
        self.stopped_epoch = None;
        self.best_weights = None;
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &M) -> Result<CallbackAction<M>> {
        let current = self.monitor.value(logs);

        if self.monitor.is_improvement(current, self.best, self.min_delta) {
            self.best = current;
            self.best_epoch = Some(logs.epoch);
            self.wait = 0;
            if self.restore_best_weights {
                self.best_weights = Some(model.clone());
            }
            return Ok(CallbackAction::Continue);
        }

        self.wait += 1;
        debug!(
            "{} did not improve from {:.5} ({} / {})",
            self.monitor, self.best, self.wait, self.patience
        );

        if self.wait >= self.patience && logs.epoch > 0 {
            self.stopped_epoch = Some(logs.epoch);

            if self.restore_best_weights {
                if let Some(weights) = self.best_weights.clone() {
                    info!(
                        "Restoring model weights from the end of the best epoch: {}",
                        self.best_epoch.map(|e| e + 1).unwrap_or(0)
                    );
                    return Ok(CallbackAction::StopWithWeights(weights));
                }
            }
            return Ok(CallbackAction::Stop);
        }

        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self) {
        if let Some(epoch) = self.stopped_epoch {
            info!("Epoch {}: early stopping", epoch + 1);
        }
    }
}

/// Persist the model when the monitored metric improves
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    path: PathBuf,
    config: ClassifierConfig,
    pub monitor: Monitor,
    pub save_best_only: bool,
    best: f64,
    saves: usize,
}

impl ModelCheckpoint {
    /// Checkpoint to `path` (extension is set by the recorder), watching `val_loss`
    pub fn new(path: impl Into<PathBuf>, config: ClassifierConfig) -> Self {
        Self {
            path: path.into(),
            config,
            monitor: Monitor::ValLoss,
            save_best_only: true,
            best: Monitor::ValLoss.initial_best(),
            saves: 0,
        }
    }

    /// Change the monitored metric
    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self.best = monitor.initial_best();
        self
    }

    /// Save every epoch when `false`
    pub fn with_save_best_only(mut self, save_best_only: bool) -> Self {
        self.save_best_only = save_best_only;
        self
    }

    /// Checkpoint path stem
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times the model was written
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl<B: Backend> TrainingCallback<ImageClassifier<B>> for ModelCheckpoint {
    fn on_train_begin(&mut self) {
        self.best = self.monitor.initial_best();
    }

    fn on_epoch_end(
        &mut self,
        logs: &EpochLogs,
        model: &ImageClassifier<B>,
    ) -> Result<CallbackAction<ImageClassifier<B>>> {
        let current = self.monitor.value(logs);

        if self.save_best_only {
            if !self.monitor.is_improvement(current, self.best, 0.0) {
                debug!("{} did not improve from {:.5}", self.monitor, self.best);
                return Ok(CallbackAction::Continue);
            }
            info!(
                "Epoch {}: {} improved from {:.5} to {:.5}, saving model to {:?}",
                logs.epoch + 1,
                self.monitor,
                self.best,
                current,
                self.path
            );
            self.best = current;
        }

        save_model(model, &self.config, &self.path)?;
        self.saves += 1;

        Ok(CallbackAction::Continue)
    }
}
