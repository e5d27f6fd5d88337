//! Training Loop
//!
//! This module implements the epoch loop on top of Burn:
//! - Forward pass through the frozen backbone and the trainable head
//! - Binary cross-entropy on logits
//! - Adam updates of the head parameters
//! - Validation after every epoch, history recording and callbacks

use std::path::{Path, PathBuf};

use burn::{
    module::AutodiffModule,
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{DefaultFileRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use super::callbacks::{CallbackAction, TrainingCallback};
use super::history::{EpochLogs, History};
use crate::dataset::BatchProducer;
use crate::inference::{count_correct, evaluate, EvaluationResult};
use crate::model::ImageClassifier;
use crate::utils::error::{PlantHealthError, Result};
use crate::utils::logging::TrainingLogger;

/// Adam with epsilon 1e-7
pub fn adam_config() -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-7)
}

/// Attach an Adam optimizer to a model
pub fn compile<B: AutodiffBackend>(
    model: ImageClassifier<B>,
    learning_rate: f64,
    device: &B::Device,
) -> Trainer<B, impl Optimizer<ImageClassifier<B>, B>> {
    let optimizer = adam_config().init::<B, ImageClassifier<B>>();
    Trainer::new(model, optimizer, learning_rate, device.clone())
}

/// Owns the model and optimizer for the duration of training
pub struct Trainer<B: AutodiffBackend, O> {
    model: ImageClassifier<B>,
    optimizer: O,
    learning_rate: f64,
    device: B::Device,
    loss_fn: BinaryCrossEntropyLoss<B>,
    history: History,
}

/// Sums needed for sample-weighted epoch means
#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    loss_sum: f64,
    correct: usize,
    samples: usize,
}

impl Totals {
    fn mean_loss(&self) -> f64 {
        self.loss_sum / self.samples.max(1) as f64
    }

    fn accuracy(&self) -> f64 {
        self.correct as f64 / self.samples.max(1) as f64
    }
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ImageClassifier<B>, B>,
{
    /// Create a trainer from parts
    pub fn new(model: ImageClassifier<B>, optimizer: O, learning_rate: f64, device: B::Device) -> Self {
        let loss_fn = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&device);

        Self {
            model,
            optimizer,
            learning_rate,
            device,
            loss_fn,
            history: History::new(),
        }
    }

    /// Current model
    pub fn model(&self) -> &ImageClassifier<B> {
        &self.model
    }

    /// Consume the trainer, returning the model
    pub fn into_model(self) -> ImageClassifier<B> {
        self.model
    }

    /// Recorded history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Learning rate used for every step
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Train for up to `epochs` epochs
    ///
    /// Callbacks run in order after every epoch; training stops after the
    /// epoch in which any of them asks to.
    pub fn fit(
        &mut self,
        train: &mut BatchProducer,
        validation: &mut BatchProducer,
        epochs: usize,
        callbacks: &mut [&mut dyn TrainingCallback<ImageClassifier<B>>],
    ) -> Result<&History> {
        if train.is_empty() {
            return Err(PlantHealthError::Training("training producer is empty".to_string()));
        }
        if validation.is_empty() {
            return Err(PlantHealthError::Training("validation producer is empty".to_string()));
        }

        info!(
            "Training on {} samples, validating on {} samples",
            train.num_samples(),
            validation.num_samples()
        );

        for callback in callbacks.iter_mut() {
            callback.on_train_begin();
        }

        let mut logger = TrainingLogger::new(epochs);

        for epoch in 0..epochs {
            logger.start_epoch(epoch);
            println!("{}", format!("Epoch {}/{}", epoch + 1, epochs).yellow().bold());

            let train_totals = self.train_epoch(train)?;
            let val_result = self.validate(validation)?;

            let logs = EpochLogs {
                epoch,
                loss: train_totals.mean_loss(),
                accuracy: train_totals.accuracy(),
                val_loss: val_result.loss,
                val_accuracy: val_result.accuracy,
            };
            self.history.push(&logs);

            logger.end_epoch(logs.loss, logs.accuracy, logs.val_loss, logs.val_accuracy);
            println!(
                "  {} loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
                "→".cyan(),
                logs.loss,
                logs.accuracy,
                logs.val_loss,
                logs.val_accuracy
            );

            let mut stop = false;
            for callback in callbacks.iter_mut() {
                match callback.on_epoch_end(&logs, &self.model)? {
                    CallbackAction::Continue => {}
                    CallbackAction::Stop => stop = true,
                    CallbackAction::StopWithWeights(weights) => {
                        self.model = weights;
                        stop = true;
                    }
                }
            }

            if stop {
                println!("{}", format!("Early stopping after epoch {}", epoch + 1).yellow());
                break;
            }
        }

        for callback in callbacks.iter_mut() {
            callback.on_train_end();
        }

        let best_val_loss = self
            .history
            .val_loss
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        logger.log_complete(self.history.len(), best_val_loss);

        Ok(&self.history)
    }

    /// One pass over the training producer
    fn train_epoch(&mut self, train: &mut BatchProducer) -> Result<Totals> {
        train.reset();
        let num_batches = train.len();

        let progress = ProgressBar::new(num_batches as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("  [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        let mut totals = Totals::default();

        for batch_idx in 0..num_batches {
            let batch = train.get_batch::<B>(batch_idx, &self.device)?;
            let batch_size = batch.len();

            let logits = self.model.forward_frozen(batch.images);
            let loss = self.loss_fn.forward(logits.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                progress.abandon();
                return Err(PlantHealthError::Training(format!(
                    "non-finite loss {} at batch {}",
                    loss_value, batch_idx
                )));
            }

            totals.loss_sum += loss_value * batch_size as f64;
            totals.correct += count_correct(logits.detach(), batch.targets);
            totals.samples += batch_size;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.learning_rate, self.model.clone(), grads);

            progress.set_message(format!(
                "loss: {:.4} - accuracy: {:.4}",
                totals.mean_loss(),
                totals.accuracy()
            ));
            progress.inc(1);
        }

        progress.finish_and_clear();
        debug!("Trained on {} samples", totals.samples);

        Ok(totals)
    }

    /// One pass over the validation producer in inference mode
    fn validate(&self, validation: &mut BatchProducer) -> Result<EvaluationResult> {
        validation.reset();
        evaluate(&self.model.valid(), validation, &self.device)
    }

    /// Write the optimizer state next to a saved model (`<path>-optim.mpk`)
    pub fn save_optimizer_state(&self, model_path: &Path) -> Result<PathBuf> {
        let stem = model_path
            .file_name()
            .map(|name| format!("{}-optim", name.to_string_lossy()))
            .unwrap_or_else(|| "optimizer-optim".to_string());
        let path = model_path.with_file_name(stem);

        let recorder = DefaultFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<B>::record(&recorder, self.optimizer.to_record(), path.clone())
            .map_err(|e| PlantHealthError::Model(format!("Failed to save optimizer state: {:?}", e)))?;

        let written = path.with_extension("mpk");
        info!("Optimizer state saved to {:?}", written);
        Ok(written)
    }
}
