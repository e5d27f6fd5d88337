//! End-to-end pipeline
//!
//! The six training stages run strictly in sequence:
//! 1. Path configuration
//! 2. Data loading and augmentation
//! 3. Model assembly and compilation
//! 4. Training with early stopping and checkpointing
//! 5. Persistence of the final model
//! 6. Evaluation and visualisation
//!
//! Evaluation, prediction and dataset statistics are also exposed on their
//! own for the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dataset::{BatchProducer, DataProducers, ImageFolder};
use crate::inference::{
    collect_predictions, evaluate, predict_path, EvaluationResult, PredictionResult, PredictionSet,
};
use crate::model::{build_model, load_model, save_model, ClassifierConfig, ImageClassifier};
use crate::training::{compile, EarlyStopping, History, ModelCheckpoint, Monitor, TrainingCallback};
use crate::utils::charts::{plot_history, render_prediction_grid};
use crate::utils::error::Result;
use crate::utils::format_number;
use crate::utils::metrics::BinaryMetrics;

/// File names of the artifacts written next to the model
pub const HISTORY_FILE: &str = "history.json";
pub const HISTORY_CHART: &str = "training_history.svg";
pub const PREDICTION_GRID: &str = "sample_predictions.svg";
pub const RUN_SUMMARY: &str = "run_summary.json";

/// Files written by a training run
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub model: PathBuf,
    pub checkpoint: PathBuf,
    pub optimizer: PathBuf,
    pub history: PathBuf,
    pub history_chart: PathBuf,
    pub prediction_grid: PathBuf,
    pub summary: PathBuf,
}

/// Machine-readable record of a finished training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub backend: String,
    pub class_names: Vec<String>,
    pub epochs_run: usize,
    pub best_epoch: Option<usize>,
    pub evaluation: EvaluationResult,
    pub metrics: BinaryMetrics,
}

impl RunSummary {
    /// Save as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Everything a training run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub class_names: Vec<String>,
    pub history: History,
    pub evaluation: EvaluationResult,
    pub metrics: BinaryMetrics,
    pub artifacts: Artifacts,
}

/// Result of evaluating a saved model
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub evaluation: EvaluationResult,
    pub metrics: BinaryMetrics,
    pub prediction_grid: PathBuf,
}

fn stage(number: usize, title: &str) {
    println!();
    println!("{}", format!("[{}/6] {}", number, title).green().bold());
}

/// Run the whole training pipeline
pub fn run_training_pipeline<B: AutodiffBackend>(config: &PipelineConfig) -> Result<PipelineOutcome> {
    config.validate()?;
    let device = B::Device::default();

    // 1. Paths
    stage(1, "Path configuration");
    println!("  Dataset root:       {}", config.paths.data_dir.display());
    println!("  Training directory: {}", config.train_dir().display());
    println!("  Testing directory:  {}", config.test_dir().display());
    println!("  Output directory:   {}", config.paths.output_dir.display());
    println!("  Device:             {:?}", device);
    fs::create_dir_all(&config.paths.output_dir)?;

    // 2. Data
    stage(2, "Data loading and augmentation");
    let DataProducers {
        mut train,
        mut validation,
        mut test,
        class_names,
    } = DataProducers::from_config(config)?;
    println!(
        "  Found {} training, {} validation and {} test images belonging to {} classes: {:?}",
        train.num_samples(),
        validation.num_samples(),
        test.num_samples(),
        class_names.len(),
        class_names
    );
    println!(
        "  Augmentation: {}",
        if train.is_augmented() { "enabled" } else { "disabled" }
    );

    // 3. Model
    stage(3, "Model assembly");
    let (model, model_config) = build_model::<B>(config, &class_names, &device)?;
    let total = model.total_params();
    let trainable = model.trainable_params();
    println!("  Total params:         {}", format_number(total));
    println!("  Trainable params:     {}", format_number(trainable));
    println!("  Non-trainable params: {}", format_number(total - trainable));
    let mut trainer = compile(model, config.training.learning_rate, &device);
    info!(
        "Compiled with Adam (lr {}), binary cross-entropy and accuracy",
        config.training.learning_rate
    );

    // 4. Training
    stage(4, "Training");
    let mut early_stopping = EarlyStopping::<ImageClassifier<B>>::new(config.training.patience)
        .with_monitor(Monitor::ValLoss)
        .with_min_delta(config.training.min_delta)
        .with_restore_best_weights(config.training.restore_best_weights);
    let mut checkpoint = ModelCheckpoint::new(config.checkpoint_path(), model_config.clone())
        .with_monitor(Monitor::ValLoss)
        .with_save_best_only(config.training.save_best_only);

    let history = {
        let mut callbacks: [&mut dyn TrainingCallback<ImageClassifier<B>>; 2] =
            [&mut early_stopping, &mut checkpoint];
        trainer
            .fit(&mut train, &mut validation, config.training.epochs, &mut callbacks)?
            .clone()
    };
    info!("Checkpoint written {} times", checkpoint.saves());

    // 5. Persistence
    stage(5, "Saving model");
    let model_path = config.model_path();
    let model_file = save_model(trainer.model(), &model_config, &model_path)?;
    println!("Model successfully saved as: {}", model_file.display());
    let optimizer_file = trainer.save_optimizer_state(&model_path)?;
    let history_file = config.paths.output_dir.join(HISTORY_FILE);
    history.save_json(&history_file)?;

    // 6. Evaluation
    stage(6, "Evaluation and visualisation");
    let model = trainer.into_model().valid();
    let evaluation = evaluate(&model, &mut test, &device)?;
    println!("Test Accuracy: {:.2}%", evaluation.accuracy * 100.0);
    println!("  {}", evaluation);

    let predictions = collect_predictions(&model, &mut test, &device)?;
    let metrics = report_metrics(&predictions, &class_names)?;

    let history_chart = config.paths.output_dir.join(HISTORY_CHART);
    plot_history(&history, &history_chart)?;
    let prediction_grid = config.paths.output_dir.join(PREDICTION_GRID);
    render_prediction_grid(&predictions, &class_names, &prediction_grid)?;
    println!("  Training curves:    {}", history_chart.display());
    println!("  Sample predictions: {}", prediction_grid.display());

    let summary_file = config.paths.output_dir.join(RUN_SUMMARY);
    RunSummary {
        timestamp: chrono::Utc::now().to_rfc3339(),
        backend: std::any::type_name::<B>().to_string(),
        class_names: class_names.clone(),
        epochs_run: history.len(),
        best_epoch: history.best_epoch(),
        evaluation,
        metrics: metrics.clone(),
    }
    .save_json(&summary_file)?;

    Ok(PipelineOutcome {
        class_names,
        history,
        evaluation,
        metrics,
        artifacts: Artifacts {
            model: model_file,
            checkpoint: config.checkpoint_path().with_extension("mpk"),
            optimizer: optimizer_file,
            history: history_file,
            history_chart,
            prediction_grid,
            summary: summary_file,
        },
    })
}

fn report_metrics(predictions: &PredictionSet, class_names: &[String]) -> Result<BinaryMetrics> {
    let metrics = BinaryMetrics::from_predictions(&predictions.predictions, &predictions.labels)?;
    println!("{}", metrics.display(class_names));
    Ok(metrics)
}

/// Test producer for a saved model: whole test directory, in order
fn test_producer(config: &PipelineConfig, image_size: usize) -> Result<(BatchProducer, Vec<String>)> {
    let folder = ImageFolder::scan(config.test_dir())?;
    folder.require_binary()?;
    let producer = BatchProducer::new(folder.samples, config.data.batch_size, image_size);
    Ok((producer, folder.class_names))
}

/// Reload a saved model, evaluate it on the test directory and render the prediction grid
pub fn run_evaluation<B: Backend>(config: &PipelineConfig, model_path: &Path) -> Result<EvaluationOutcome> {
    let device = B::Device::default();
    let (model, model_config) = load_model::<B>(model_path, &device)?;

    let (mut test, class_names) = test_producer(config, model_config.image_size)?;
    if !model_config.class_names.is_empty() && model_config.class_names != class_names {
        warn!(
            "Model was trained on classes {:?} but the test directory holds {:?}",
            model_config.class_names, class_names
        );
    }
    info!("Evaluating on {} test images", test.num_samples());

    let evaluation = evaluate(&model, &mut test, &device)?;
    println!("Test Accuracy: {:.2}%", evaluation.accuracy * 100.0);

    let predictions = collect_predictions(&model, &mut test, &device)?;
    let metrics = report_metrics(&predictions, &class_names)?;

    fs::create_dir_all(&config.paths.output_dir)?;
    let prediction_grid = config.paths.output_dir.join(PREDICTION_GRID);
    render_prediction_grid(&predictions, &class_names, &prediction_grid)?;

    Ok(EvaluationOutcome {
        evaluation,
        metrics,
        prediction_grid,
    })
}

/// Class names for a saved model
///
/// Uses the names stored with the model, then the training directory, then
/// `0` / `1`.
pub fn resolve_class_names(config: &PipelineConfig, model_config: &ClassifierConfig) -> Vec<String> {
    if model_config.class_names.len() == 2 {
        return model_config.class_names.clone();
    }

    match ImageFolder::scan(config.train_dir()) {
        Ok(folder) if folder.num_classes() == 2 => {
            warn!(
                "Model has no stored class names; using the classes of {:?}",
                config.train_dir()
            );
            folder.class_names
        }
        _ => {
            warn!(
                "Model has no stored class names and {:?} is unavailable; using numeric labels",
                config.train_dir()
            );
            vec!["0".to_string(), "1".to_string()]
        }
    }
}

/// Classify a file or every image under a directory with a saved model
pub fn run_prediction<B: Backend>(
    config: &PipelineConfig,
    model_path: &Path,
    input: &Path,
) -> Result<Vec<PredictionResult>> {
    let device = B::Device::default();
    let (model, model_config) = load_model::<B>(model_path, &device)?;
    let class_names = resolve_class_names(config, &model_config);

    predict_path(&model, input, model_config.image_size, &class_names, &device)
}

/// Print per-class counts of the train and test directories
pub fn show_stats(config: &PipelineConfig) -> Result<()> {
    let train = ImageFolder::scan(config.train_dir())?;
    println!("{}", format!("Training directory: {}", config.train_dir().display()).cyan());
    train.get_stats(config.data.validation_split).print();

    match ImageFolder::scan(config.test_dir()) {
        Ok(test) => {
            println!();
            println!("{}", format!("Testing directory: {}", config.test_dir().display()).cyan());
            test.get_stats(0.0).print();
        }
        Err(e) => warn!("Skipping test directory: {}", e),
    }

    Ok(())
}
