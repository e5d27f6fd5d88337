//! Plant Health CLI
//!
//! Entry point for training, evaluating and running the plant-health
//! classifier with the Burn framework.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use plant_health::backend::{backend_name, DefaultBackend, TrainingBackend};
use plant_health::config::PipelineConfig;
use plant_health::pipeline::{run_evaluation, run_prediction, run_training_pipeline, show_stats};
use plant_health::utils::logging::{init_logging, LogConfig};

/// Plant Health Classification
///
/// Transfer learning on a frozen EfficientNet-B0 backbone for binary
/// plant-health classification.
#[derive(Parser, Debug)]
#[command(name = "plant_health")]
#[command(version)]
#[command(about = "Binary plant-health classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand; flags override the config file
#[derive(Args, Debug, Clone, Default)]
struct CommonArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset root containing train/ and test/
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Output directory for models and charts
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Image size (square, multiple of 32)
    #[arg(long)]
    image_size: Option<usize>,

    /// Random seed for shuffling and augmentation
    #[arg(long)]
    seed: Option<u64>,

    /// Pretrained EfficientNet-B0 weights (burn record)
    #[arg(long)]
    backbone_weights: Option<PathBuf>,
}

impl CommonArgs {
    /// Load the config file (or defaults) and apply the flags on top
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.paths.data_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.paths.output_dir = dir.clone();
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.data.batch_size = batch_size;
        }
        if let Some(image_size) = self.image_size {
            config.data.image_size = image_size;
        }
        if let Some(seed) = self.seed {
            config.data.seed = seed;
        }
        if let Some(weights) = &self.backbone_weights {
            config.model.backbone_weights = Some(weights.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train, save and evaluate the model
    Train {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Evaluate a saved model on the test directory
    Evaluate {
        /// Saved model path (without extension)
        #[arg(short, long)]
        model: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Classify a single image or every image in a directory
    Predict {
        /// Saved model path (without extension)
        #[arg(short, long)]
        model: PathBuf,

        /// Image file or directory
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Show dataset statistics
    Stats {
        #[command(flatten)]
        common: CommonArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train { common } => cmd_train(&common.resolve()?)?,
        Commands::Evaluate { model, common } => cmd_evaluate(&common.resolve()?, &model)?,
        Commands::Predict {
            model,
            input,
            common,
        } => cmd_predict(&common.resolve()?, &model, &input)?,
        Commands::Stats { common } => show_stats(&common.resolve()?)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   🌱 Plant Health Classification                                  ║
 ║   Transfer learning on EfficientNet-B0 with Burn + Rust          ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
    println!("  Backend: {}", backend_name().cyan());
}

fn cmd_train(config: &PipelineConfig) -> Result<()> {
    info!("Starting training run: {:?}", config.training);

    let outcome = run_training_pipeline::<TrainingBackend>(config)?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Epochs run:      {}", outcome.history.len());
    if let Some(best) = outcome.history.best_epoch() {
        println!(
            "  Best epoch:      {} (val_loss {:.4})",
            best + 1,
            outcome.history.val_loss[best]
        );
    }
    println!("  Test accuracy:   {:.2}%", outcome.evaluation.accuracy * 100.0);
    println!("  Model:           {}", outcome.artifacts.model.display());
    println!("  Best checkpoint: {}", outcome.artifacts.checkpoint.display());
    println!("  History:         {}", outcome.artifacts.history.display());

    Ok(())
}

fn cmd_evaluate(config: &PipelineConfig, model: &Path) -> Result<()> {
    info!("Evaluating model {:?}", model);

    let outcome = run_evaluation::<DefaultBackend>(config, model)?;

    println!();
    println!("{}", outcome.evaluation.to_string().green().bold());
    println!(
        "  Sample predictions: {}",
        outcome.prediction_grid.display()
    );

    Ok(())
}

fn cmd_predict(config: &PipelineConfig, model: &Path, input: &Path) -> Result<()> {
    info!("Running inference on {:?}", input);

    let results = run_prediction::<DefaultBackend>(config, model, input)?;

    println!();
    println!("{}", "Predictions:".cyan().bold());
    for result in &results {
        let name = result
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| result.image_path.display().to_string());
        println!(
            "  {:40} {:>12} {:6.2}% (p = {:.4}, {:.1} ms)",
            name,
            result.class_name.yellow(),
            result.confidence * 100.0,
            result.probability,
            result.inference_time_ms
        );
    }

    Ok(())
}
