//! Inference Predictor Module
//!
//! Batched prediction over a producer and single-image prediction on
//! trained plant-health models.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::dataset::loader::{is_image_file, load_image_tensor};
use crate::dataset::{BatchProducer, ImageBatch, ImageBatcher};
use crate::model::ImageClassifier;
use crate::utils::error::{PlantHealthError, Result, ResultExt};
use crate::utils::logging::ProgressLogger;
use crate::DECISION_THRESHOLD;

/// Binary decision for a probability: `1` iff `probability > 0.5`
pub fn threshold(probability: f32) -> u8 {
    u8::from(probability > DECISION_THRESHOLD)
}

/// Images, labels, probabilities and predictions aligned by index
#[derive(Debug, Clone)]
pub struct PredictionSet {
    /// CHW images with values in [0, 1]
    pub images: Vec<Vec<f32>>,
    /// Side length of the square images
    pub image_size: usize,
    /// True labels
    pub labels: Vec<u8>,
    /// Probability of label `1`
    pub probabilities: Vec<f32>,
    /// Thresholded probabilities
    pub predictions: Vec<u8>,
}

impl PredictionSet {
    /// Build a set; fails when the sequences are not the same length
    pub fn new(
        images: Vec<Vec<f32>>,
        image_size: usize,
        labels: Vec<u8>,
        probabilities: Vec<f32>,
    ) -> Result<Self> {
        if images.len() != labels.len() || labels.len() != probabilities.len() {
            return Err(PlantHealthError::InvalidInput(format!(
                "misaligned prediction set: {} images, {} labels, {} probabilities",
                images.len(),
                labels.len(),
                probabilities.len()
            )));
        }

        let predictions = probabilities.iter().map(|&p| threshold(p)).collect();

        Ok(Self {
            images,
            image_size,
            labels,
            probabilities,
            predictions,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Fraction of correct predictions
    pub fn accuracy(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let correct = self
            .labels
            .iter()
            .zip(self.predictions.iter())
            .filter(|(l, p)| l == p)
            .count();
        correct as f64 / self.len() as f64
    }
}

/// Run the model over every batch of `producer` and keep the inputs
///
/// Samples come out in producer order.
pub fn collect_predictions<B: Backend>(
    model: &ImageClassifier<B>,
    producer: &mut BatchProducer,
    device: &B::Device,
) -> Result<PredictionSet> {
    let batcher = ImageBatcher::new(producer.image_size());
    let mut progress = ProgressLogger::new("Predicting", producer.num_samples());

    let mut images = Vec::with_capacity(producer.num_samples());
    let mut labels = Vec::with_capacity(producer.num_samples());
    let mut probabilities = Vec::with_capacity(producer.num_samples());

    for batch_idx in 0..producer.len() {
        let items = producer.batch_items(batch_idx)?;
        let batch_images: Vec<Vec<f32>> = items.iter().map(|item| item.image.clone()).collect();
        labels.extend(items.iter().map(|item| item.label as u8));

        let batch: ImageBatch<B> = batcher.batch(items, device);
        probabilities.extend(probabilities_of(model, batch.images)?);
        images.extend(batch_images);

        progress.update(images.len());
    }

    progress.finish();
    PredictionSet::new(images, producer.image_size(), labels, probabilities)
}

fn probabilities_of<B: Backend>(model: &ImageClassifier<B>, images: Tensor<B, 4>) -> Result<Vec<f32>> {
    model
        .forward_probability(images)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PlantHealthError::Model(format!("Failed to read probabilities: {:?}", e)))
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Path to the input image
    pub image_path: PathBuf,
    /// Probability of the second class
    pub probability: f32,
    /// Predicted class index
    pub predicted_class: usize,
    /// Predicted class name
    pub class_name: String,
    /// Confidence in the predicted class
    pub confidence: f32,
    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    fn new(image_path: PathBuf, probability: f32, class_names: &[String], elapsed: Duration) -> Self {
        let predicted_class = threshold(probability) as usize;
        let class_name = class_names
            .get(predicted_class)
            .cloned()
            .unwrap_or_else(|| format!("class {}", predicted_class));
        let confidence = if predicted_class == 1 {
            probability
        } else {
            1.0 - probability
        };

        Self {
            image_path,
            probability,
            predicted_class,
            class_name,
            confidence,
            inference_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Classify one image file
pub fn predict_image<B: Backend>(
    model: &ImageClassifier<B>,
    path: &Path,
    image_size: usize,
    class_names: &[String],
    device: &B::Device,
) -> Result<PredictionResult> {
    let image = load_image_tensor(path, image_size)?;

    let start = Instant::now();
    let input = Tensor::<B, 4>::from_data(
        TensorData::new(image, [1, 3, image_size, image_size]),
        device,
    );
    let probability = probabilities_of(model, input)?
        .first()
        .copied()
        .context("model returned no output")?;

    Ok(PredictionResult::new(
        path.to_path_buf(),
        probability,
        class_names,
        start.elapsed(),
    ))
}

/// Classify a file, or every image below a directory (sorted by path)
pub fn predict_path<B: Backend>(
    model: &ImageClassifier<B>,
    path: &Path,
    image_size: usize,
    class_names: &[String],
    device: &B::Device,
) -> Result<Vec<PredictionResult>> {
    if !path.exists() {
        return Err(PlantHealthError::PathNotFound(path.to_path_buf()));
    }

    if path.is_file() {
        return Ok(vec![predict_image(model, path, image_size, class_names, device)?]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p))
        .collect();
    files.sort();

    info!("Classifying {} images under {:?}", files.len(), path);

    files
        .iter()
        .map(|file| predict_image(model, file, image_size, class_names, device))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ImageSample;
    use crate::model::ClassifierConfig;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn class_names() -> Vec<String> {
        vec!["diseased".to_string(), "healthy".to_string()]
    }

    #[test]
    fn test_threshold() {
        assert_eq!(threshold(0.0), 0);
        assert_eq!(threshold(0.5), 0);
        assert_eq!(threshold(0.5001), 1);
        assert_eq!(threshold(1.0), 1);
    }

    #[test]
    fn test_prediction_set_alignment() {
        let set = PredictionSet::new(
            vec![vec![0.0; 3]; 3],
            1,
            vec![0, 1, 1],
            vec![0.2, 0.9, 0.4],
        )
        .unwrap();

        assert_eq!(set.predictions, vec![0, 1, 0]);
        assert!((set.accuracy() - 2.0 / 3.0).abs() < 1e-9);

        let misaligned = PredictionSet::new(vec![vec![0.0; 3]; 2], 1, vec![0, 1, 1], vec![0.2, 0.9, 0.4]);
        assert!(matches!(misaligned, Err(PlantHealthError::InvalidInput(_))));
    }

    #[test]
    fn test_prediction_result_confidence() {
        let result = PredictionResult::new(PathBuf::from("leaf.png"), 0.2, &class_names(), Duration::ZERO);
        assert_eq!(result.predicted_class, 0);
        assert_eq!(result.class_name, "diseased");
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_collect_and_predict() {
        let dir = tempdir().unwrap();
        let samples: Vec<ImageSample> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("leaf_{}.png", i));
                let shade = 60 * i as u8;
                RgbImage::from_pixel(20, 20, Rgb([shade, 200, shade])).save(&path).unwrap();
                ImageSample { path, label: i % 2 }
            })
            .collect();
        let first_path = samples[0].path.clone();
        let mut producer = BatchProducer::new(samples, 2, 32);

        let device = Default::default();
        let model = ClassifierConfig::new()
            .with_image_size(32)
            .with_hidden_units(8)
            .init::<TestBackend>(&device);

        let set = collect_predictions(&model, &mut producer, &device).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.labels, vec![0, 1, 0]);
        assert!(set.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(set.images.iter().all(|img| img.len() == 3 * 32 * 32));

        let single = predict_image(&model, &first_path, 32, &class_names(), &device).unwrap();
        assert!((single.probability - set.probabilities[0]).abs() < 1e-5);

        let all = predict_path(&model, dir.path(), 32, &class_names(), &device).unwrap();
        assert_eq!(all.len(), 3);
    }
}
