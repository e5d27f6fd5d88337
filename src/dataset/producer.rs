//! Batch Producers
//!
//! A [`BatchProducer`] lazily yields batches of images read from disk. It
//! can shuffle (reshuffled at every [`BatchProducer::reset`]) and augment,
//! and batch `i` can be fetched directly.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::augmentation::Augmenter;
use super::burn_dataset::{ImageBatch, ImageBatcher, ImageItem};
use super::loader::{ImageFolder, ImageSample, Subset};
use crate::config::PipelineConfig;
use crate::utils::error::{PlantHealthError, Result};

/// Restartable, lazily loading source of image batches
#[derive(Debug, Clone)]
pub struct BatchProducer {
    samples: Vec<ImageSample>,
    batch_size: usize,
    image_size: usize,
    shuffle: bool,
    augmenter: Option<Augmenter>,
    rng: ChaCha8Rng,
    order: Vec<usize>,
    batcher: ImageBatcher,
}

impl BatchProducer {
    /// Create an unshuffled, unaugmented producer
    pub fn new(samples: Vec<ImageSample>, batch_size: usize, image_size: usize) -> Self {
        let order = (0..samples.len()).collect();
        Self {
            samples,
            batch_size: batch_size.max(1),
            image_size,
            shuffle: false,
            augmenter: None,
            rng: ChaCha8Rng::seed_from_u64(0),
            order,
            batcher: ImageBatcher::new(image_size),
        }
    }

    /// Enable shuffling with a seeded RNG
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = true;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.order.shuffle(&mut self.rng);
        self
    }

    /// Enable augmentation
    pub fn with_augmentation(mut self, augmenter: Augmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    /// Number of batches: `ceil(samples / batch_size)`
    pub fn len(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    /// Check if there are no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Samples per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Side length of produced images
    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Whether the producer shuffles
    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// Whether the producer augments
    pub fn is_augmented(&self) -> bool {
        self.augmenter.is_some()
    }

    /// Samples in the current iteration order
    pub fn ordered_samples(&self) -> Vec<&ImageSample> {
        self.order.iter().map(|&i| &self.samples[i]).collect()
    }

    /// Labels in the current iteration order
    pub fn labels(&self) -> Vec<usize> {
        self.order.iter().map(|&i| self.samples[i].label).collect()
    }

    /// Start a new pass; reshuffles when shuffling is enabled
    pub fn reset(&mut self) {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
            debug!("Reshuffled {} samples", self.order.len());
        }
    }

    /// Load the preprocessed (and possibly augmented) items of batch `index`
    pub fn batch_items(&mut self, index: usize) -> Result<Vec<ImageItem>> {
        if index >= self.len() {
            return Err(PlantHealthError::InvalidInput(format!(
                "batch index {} out of range for {} batches",
                index,
                self.len()
            )));
        }

        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.samples.len());

        let mut items = Vec::with_capacity(end - start);
        for &sample_idx in &self.order[start..end] {
            let mut item = ImageItem::from_sample(&self.samples[sample_idx], self.image_size)?;
            if let Some(augmenter) = &self.augmenter {
                item.image =
                    augmenter.augment(&item.image, self.image_size, self.image_size, &mut self.rng);
            }
            items.push(item);
        }

        Ok(items)
    }

    /// Load batch `index` as tensors on `device`
    pub fn get_batch<B: Backend>(&mut self, index: usize, device: &B::Device) -> Result<ImageBatch<B>> {
        let items = self.batch_items(index)?;
        Ok(self.batcher.batch(items, device))
    }
}

/// The three producers of a training run and the class names they share
#[derive(Debug, Clone)]
pub struct DataProducers {
    pub train: BatchProducer,
    pub validation: BatchProducer,
    pub test: BatchProducer,
    pub class_names: Vec<String>,
}

impl DataProducers {
    /// Build train/validation/test producers from the configured directories
    ///
    /// - train: training subset, shuffled, augmented
    /// - validation: validation subset, shuffled, not augmented
    /// - test: whole test directory, in directory order
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let data = &config.data;

        let train_folder = ImageFolder::scan(config.train_dir())?;
        train_folder.require_binary()?;

        let test_folder = ImageFolder::scan(config.test_dir())?;
        test_folder.require_binary()?;

        if test_folder.class_names != train_folder.class_names {
            return Err(PlantHealthError::Dataset(format!(
                "train classes {:?} differ from test classes {:?}",
                train_folder.class_names, test_folder.class_names
            )));
        }

        let train_samples = train_folder.subset(Subset::Training, data.validation_split);
        let val_samples = train_folder.subset(Subset::Validation, data.validation_split);

        if train_samples.is_empty() {
            return Err(PlantHealthError::Dataset(
                "training subset is empty".to_string(),
            ));
        }
        if val_samples.is_empty() {
            return Err(PlantHealthError::Dataset(format!(
                "validation subset is empty (validation_split = {})",
                data.validation_split
            )));
        }

        let mut train = BatchProducer::new(train_samples, data.batch_size, data.image_size)
            .with_shuffle(data.seed);
        if config.augmentation.is_enabled() {
            train = train.with_augmentation(Augmenter::new(config.augmentation.clone()));
        }

        let validation = BatchProducer::new(val_samples, data.batch_size, data.image_size)
            .with_shuffle(data.seed.wrapping_add(1));

        let test = BatchProducer::new(test_folder.samples, data.batch_size, data.image_size);

        Ok(Self {
            train,
            validation,
            test,
            class_names: train_folder.class_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    type TestBackend = NdArray;

    fn make_samples(dir: &Path, count: usize) -> Vec<ImageSample> {
        (0..count)
            .map(|i| {
                let path: PathBuf = dir.join(format!("img_{:02}.png", i));
                let shade = (i * 20) as u8;
                RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade]))
                    .save(&path)
                    .unwrap();
                ImageSample {
                    path,
                    label: i % 2,
                }
            })
            .collect()
    }

    #[test]
    fn test_len_is_ceil() {
        let dir = tempdir().unwrap();
        let producer = BatchProducer::new(make_samples(dir.path(), 7), 3, 8);

        assert_eq!(producer.len(), 3);
        assert_eq!(producer.num_samples(), 7);
    }

    #[test]
    fn test_batches_cover_all_samples() {
        let dir = tempdir().unwrap();
        let mut producer = BatchProducer::new(make_samples(dir.path(), 7), 3, 8);
        let device = Default::default();

        let sizes: Vec<usize> = (0..producer.len())
            .map(|i| producer.get_batch::<TestBackend>(i, &device).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        assert!(producer.get_batch::<TestBackend>(3, &device).is_err());
    }

    #[test]
    fn test_unshuffled_order_is_stable() {
        let dir = tempdir().unwrap();
        for (class, offset) in [("healthy", 0u8), ("diseased", 100u8)] {
            let class_dir = dir.path().join(class);
            std::fs::create_dir_all(&class_dir).unwrap();
            for i in 0..3u8 {
                let shade = offset + i * 30;
                RgbImage::from_pixel(8, 8, Rgb([shade, 0, 0]))
                    .save(class_dir.join(format!("leaf_{}.png", i)))
                    .unwrap();
            }
        }

        let first = ImageFolder::scan(dir.path()).unwrap();
        let second = ImageFolder::scan(dir.path()).unwrap();
        let paths = |f: &ImageFolder| -> Vec<PathBuf> {
            f.samples.iter().map(|s| s.path.clone()).collect()
        };
        assert_eq!(paths(&first), paths(&second));

        let mut a = BatchProducer::new(first.samples.clone(), 4, 8);
        let mut b = BatchProducer::new(second.samples, 4, 8);
        b.reset();

        let ordered: Vec<PathBuf> = a.ordered_samples().iter().map(|s| s.path.clone()).collect();
        assert_eq!(ordered, paths(&first));

        // Red channel of the first pixel identifies each image
        let mut reds = Vec::new();
        for i in 0..a.len() {
            let items_a = a.batch_items(i).unwrap();
            let items_b = b.batch_items(i).unwrap();
            assert_eq!(items_a.len(), items_b.len());
            for (x, y) in items_a.iter().zip(items_b.iter()) {
                assert_eq!(x.image, y.image);
                assert_eq!(x.label, y.label);
                reds.push((x.image[0] * 255.0).round() as u8);
            }
        }
        assert_eq!(reds, vec![100, 130, 160, 0, 30, 60]);
    }

    #[test]
    fn test_shuffle_is_seeded_and_reshuffles() {
        let dir = tempdir().unwrap();
        let samples = make_samples(dir.path(), 20);

        let mut a = BatchProducer::new(samples.clone(), 4, 8).with_shuffle(42);
        let b = BatchProducer::new(samples.clone(), 4, 8).with_shuffle(42);

        let paths = |p: &BatchProducer| -> Vec<PathBuf> {
            p.ordered_samples().iter().map(|s| s.path.clone()).collect()
        };

        assert_eq!(paths(&a), paths(&b));

        let before = paths(&a);
        a.reset();
        let after = paths(&a);
        assert_ne!(before, after);

        let mut sorted_after = after.clone();
        sorted_after.sort();
        let mut original: Vec<PathBuf> = samples.iter().map(|s| s.path.clone()).collect();
        original.sort();
        assert_eq!(sorted_after, original);
    }

    #[test]
    fn test_augmented_values_stay_in_range() {
        let dir = tempdir().unwrap();
        let mut producer = BatchProducer::new(make_samples(dir.path(), 4), 4, 8)
            .with_shuffle(1)
            .with_augmentation(Augmenter::new(AugmentationConfig::default()));
        assert!(producer.is_augmented());

        let items = producer.batch_items(0).unwrap();
        assert_eq!(items.len(), 4);
        for item in items {
            assert_eq!(item.image.len(), 3 * 8 * 8);
            assert!(item.image.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }
}
