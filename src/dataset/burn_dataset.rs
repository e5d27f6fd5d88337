//! Burn Batching Integration
//!
//! Turns preprocessed images into burn tensors through burn's `Batcher`
//! trait.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use super::loader::{load_image_tensor, ImageSample};
use crate::utils::error::Result;

/// A single preprocessed image ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageItem {
    /// Image data as flattened CHW float array [3 * H * W], values in [0, 1]
    pub image: Vec<f32>,
    /// Class label (0 or 1)
    pub label: usize,
}

impl ImageItem {
    /// Load and preprocess the image behind a sample
    pub fn from_sample(sample: &ImageSample, image_size: usize) -> Result<Self> {
        Ok(Self {
            image: load_image_tensor(&sample.path, image_size)?,
            label: sample.label,
        })
    }
}

/// A batch of images and binary targets
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size, 1]
    pub targets: Tensor<B, 2, Int>,
}

impl<B: Backend> ImageBatch<B> {
    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batcher stacking [`ImageItem`]s into an [`ImageBatch`]
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_size: usize,
}

impl ImageBatcher {
    /// Create a batcher for square images of `image_size`
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    /// Get the image size
    pub fn image_size(&self) -> usize {
        self.image_size
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let mut pixels = Vec::with_capacity(batch_size * 3 * size * size);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            pixels.extend_from_slice(&item.image);
            labels.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            device,
        );
        let targets =
            Tensor::<B, 2, Int>::from_data(TensorData::new(labels, [batch_size, 1]), device);

        ImageBatch { images, targets }
    }
}
