//! Plant-Health Classifier
//!
//! A frozen EfficientNet-B0 feature extractor followed by a small trainable
//! head producing one logit per image:
//!
//! ```text
//! EfficientNet-B0 -> GlobalAvgPool -> Dense(128, ReLU) -> Dropout(0.5) -> Dense(1) -> sigmoid
//! ```

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{
        activation::sigmoid,
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};

use super::efficientnet::{EfficientNetB0, FEATURE_CHANNELS};
use crate::config::PipelineConfig;

/// Configuration for the [`ImageClassifier`]
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Input image size (square)
    #[config(default = "224")]
    pub image_size: usize,

    /// Units of the hidden dense layer
    #[config(default = "128")]
    pub hidden_units: usize,

    /// Dropout rate after the hidden layer
    #[config(default = "0.5")]
    pub dropout: f64,

    /// Class names indexed by label; empty when unknown
    #[config(default = "Vec::new()")]
    pub class_names: Vec<String>,
}

impl ClassifierConfig {
    /// Build the model configuration from pipeline settings
    pub fn from_pipeline(config: &PipelineConfig, class_names: &[String]) -> Self {
        Self::new()
            .with_image_size(config.data.image_size)
            .with_hidden_units(config.model.hidden_units)
            .with_dropout(config.model.dropout)
            .with_class_names(class_names.to_vec())
    }

    /// Create a classifier with a frozen, randomly initialised backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageClassifier<B> {
        ImageClassifier {
            backbone: EfficientNetB0::new(device).no_grad(),
            head: ClassificationHead::new(self.hidden_units, self.dropout, device),
        }
    }
}

/// Trainable top placed on the backbone features
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    pool: AdaptiveAvgPool2d,
    fc1: Linear<B>,
    relu: Relu,
    dropout: Dropout,
    fc2: Linear<B>,
}

impl<B: Backend> ClassificationHead<B> {
    /// Create a new head
    pub fn new(hidden_units: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(FEATURE_CHANNELS, hidden_units).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(dropout).init(),
            fc2: LinearConfig::new(hidden_units, 1).init(device),
        }
    }

    /// Features `[B, 1280, h, w]` -> logits `[B, 1]`
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(features);

        // Flatten [batch, channels, 1, 1] -> [batch, channels]
        let [batch, channels, _, _] = x.dims();
        let x: Tensor<B, 2> = x.reshape([batch, channels]);

        let x = self.relu.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}

/// Binary plant-health classifier
#[derive(Module, Debug)]
pub struct ImageClassifier<B: Backend> {
    pub backbone: EfficientNetB0<B>,
    pub head: ClassificationHead<B>,
}

impl<B: Backend> ImageClassifier<B> {
    /// Logits `[B, 1]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    /// Probabilities of the positive class `[B, 1]`
    pub fn forward_probability(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }

    /// Exclude the backbone from gradient computation
    pub fn freeze_backbone(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }

    /// Total number of parameters
    pub fn total_params(&self) -> usize {
        self.num_params()
    }

    /// Number of parameters updated by training
    pub fn trainable_params(&self) -> usize {
        self.head.num_params()
    }
}

impl<B: AutodiffBackend> ImageClassifier<B> {
    /// Training forward pass
    ///
    /// The backbone runs on the inner backend in inference mode, so it
    /// gets no gradients and its batch-norm statistics stay fixed. Only the
    /// head is tracked by autodiff.
    pub fn forward_frozen(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.valid().forward(images.inner());
        self.head.forward(Tensor::from_inner(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;
    type TestAutodiffBackend = Autodiff<NdArray>;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = ClassifierConfig::new()
            .with_image_size(32)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([3, 3, 32, 32], &device);
        assert_eq!(model.forward(input).dims(), [3, 1]);
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device);

        let input =
            Tensor::<TestBackend, 4>::random([4, 3, 64, 64], Distribution::Uniform(0.0, 1.0), &device);
        let probs: Vec<f32> = model
            .forward_probability(input)
            .into_data()
            .to_vec()
            .unwrap();

        assert_eq!(probs.len(), 4);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_trainable_params_are_head_only() {
        let device = Default::default();
        let model = ClassifierConfig::new().init::<TestBackend>(&device);

        // Dense(1280 -> 128) + Dense(128 -> 1)
        assert_eq!(model.trainable_params(), 1280 * 128 + 128 + 128 + 1);
        assert!(model.total_params() > 3_500_000);
    }

    #[test]
    fn test_frozen_forward_tracks_head() {
        let device = Default::default();
        let model = ClassifierConfig::new()
            .with_dropout(0.0)
            .init::<TestAutodiffBackend>(&device);

        let input = Tensor::<TestAutodiffBackend, 4>::ones([2, 3, 32, 32], &device);
        let logits = model.forward_frozen(input);
        assert_eq!(logits.dims(), [2, 1]);

        let grads = logits.sum().backward();
        assert!(model.head.fc2.weight.grad(&grads).is_some());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = ClassifierConfig::new().with_hidden_units(64).with_dropout(0.25);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ClassifierConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.hidden_units, 64);
        assert_eq!(parsed.dropout, 0.25);
        assert_eq!(parsed.image_size, 224);
        assert!(parsed.class_names.is_empty());
    }

    #[test]
    fn test_config_from_pipeline_keeps_class_names() {
        let names = vec!["diseased".to_string(), "healthy".to_string()];
        let config = ClassifierConfig::from_pipeline(&PipelineConfig::default(), &names);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ClassifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.class_names, names);
        assert_eq!(parsed.hidden_units, 128);
    }
}
