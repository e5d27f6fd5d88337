//! Model module: EfficientNet-B0 backbone, classification head and persistence

pub mod classifier;
pub mod efficientnet;
pub mod persistence;

pub use classifier::{ClassificationHead, ClassifierConfig, ImageClassifier};
pub use efficientnet::{EfficientNetB0, MBConvBlock, FEATURE_CHANNELS};
pub use persistence::{load_model, save_model};

use burn::tensor::backend::Backend;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::utils::error::Result;

/// Assemble the classifier described by the pipeline configuration
///
/// Loads pretrained backbone weights when `model.backbone_weights` is set;
/// otherwise the backbone keeps its random initialisation.
pub fn build_model<B: Backend>(
    config: &PipelineConfig,
    class_names: &[String],
    device: &B::Device,
) -> Result<(ImageClassifier<B>, ClassifierConfig)> {
    let model_config = ClassifierConfig::from_pipeline(config, class_names);
    let mut model = model_config.init::<B>(device);

    match &config.model.backbone_weights {
        Some(path) => {
            model.backbone = model.backbone.load_pretrained(path, device)?;
            model = model.freeze_backbone();
        }
        None => warn!("No backbone weights configured; EfficientNet-B0 starts from random initialisation"),
    }

    Ok((model, model_config))
}
