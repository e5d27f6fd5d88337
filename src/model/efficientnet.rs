//! EfficientNet-B0 Feature Extractor
//!
//! The convolutional part of EfficientNet-B0 without its classifier:
//! - Stem: Conv 3x3 stride 2 (32) + BN + SiLU
//! - 16 MBConv blocks over seven stages, each with squeeze-and-excitation
//! - Head: Conv 1x1 (1280) + BN + SiLU
//!
//! Output shape is `[batch, 1280, H/32, W/32]`.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    record::{DefaultFileRecorder, FullPrecisionSettings},
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor,
    },
};
use tracing::info;

use crate::utils::error::{PlantHealthError, Result};

/// Channels produced by the backbone
pub const FEATURE_CHANNELS: usize = 1280;

const STEM_CHANNELS: usize = 32;
const SE_RATIO: f64 = 0.25;

/// One EfficientNet stage: (expand ratio, kernel, stride, output channels, repeats)
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub expand_ratio: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub out_channels: usize,
    pub repeats: usize,
}

/// The seven B0 stages
pub const B0_STAGES: [StageSpec; 7] = [
    StageSpec { expand_ratio: 1, kernel_size: 3, stride: 1, out_channels: 16, repeats: 1 },
    StageSpec { expand_ratio: 6, kernel_size: 3, stride: 2, out_channels: 24, repeats: 2 },
    StageSpec { expand_ratio: 6, kernel_size: 5, stride: 2, out_channels: 40, repeats: 2 },
    StageSpec { expand_ratio: 6, kernel_size: 3, stride: 2, out_channels: 80, repeats: 3 },
    StageSpec { expand_ratio: 6, kernel_size: 5, stride: 1, out_channels: 112, repeats: 3 },
    StageSpec { expand_ratio: 6, kernel_size: 5, stride: 2, out_channels: 192, repeats: 4 },
    StageSpec { expand_ratio: 6, kernel_size: 3, stride: 1, out_channels: 320, repeats: 1 },
];

fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B> {
    BatchNormConfig::new(channels)
        .with_epsilon(1e-3)
        .with_momentum(0.01)
        .init(device)
}

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel_size: usize,
    stride: usize,
    groups: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel_size / 2;
    Conv2dConfig::new(channels, [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_groups(groups)
        .with_bias(false)
        .init(device)
}

/// Mobile inverted bottleneck block with squeeze-and-excitation
#[derive(Module, Debug)]
pub struct MBConvBlock<B: Backend> {
    expand_conv: Option<Conv2d<B>>,
    expand_bn: Option<BatchNorm<B>>,
    depthwise_conv: Conv2d<B>,
    depthwise_bn: BatchNorm<B>,
    se_pool: AdaptiveAvgPool2d,
    se_reduce: Conv2d<B>,
    se_expand: Conv2d<B>,
    project_conv: Conv2d<B>,
    project_bn: BatchNorm<B>,
    use_residual: bool,
}

impl<B: Backend> MBConvBlock<B> {
    /// Create a block mapping `in_channels` to `out_channels`
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let expanded = in_channels * expand_ratio;

        let (expand_conv, expand_bn) = if expand_ratio != 1 {
            (
                Some(conv([in_channels, expanded], 1, 1, 1, device)),
                Some(batch_norm(expanded, device)),
            )
        } else {
            (None, None)
        };

        let se_channels = ((in_channels as f64 * SE_RATIO) as usize).max(1);

        Self {
            expand_conv,
            expand_bn,
            depthwise_conv: conv([expanded, expanded], kernel_size, stride, expanded, device),
            depthwise_bn: batch_norm(expanded, device),
            se_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            se_reduce: Conv2dConfig::new([expanded, se_channels], [1, 1]).init(device),
            se_expand: Conv2dConfig::new([se_channels, expanded], [1, 1]).init(device),
            project_conv: conv([expanded, out_channels], 1, 1, 1, device),
            project_bn: batch_norm(out_channels, device),
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    /// Forward pass
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();

        if let (Some(conv), Some(bn)) = (&self.expand_conv, &self.expand_bn) {
            x = silu(bn.forward(conv.forward(x)));
        }

        x = silu(self.depthwise_bn.forward(self.depthwise_conv.forward(x)));

        // Squeeze-and-excitation
        let scale = self.se_pool.forward(x.clone());
        let scale = silu(self.se_reduce.forward(scale));
        let scale = sigmoid(self.se_expand.forward(scale));
        x = x * scale;

        x = self.project_bn.forward(self.project_conv.forward(x));

        if self.use_residual {
            x = x + input;
        }

        x
    }
}

/// EfficientNet-B0 without its classification top
#[derive(Module, Debug)]
pub struct EfficientNetB0<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_bn: BatchNorm<B>,
    blocks: Vec<MBConvBlock<B>>,
    head_conv: Conv2d<B>,
    head_bn: BatchNorm<B>,
}

impl<B: Backend> EfficientNetB0<B> {
    /// Create a randomly initialised backbone
    pub fn new(device: &B::Device) -> Self {
        let mut blocks = Vec::new();
        let mut in_channels = STEM_CHANNELS;

        for stage in B0_STAGES.iter() {
            for repeat in 0..stage.repeats {
                let stride = if repeat == 0 { stage.stride } else { 1 };
                blocks.push(MBConvBlock::new(
                    in_channels,
                    stage.out_channels,
                    stage.expand_ratio,
                    stage.kernel_size,
                    stride,
                    device,
                ));
                in_channels = stage.out_channels;
            }
        }

        Self {
            stem_conv: conv([3, STEM_CHANNELS], 3, 2, 1, device),
            stem_bn: batch_norm(STEM_CHANNELS, device),
            blocks,
            head_conv: conv([in_channels, FEATURE_CHANNELS], 1, 1, 1, device),
            head_bn: batch_norm(FEATURE_CHANNELS, device),
        }
    }

    /// Load pretrained weights from a burn record file
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = DefaultFileRecorder::<FullPrecisionSettings>::new();
        let model = self.load_file(path, &recorder, device).map_err(|e| {
            PlantHealthError::Model(format!(
                "Failed to load backbone weights from {:?}: {:?}",
                path, e
            ))
        })?;

        info!("Loaded pretrained backbone weights from {:?}", path);
        Ok(model)
    }

    /// Number of MBConv blocks
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Forward pass: `[B, 3, H, W]` -> `[B, 1280, H/32, W/32]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = silu(self.stem_bn.forward(self.stem_conv.forward(input)));

        for block in &self.blocks {
            x = block.forward(x);
        }

        silu(self.head_bn.forward(self.head_conv.forward(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_block_count() {
        let device = Default::default();
        let backbone = EfficientNetB0::<TestBackend>::new(&device);

        assert_eq!(backbone.num_blocks(), 16);
        assert_eq!(B0_STAGES.iter().map(|s| s.repeats).sum::<usize>(), 16);
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let backbone = EfficientNetB0::<TestBackend>::new(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let output = backbone.forward(input);

        assert_eq!(output.dims(), [2, FEATURE_CHANNELS, 2, 2]);
    }

    #[test]
    fn test_residual_only_when_shapes_match() {
        let device = Default::default();

        let block = MBConvBlock::<TestBackend>::new(16, 16, 6, 3, 1, &device);
        assert!(block.use_residual);

        let block = MBConvBlock::<TestBackend>::new(16, 24, 6, 3, 2, &device);
        assert!(!block.use_residual);

        let input = Tensor::<TestBackend, 4>::ones([1, 16, 8, 8], &device);
        assert_eq!(block.forward(input).dims(), [1, 24, 4, 4]);
    }
}
