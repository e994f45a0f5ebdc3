//! EfficientNet-B0 feature extractor
//!
//! The network without its classification top:
//! - Stem: Conv 3x3, stride 2, 32 channels
//! - 16 MBConv blocks in 7 stages, each with squeeze-and-excitation
//! - Head: Conv 1x1 to 1280 channels
//!
//! Input `[N, 3, H, W]` produces a feature map `[N, 1280, H/32, W/32]`.
//! All activations are SiLU and BatchNorm uses the Keras epsilon of 1e-3.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    record::CompactRecorder,
    tensor::{
        activation::{sigmoid, silu},
        backend::Backend,
        Tensor,
    },
};
use tracing::info;

use crate::utils::error::{Result, TrainerError};

/// Channels of the feature map the backbone emits
pub const FEATURE_CHANNELS: usize = 1280;

/// Name recorded in model metadata
pub const BACKBONE_NAME: &str = "efficientnet_b0";

const STEM_CHANNELS: usize = 32;
const BN_EPSILON: f64 = 1e-3;
const SE_RATIO: f64 = 0.25;

/// One stage of MBConv blocks
struct Stage {
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    channels: usize,
    repeats: usize,
}

const STAGES: [Stage; 7] = [
    Stage { expand_ratio: 1, kernel: 3, stride: 1, channels: 16, repeats: 1 },
    Stage { expand_ratio: 6, kernel: 3, stride: 2, channels: 24, repeats: 2 },
    Stage { expand_ratio: 6, kernel: 5, stride: 2, channels: 40, repeats: 2 },
    Stage { expand_ratio: 6, kernel: 3, stride: 2, channels: 80, repeats: 3 },
    Stage { expand_ratio: 6, kernel: 5, stride: 1, channels: 112, repeats: 3 },
    Stage { expand_ratio: 6, kernel: 5, stride: 2, channels: 192, repeats: 4 },
    Stage { expand_ratio: 6, kernel: 3, stride: 1, channels: 320, repeats: 1 },
];

fn conv2d<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    groups: usize,
    device: &B::Device,
) -> Conv2d<B> {
    let pad = kernel / 2;
    Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(pad, pad))
        .with_groups(groups)
        .with_bias(false)
        .init(device)
}

fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B, 2> {
    BatchNormConfig::new(channels)
        .with_epsilon(BN_EPSILON)
        .init(device)
}

/// Conv -> BatchNorm -> SiLU
#[derive(Module, Debug)]
pub struct ConvBnSilu<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBnSilu<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: conv2d(in_channels, out_channels, kernel, stride, groups, device),
            bn: batch_norm(out_channels, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        silu(self.bn.forward(self.conv.forward(x)))
    }
}

/// Conv -> BatchNorm, no activation (MBConv projection)
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBn<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: conv2d(in_channels, out_channels, 1, 1, 1, device),
            bn: batch_norm(out_channels, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Channel attention: pool, squeeze, excite, rescale
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pool: AdaptiveAvgPool2d,
    reduce: Conv2d<B>,
    expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    pub fn new(channels: usize, squeezed: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));

        // [N, C, 1, 1] broadcasts over the spatial dims
        x * scale
    }
}

/// Mobile inverted bottleneck block
#[derive(Module, Debug)]
pub struct MbConvBlock<B: Backend> {
    expand: Option<ConvBnSilu<B>>,
    depthwise: ConvBnSilu<B>,
    se: SqueezeExcitation<B>,
    project: ConvBn<B>,
}

impl<B: Backend> MbConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        expand_ratio: usize,
        kernel: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;
        let squeezed = ((in_channels as f64 * SE_RATIO) as usize).max(1);

        let expand = if expand_ratio != 1 {
            Some(ConvBnSilu::new(in_channels, hidden, 1, 1, 1, device))
        } else {
            None
        };

        Self {
            expand,
            depthwise: ConvBnSilu::new(hidden, hidden, kernel, stride, hidden, device),
            se: SqueezeExcitation::new(hidden, squeezed, device),
            project: ConvBn::new(hidden, out_channels, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.depthwise.forward(x);
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        // Identity shortcut only when stride is 1 and channels are unchanged
        if x.dims() == input.dims() {
            x + input
        } else {
            x
        }
    }
}

/// EfficientNet-B0 without the classification top
#[derive(Module, Debug)]
pub struct EfficientNetB0<B: Backend> {
    pub stem: ConvBnSilu<B>,
    pub blocks: Vec<MbConvBlock<B>>,
    pub head: ConvBnSilu<B>,
}

impl<B: Backend> EfficientNetB0<B> {
    /// Randomly initialized backbone
    pub fn new(device: &B::Device) -> Self {
        let stem = ConvBnSilu::new(3, STEM_CHANNELS, 3, 2, 1, device);

        let mut blocks = Vec::new();
        let mut in_channels = STEM_CHANNELS;
        for stage in &STAGES {
            for repeat in 0..stage.repeats {
                let stride = if repeat == 0 { stage.stride } else { 1 };
                blocks.push(MbConvBlock::new(
                    in_channels,
                    stage.channels,
                    stage.expand_ratio,
                    stage.kernel,
                    stride,
                    device,
                ));
                in_channels = stage.channels;
            }
        }

        let head = ConvBnSilu::new(in_channels, FEATURE_CHANNELS, 1, 1, 1, device);

        Self { stem, blocks, head }
    }

    /// Feature map `[N, 1280, H/32, W/32]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.stem.forward(input);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.head.forward(x)
    }

    /// Replace the weights with a Burn record (`.mpk`, CompactRecorder)
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> Result<Self> {
        let resolved = resolve_record_path(path)
            .ok_or_else(|| TrainerError::PathNotFound(path.to_path_buf()))?;

        info!("Loading backbone weights from {:?}", resolved);
        let backbone = self.load_file(resolved, &CompactRecorder::new(), device)?;
        Ok(backbone)
    }
}

/// The record file for `path`, accepting it with or without the `.mpk` extension
fn resolve_record_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let with_ext = path.with_extension("mpk");
    with_ext.is_file().then_some(with_ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_block_layout() {
        let device = Default::default();
        let backbone = EfficientNetB0::<TestBackend>::new(&device);

        assert_eq!(backbone.blocks.len(), 16);
        assert!(backbone.blocks[0].expand.is_none());
        assert!(backbone.blocks[1].expand.is_some());
    }

    #[test]
    fn test_feature_map_shape() {
        let device = Default::default();
        let backbone = EfficientNetB0::<TestBackend>::new(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(backbone.forward(input).dims(), [2, FEATURE_CHANNELS, 1, 1]);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        assert_eq!(backbone.forward(input).dims(), [1, FEATURE_CHANNELS, 2, 2]);
    }

    #[test]
    fn test_squeeze_excitation_keeps_shape() {
        let device = Default::default();
        let se = SqueezeExcitation::<TestBackend>::new(8, 2, &device);
        let input = Tensor::<TestBackend, 4>::ones([1, 8, 5, 5], &device);
        assert_eq!(se.forward(input).dims(), [1, 8, 5, 5]);
    }

    #[test]
    fn test_load_pretrained_missing_file() {
        let device = Default::default();
        let backbone = EfficientNetB0::<TestBackend>::new(&device);

        let err = backbone
            .load_pretrained(Path::new("/nonexistent/efficientnet_b0"), &device)
            .unwrap_err();
        assert!(matches!(err, TrainerError::PathNotFound(_)));
    }

    #[test]
    fn test_load_pretrained_restores_weights() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backbone");
        let device = Default::default();

        let saved = EfficientNetB0::<TestBackend>::new(&device);
        saved
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .unwrap();

        let loaded = EfficientNetB0::<TestBackend>::new(&device)
            .load_pretrained(&path, &device)
            .unwrap();

        let expected: Vec<f32> = saved.stem.conv.weight.val().into_data().to_vec().unwrap();
        let actual: Vec<f32> = loaded.stem.conv.weight.val().into_data().to_vec().unwrap();
        // CompactRecorder stores half precision
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(&actual) {
            assert!((e - a).abs() < 1e-3, "{e} vs {a}");
        }
    }
}
