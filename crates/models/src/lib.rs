//! Burn image classifiers for the hard-negative training pipeline.
//!
//! This crate defines CIFAR-style residual networks (`resnet8` … `resnet1202`):
//! a 3x3 stem, three stages of basic blocks at 16/32/64 channels (times a width
//! multiplier), global average pooling and a linear head. Depth `6n + 2` gives
//! `n` blocks per stage.
//!
//! Models are plain Burn `Module`s. Anything that turns images into per-class
//! scores goes through [`ScoreModel`], which is what the trainer consumes.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Images `[N, 3, H, W]` in, raw class scores (logits) `[N, C]` out.
pub trait ScoreModel<B: Backend> {
    fn forward_scores(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
    fn num_classes(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchKind {
    Resnet8,
    Resnet20,
    Resnet32,
    Resnet44,
    Resnet56,
    Resnet110,
    Resnet1202,
}

impl ArchKind {
    pub const ALL: [ArchKind; 7] = [
        ArchKind::Resnet8,
        ArchKind::Resnet20,
        ArchKind::Resnet32,
        ArchKind::Resnet44,
        ArchKind::Resnet56,
        ArchKind::Resnet110,
        ArchKind::Resnet1202,
    ];

    pub fn depth(self) -> usize {
        match self {
            ArchKind::Resnet8 => 8,
            ArchKind::Resnet20 => 20,
            ArchKind::Resnet32 => 32,
            ArchKind::Resnet44 => 44,
            ArchKind::Resnet56 => 56,
            ArchKind::Resnet110 => 110,
            ArchKind::Resnet1202 => 1202,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchKind::Resnet8 => "resnet8",
            ArchKind::Resnet20 => "resnet20",
            ArchKind::Resnet32 => "resnet32",
            ArchKind::Resnet44 => "resnet44",
            ArchKind::Resnet56 => "resnet56",
            ArchKind::Resnet110 => "resnet110",
            ArchKind::Resnet1202 => "resnet1202",
        }
    }

    /// Very deep variants train at a tenth of the learning rate for their
    /// first epoch.
    pub fn needs_warmup(self) -> bool {
        matches!(self, ArchKind::Resnet110 | ArchKind::Resnet1202)
    }
}

impl fmt::Display for ArchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown architecture '{0}' (expected one of resnet8, resnet20, resnet32, resnet44, resnet56, resnet110, resnet1202)")]
pub struct UnknownArch(pub String);

impl FromStr for ArchKind {
    type Err = UnknownArch;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ArchKind::ALL
            .into_iter()
            .find(|a| a.name() == lower)
            .ok_or(UnknownArch(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ResNetConfig {
    pub arch: ArchKind,
    pub num_classes: usize,
    /// Channel multiplier for the 16/32/64 stage widths.
    pub width: usize,
}

impl ResNetConfig {
    pub fn new(arch: ArchKind, num_classes: usize) -> Self {
        Self {
            arch,
            num_classes,
            width: 1,
        }
    }

    pub fn blocks_per_stage(&self) -> usize {
        (self.arch.depth() - 2) / 6
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        ResNet::new(self, device)
    }
}

#[derive(Debug, Module)]
pub struct Shortcut<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

#[derive(Debug, Module)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    shortcut: Option<Shortcut<B>>,
}

fn conv3x3<B: Backend>(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        let shortcut = (stride != 1 || in_ch != out_ch).then(|| Shortcut {
            conv: Conv2dConfig::new([in_ch, out_ch], [1, 1])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Valid)
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_ch).init(device),
        });
        Self {
            conv1: conv3x3(in_ch, out_ch, stride, device),
            bn1: BatchNormConfig::new(out_ch).init(device),
            conv2: conv3x3(out_ch, out_ch, 1, device),
            bn2: BatchNormConfig::new(out_ch).init(device),
            shortcut,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.shortcut {
            Some(s) => s.bn.forward(s.conv.forward(input.clone())),
            None => input.clone(),
        };
        let x = relu(self.bn1.forward(self.conv1.forward(input)));
        let x = self.bn2.forward(self.conv2.forward(x));
        relu(x + identity)
    }
}

#[derive(Debug, Module)]
pub struct ResNet<B: Backend> {
    stem: Conv2d<B>,
    stem_bn: BatchNorm<B, 2>,
    blocks: Vec<BasicBlock<B>>,
    pool: AdaptiveAvgPool2d,
    head: nn::Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ResNet<B> {
    pub fn new(cfg: &ResNetConfig, device: &B::Device) -> Self {
        let width = cfg.width.max(1);
        let stages = [16 * width, 32 * width, 64 * width];
        let n = cfg.blocks_per_stage().max(1);

        let mut blocks = Vec::with_capacity(3 * n);
        let mut in_ch = stages[0];
        for (stage, &out_ch) in stages.iter().enumerate() {
            for i in 0..n {
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                blocks.push(BasicBlock::new(in_ch, out_ch, stride, device));
                in_ch = out_ch;
            }
        }

        Self {
            stem: conv3x3(3, stages[0], 1, device),
            stem_bn: BatchNormConfig::new(stages[0]).init(device),
            blocks,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: nn::LinearConfig::new(stages[2], cfg.num_classes.max(1)).init(device),
            num_classes: cfg.num_classes.max(1),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = relu(self.stem_bn.forward(self.stem.forward(images)));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        self.head.forward(x.reshape([batch, channels]))
    }
}

impl<B: Backend> ScoreModel<B> for ResNet<B> {
    fn forward_scores(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

pub mod prelude {
    pub use super::{ArchKind, BasicBlock, ResNet, ResNetConfig, ScoreModel, UnknownArch};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_maps_to_blocks_per_stage() {
        assert_eq!(ResNetConfig::new(ArchKind::Resnet20, 4).blocks_per_stage(), 3);
        assert_eq!(ResNetConfig::new(ArchKind::Resnet32, 4).blocks_per_stage(), 5);
        assert_eq!(ResNetConfig::new(ArchKind::Resnet1202, 4).blocks_per_stage(), 200);
    }

    #[test]
    fn arch_names_round_trip_through_from_str() {
        for arch in ArchKind::ALL {
            assert_eq!(arch.name().parse::<ArchKind>().unwrap(), arch);
        }
        assert_eq!("ResNet56".parse::<ArchKind>().unwrap(), ArchKind::Resnet56);
        assert!("vgg16".parse::<ArchKind>().is_err());
        assert!(ArchKind::Resnet110.needs_warmup());
        assert!(!ArchKind::Resnet56.needs_warmup());
    }
}
