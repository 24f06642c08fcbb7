//! Run configuration: CLI flags layered over an optional TOML file.
//!
//! Precedence is explicit CLI value, then the config file (`--config` or the
//! `HARDNEG_CONFIG` environment variable), then the built-in defaults.

use anyhow::{bail, Context};
use burn_dataset::{DecodePolicy, LabelTransform, Preprocess};
use clap::{Parser, ValueEnum};
use models::ArchKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "HARDNEG_CONFIG";

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[value(name = "ndarray")]
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "train",
    about = "Train an image classifier with confidence-gated validation and hard-negative export"
)]
pub struct TrainArgs {
    /// TOML file with defaults for any of the options below.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Architecture (resnet8, resnet20, resnet32, resnet44, resnet56, resnet110, resnet1202).
    #[arg(long, short = 'a')]
    pub arch: Option<ArchKind>,
    /// Backend the binary was built for (ndarray, or wgpu with the backend-wgpu feature).
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
    /// Decode threads per batch.
    #[arg(long, short = 'j')]
    pub workers: Option<usize>,
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Manual epoch number (overridden by --resume).
    #[arg(long)]
    pub start_epoch: Option<usize>,
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,
    #[arg(long, alias = "learning-rate")]
    pub lr: Option<f64>,
    #[arg(long)]
    pub momentum: Option<f64>,
    #[arg(long, alias = "wd")]
    pub weight_decay: Option<f32>,
    /// Log every N batches.
    #[arg(long, short = 'p')]
    pub print_freq: Option<usize>,
    /// Checkpoint stem or `.bin` path to resume from.
    #[arg(long, value_parser = clap::builder::TypedValueParser::map(clap::builder::OsStringValueParser::new(), PathBuf::from))]
    pub resume: Option<PathBuf>,
    /// Run one validation pass and exit.
    #[arg(long, short = 'e')]
    pub evaluate: bool,
    /// Store checkpoints at half precision.
    #[arg(long)]
    pub half: bool,
    /// Write the resumable checkpoint every N epochs.
    #[arg(long)]
    pub save_every: Option<usize>,
    /// Confidence threshold for precision/recall gating.
    #[arg(long)]
    pub threshold: Option<f32>,
    #[arg(long)]
    pub num_cls: Option<usize>,
    #[arg(long)]
    pub train_dir: Option<PathBuf>,
    #[arg(long)]
    pub train_labels: Option<PathBuf>,
    #[arg(long)]
    pub val_dir: Option<PathBuf>,
    #[arg(long)]
    pub val_labels: Option<PathBuf>,
    /// Directory that receives `<arch>/` outputs.
    #[arg(long)]
    pub output_root: Option<PathBuf>,
    /// Per-class loss weights, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub class_weights: Option<Vec<f32>>,
    /// Shift every raw label >= K down by one.
    #[arg(long)]
    pub compact_labels_above: Option<i64>,
    /// Shuffle seed for the training loader.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Device ordinals, comma separated; the first one trains.
    #[arg(long, value_delimiter = ',')]
    pub devices: Option<Vec<usize>>,
    /// Skip undecodable images individually instead of dropping their batch.
    #[arg(long)]
    pub lenient_decode: bool,
    /// Zero border added before resizing.
    #[arg(long)]
    pub pad: Option<u32>,
    /// Shorter-side resize target (0 disables).
    #[arg(long)]
    pub resize: Option<u32>,
    /// Square center-crop size (0 disables).
    #[arg(long)]
    pub crop: Option<u32>,
    /// Epochs at which the learning rate is multiplied by --lr-gamma.
    #[arg(long, value_delimiter = ',')]
    pub lr_milestones: Option<Vec<usize>>,
    #[arg(long)]
    pub lr_gamma: Option<f64>,
}

/// On-disk mirror of [`TrainArgs`]; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrainConfigFile {
    arch: Option<ArchKind>,
    backend: Option<BackendKind>,
    workers: Option<usize>,
    epochs: Option<usize>,
    start_epoch: Option<usize>,
    batch_size: Option<usize>,
    lr: Option<f64>,
    momentum: Option<f64>,
    weight_decay: Option<f32>,
    print_freq: Option<usize>,
    resume: Option<PathBuf>,
    evaluate: Option<bool>,
    half: Option<bool>,
    save_every: Option<usize>,
    threshold: Option<f32>,
    num_cls: Option<usize>,
    train_dir: Option<PathBuf>,
    train_labels: Option<PathBuf>,
    val_dir: Option<PathBuf>,
    val_labels: Option<PathBuf>,
    output_root: Option<PathBuf>,
    class_weights: Option<Vec<f32>>,
    compact_labels_above: Option<i64>,
    seed: Option<u64>,
    devices: Option<Vec<usize>>,
    lenient_decode: Option<bool>,
    pad: Option<u32>,
    resize: Option<u32>,
    crop: Option<u32>,
    lr_milestones: Option<Vec<usize>>,
    lr_gamma: Option<f64>,
}

impl TrainConfigFile {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub image_dir: PathBuf,
    pub labels: PathBuf,
}

/// Fully resolved options handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub arch: ArchKind,
    pub backend: BackendKind,
    pub workers: usize,
    pub epochs: usize,
    pub start_epoch: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub momentum: f64,
    pub weight_decay: f32,
    pub print_freq: usize,
    pub resume: Option<PathBuf>,
    pub evaluate: bool,
    pub half: bool,
    pub save_every: usize,
    pub threshold: f32,
    pub num_classes: usize,
    pub train: DataPaths,
    pub val: DataPaths,
    pub output_root: PathBuf,
    pub class_weights: Option<Vec<f32>>,
    pub label_transform: LabelTransform,
    pub seed: u64,
    pub devices: Vec<usize>,
    pub decode_policy: DecodePolicy,
    pub preprocess: Preprocess,
    /// Empty means milestones at 40% and 80% of `epochs`.
    pub lr_milestones: Vec<usize>,
    pub lr_gamma: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let data = PathBuf::from("data");
        Self {
            arch: ArchKind::Resnet32,
            backend: BackendKind::NdArray,
            workers: 2,
            epochs: 100,
            start_epoch: 0,
            batch_size: 24,
            lr: 0.1,
            momentum: 0.9,
            weight_decay: 1e-4,
            print_freq: 50,
            resume: None,
            evaluate: false,
            half: false,
            save_every: 10,
            threshold: 0.3,
            num_classes: 4,
            train: DataPaths {
                image_dir: data.join("trainSet"),
                labels: data.join("train.json"),
            },
            val: DataPaths {
                image_dir: data.join("testSet"),
                labels: data.join("test.json"),
            },
            output_root: PathBuf::from("."),
            class_weights: None,
            label_transform: LabelTransform::identity(),
            seed: 42,
            devices: vec![0],
            decode_policy: DecodePolicy::Strict,
            preprocess: Preprocess::default(),
            lr_milestones: Vec::new(),
            lr_gamma: 0.1,
        }
    }
}

impl TrainConfig {
    /// Merge CLI args with the config file they name (or `HARDNEG_CONFIG`).
    pub fn resolve(args: TrainArgs) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => TrainConfigFile::from_path(path)?,
            None => match std::env::var(CONFIG_ENV_VAR) {
                Ok(path) if !path.trim().is_empty() => {
                    let path = PathBuf::from(path);
                    if path.exists() {
                        TrainConfigFile::from_path(&path)?
                    } else {
                        tracing::warn!(
                            path = %path.display(),
                            "{CONFIG_ENV_VAR} points at a missing file; using defaults"
                        );
                        TrainConfigFile::default()
                    }
                }
                _ => TrainConfigFile::default(),
            },
        };
        let cfg = Self::merge(args, file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn merge(args: TrainArgs, file: TrainConfigFile) -> Self {
        let d = Self::default();
        let dp = d.preprocess.clone();

        let pad = args.pad.or(file.pad).unwrap_or(dp.pad);
        let resize_shorter = match args.resize.or(file.resize) {
            Some(0) => None,
            Some(v) => Some(v),
            None => dp.resize_shorter,
        };
        let center_crop = match args.crop.or(file.crop) {
            Some(0) => None,
            Some(v) => Some((v, v)),
            None => dp.center_crop,
        };
        let label_transform = match args.compact_labels_above.or(file.compact_labels_above) {
            Some(k) => LabelTransform::compact_above(k),
            None => d.label_transform.clone(),
        };
        let lenient = args.lenient_decode || file.lenient_decode.unwrap_or(false);

        Self {
            arch: args.arch.or(file.arch).unwrap_or(d.arch),
            backend: args.backend.or(file.backend).unwrap_or(d.backend),
            workers: args.workers.or(file.workers).unwrap_or(d.workers),
            epochs: args.epochs.or(file.epochs).unwrap_or(d.epochs),
            start_epoch: args.start_epoch.or(file.start_epoch).unwrap_or(d.start_epoch),
            batch_size: args.batch_size.or(file.batch_size).unwrap_or(d.batch_size),
            lr: args.lr.or(file.lr).unwrap_or(d.lr),
            momentum: args.momentum.or(file.momentum).unwrap_or(d.momentum),
            weight_decay: args.weight_decay.or(file.weight_decay).unwrap_or(d.weight_decay),
            print_freq: args.print_freq.or(file.print_freq).unwrap_or(d.print_freq),
            resume: args
                .resume
                .or(file.resume)
                .filter(|p| !p.as_os_str().is_empty()),
            evaluate: args.evaluate || file.evaluate.unwrap_or(false),
            half: args.half || file.half.unwrap_or(false),
            save_every: args.save_every.or(file.save_every).unwrap_or(d.save_every),
            threshold: args.threshold.or(file.threshold).unwrap_or(d.threshold),
            num_classes: args.num_cls.or(file.num_cls).unwrap_or(d.num_classes),
            train: DataPaths {
                image_dir: args.train_dir.or(file.train_dir).unwrap_or(d.train.image_dir),
                labels: args.train_labels.or(file.train_labels).unwrap_or(d.train.labels),
            },
            val: DataPaths {
                image_dir: args.val_dir.or(file.val_dir).unwrap_or(d.val.image_dir),
                labels: args.val_labels.or(file.val_labels).unwrap_or(d.val.labels),
            },
            output_root: args.output_root.or(file.output_root).unwrap_or(d.output_root),
            class_weights: args.class_weights.or(file.class_weights),
            label_transform,
            seed: args.seed.or(file.seed).unwrap_or(d.seed),
            devices: args.devices.or(file.devices).unwrap_or(d.devices),
            decode_policy: if lenient {
                DecodePolicy::Lenient
            } else {
                DecodePolicy::Strict
            },
            preprocess: Preprocess {
                pad,
                resize_shorter,
                center_crop,
                ..dp
            },
            lr_milestones: args.lr_milestones.or(file.lr_milestones).unwrap_or_default(),
            lr_gamma: args.lr_gamma.or(file.lr_gamma).unwrap_or(d.lr_gamma),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_classes == 0 {
            bail!("num_cls must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.save_every == 0 {
            bail!("save_every must be at least 1");
        }
        if let Some(w) = &self.class_weights {
            if w.len() != self.num_classes {
                bail!(
                    "class_weights has {} entries but num_cls is {}",
                    w.len(),
                    self.num_classes
                );
            }
            if w.iter().any(|v| !v.is_finite() || *v < 0.0) {
                bail!("class_weights must be finite and non-negative: {w:?}");
            }
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            tracing::warn!(
                threshold = self.threshold,
                "threshold outside [0, 1]; every sample will land on one side of the gate"
            );
        }
        Ok(())
    }

    /// `<output_root>/<arch>`: checkpoints, history, ROC and hard negatives.
    pub fn arch_dir(&self) -> PathBuf {
        self.output_root.join(self.arch.name())
    }

    pub fn print_freq(&self) -> usize {
        self.print_freq.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(raw: &str) -> TrainConfigFile {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn defaults_match_reference_run() {
        let cfg = TrainConfig::merge(TrainArgs::default(), TrainConfigFile::default());
        assert_eq!(cfg.arch, ArchKind::Resnet32);
        assert_eq!((cfg.epochs, cfg.batch_size, cfg.workers), (100, 24, 2));
        assert_eq!(cfg.threshold, 0.3);
        assert_eq!(cfg.num_classes, 4);
        assert_eq!(cfg.save_every, 10);
        assert_eq!(cfg.preprocess.center_crop, Some((320, 320)));
        assert!(cfg.resume.is_none());
        assert_eq!(cfg.arch_dir(), PathBuf::from("./resnet32"));
    }

    #[test]
    fn cli_values_override_file_values() {
        let args = TrainArgs::parse_from([
            "train",
            "--arch",
            "resnet20",
            "--threshold",
            "0.5",
            "--class-weights",
            "1,0.2,0.3,0.1",
            "-e",
        ]);
        let f = file(
            r#"
            arch = "resnet56"
            epochs = 7
            threshold = 0.9
            crop = 0
            compact_labels_above = 3
            lenient_decode = true
            "#,
        );
        let cfg = TrainConfig::merge(args, f);
        assert_eq!(cfg.arch, ArchKind::Resnet20);
        assert_eq!(cfg.epochs, 7);
        assert_eq!(cfg.threshold, 0.5);
        assert_eq!(cfg.class_weights, Some(vec![1.0, 0.2, 0.3, 0.1]));
        assert!(cfg.evaluate);
        assert_eq!(cfg.preprocess.center_crop, None);
        assert_eq!(cfg.label_transform.apply(4), 3);
        assert_eq!(cfg.decode_policy, DecodePolicy::Lenient);
        cfg.validate().unwrap();
    }

    #[test]
    fn empty_resume_means_no_resume() {
        let args = TrainArgs::parse_from(["train", "--resume", ""]);
        let cfg = TrainConfig::merge(args, TrainConfigFile::default());
        assert!(cfg.resume.is_none());
    }

    #[test]
    fn validate_rejects_mismatched_weights() {
        let cfg = TrainConfig {
            class_weights: Some(vec![1.0, 1.0]),
            ..TrainConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<TrainConfigFile>("learning_rate = 0.1").is_err());
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "epochs = 3\nnum_cls = 2\ndevices = [0, 1]\n").unwrap();
        let args = TrainArgs {
            config: Some(path),
            ..TrainArgs::default()
        };
        let cfg = TrainConfig::resolve(args).unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.num_classes, 2);
        assert_eq!(cfg.devices, vec![0, 1]);
    }
}
