use anyhow::{bail, Context};
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use burn_dataset::{ClassBatch, FolderConfig, ImageFolderDataset, ImageRecord};
use eval_metrics::{
    per_class_roc, precision_recall, top1_correct, ClassRoc, PrecisionRecall, RunningStat,
    ScoreMatrix,
};
use models::{ResNet, ResNetConfig, ScoreModel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::checkpoint::{load_checkpoint, save_checkpoint, CheckpointError, CheckpointMeta, RecordPrecision};
use crate::config::{BackendKind, DataPaths, TrainConfig};
use crate::device::DevicePool;
use crate::hard_negative::{export_hard_negatives, ExportSummary};
use crate::report::{
    append_history, export_roc, format_auc, format_precision, format_recall, hard_negative_dir,
    EpochRecord,
};
use crate::schedule::MultiStepLr;
use crate::{ADBackend, TrainBackend};

type Loader<B> = Arc<dyn DataLoader<B, ClassBatch<B>>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct EpochStats {
    pub loss: f64,
    pub top1: f64,
    pub samples: usize,
    pub skipped: usize,
}

/// Everything one validation pass produced.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub epoch_label: usize,
    pub loss: f64,
    /// Percent.
    pub top1: f64,
    pub samples: usize,
    pub skipped: usize,
    pub metrics: PrecisionRecall,
    pub rocs: Vec<ClassRoc>,
    pub roc_image: Option<PathBuf>,
    pub export: ExportSummary,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub start_epoch: usize,
    pub epochs_run: usize,
    pub best_prec1: f64,
    pub last_validation: Option<ValidationReport>,
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

fn open_dataset(cfg: &TrainConfig, paths: &DataPaths) -> anyhow::Result<ImageFolderDataset> {
    let folder = FolderConfig {
        image_dir: paths.image_dir.clone(),
        labels_path: paths.labels.clone(),
        num_classes: cfg.num_classes,
        label_transform: cfg.label_transform.clone(),
        preprocess: cfg.preprocess.clone(),
        decode_policy: cfg.decode_policy,
    };
    let ds = ImageFolderDataset::open(&folder)
        .with_context(|| format!("opening dataset {}", paths.image_dir.display()))?;
    tracing::info!(
        dir = %paths.image_dir.display(),
        images = ds.len(),
        per_class = ?ds.class_counts(),
        "dataset ready"
    );
    Ok(ds)
}

fn build_loader<B: Backend>(
    ds: &ImageFolderDataset,
    cfg: &TrainConfig,
    device: &B::Device,
    shuffle: bool,
) -> Loader<B> {
    let mut builder = DataLoaderBuilder::<B, ImageRecord, ClassBatch<B>>::new(ds.batcher(cfg.workers))
        .batch_size(cfg.batch_size)
        .set_device(device.clone());
    if shuffle {
        builder = builder.shuffle(cfg.seed);
    }
    builder.build(ds.clone())
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

fn to_host<B: Backend>(t: Tensor<B, 2>) -> anyhow::Result<Vec<f32>> {
    t.into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("reading scores back from device: {e:?}"))
}

fn batch_count(items: usize, batch_size: usize) -> usize {
    items.div_ceil(batch_size.max(1))
}

/// Run one training epoch and return the updated model.
pub fn train_epoch(
    mut model: ResNet<ADBackend>,
    optim: &mut impl Optimizer<ResNet<ADBackend>, ADBackend>,
    loader: &Loader<ADBackend>,
    loss_fn: &CrossEntropyLoss<ADBackend>,
    cfg: &TrainConfig,
    epoch: usize,
    lr: f64,
) -> anyhow::Result<(ResNet<ADBackend>, EpochStats)> {
    let mut batch_time = RunningStat::new();
    let mut data_time = RunningStat::new();
    let mut losses = RunningStat::new();
    let mut top1 = RunningStat::new();
    let mut samples = 0usize;
    let mut skipped = 0usize;
    let total = batch_count(loader.num_items(), cfg.batch_size);

    let mut end = Instant::now();
    for (i, batch) in loader.iter().enumerate() {
        data_time.update_one(end.elapsed().as_secs_f64());
        skipped += batch.skipped.len();
        let Some(inputs) = batch.inputs else {
            end = Instant::now();
            continue;
        };
        let n = batch.labels.len();

        let logits = model.forward_scores(inputs.images);
        let loss = loss_fn.forward(logits.clone(), inputs.targets);
        let loss_val = scalar(loss.clone().detach());
        let scores = to_host(logits.detach())?;
        let correct = top1_correct(&scores, cfg.num_classes, &batch.labels);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);

        losses.update(loss_val, n as f64);
        top1.update(100.0 * correct as f64 / n as f64, n as f64);
        samples += n;
        batch_time.update_one(end.elapsed().as_secs_f64());
        end = Instant::now();

        if i % cfg.print_freq() == 0 {
            tracing::info!(
                "Epoch: [{epoch}][{i}/{total}]\tTime {:.3} ({:.3})\tData {:.3} ({:.3})\tLoss {:.4} ({:.4})\tPrec@1 {:.3} ({:.3})",
                batch_time.val(),
                batch_time.avg_or_zero(),
                data_time.val(),
                data_time.avg_or_zero(),
                losses.val(),
                losses.avg_or_zero(),
                top1.val(),
                top1.avg_or_zero(),
            );
        }
    }
    if skipped > 0 {
        tracing::warn!(epoch, skipped, "training samples skipped this epoch");
    }

    Ok((
        model,
        EpochStats {
            loss: losses.avg_or_zero(),
            top1: top1.avg_or_zero(),
            samples,
            skipped,
        },
    ))
}

/// One gradient-free pass over the validation loader, followed by gated
/// precision/recall, ROC export and hard-negative export under `epoch_label`.
pub fn validate(
    model: &ResNet<TrainBackend>,
    loader: &Loader<TrainBackend>,
    source_dir: &Path,
    cfg: &TrainConfig,
    epoch_label: usize,
    device: &<TrainBackend as Backend>::Device,
) -> anyhow::Result<ValidationReport> {
    let loss_fn = CrossEntropyLossConfig::new()
        .with_weights(cfg.class_weights.clone())
        .init::<TrainBackend>(device);
    let mut batch_time = RunningStat::new();
    let mut losses = RunningStat::new();
    let mut top1 = RunningStat::new();
    let mut scores = ScoreMatrix::new(cfg.num_classes);
    let mut targets: Vec<usize> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut skipped = 0usize;
    let total = batch_count(loader.num_items(), cfg.batch_size);

    let mut end = Instant::now();
    for (i, batch) in loader.iter().enumerate() {
        skipped += batch.skipped.len();
        let Some(inputs) = batch.inputs else {
            end = Instant::now();
            continue;
        };
        let n = batch.labels.len();

        let logits = model.forward_scores(inputs.images);
        let loss_val = scalar(loss_fn.forward(logits.clone(), inputs.targets));
        let probs = to_host(softmax(logits, 1))?;
        let correct = top1_correct(&probs, cfg.num_classes, &batch.labels);

        scores.extend_rows(&probs)?;
        targets.extend_from_slice(&batch.labels);
        names.extend(batch.image_names);

        losses.update(loss_val, n as f64);
        top1.update(100.0 * correct as f64 / n as f64, n as f64);
        batch_time.update_one(end.elapsed().as_secs_f64());
        end = Instant::now();

        if i % cfg.print_freq() == 0 {
            tracing::info!(
                "Test: [{i}/{total}]\tTime {:.3} ({:.3})\tLoss {:.4} ({:.4})\tPrec@1 {:.3} ({:.3})",
                batch_time.val(),
                batch_time.avg_or_zero(),
                losses.val(),
                losses.avg_or_zero(),
                top1.val(),
                top1.avg_or_zero(),
            );
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "validation samples skipped");
    }
    tracing::info!(" * Prec@1 {:.3}", top1.avg_or_zero());

    let metrics = precision_recall(&scores, &targets, &names, cfg.threshold)?;
    let rocs = per_class_roc(&scores, &targets)?;
    let arch_dir = cfg.arch_dir();
    let roc_image = export_roc(&rocs, &arch_dir, epoch_label);
    let export = export_hard_negatives(
        &metrics.hard_negatives,
        source_dir,
        &hard_negative_dir(&arch_dir, epoch_label),
    );

    tracing::info!(
        "Precision:{}\tRecall:{}\tAUC:{}\thard_negative num:{}",
        format_precision(&metrics),
        format_recall(&metrics),
        format_auc(&rocs),
        metrics.hard_negatives.len()
    );
    if export.failed > 0 {
        tracing::warn!(
            failed = export.failed,
            dir = %export.dir.display(),
            "some hard negatives were not exported"
        );
    }

    Ok(ValidationReport {
        epoch_label,
        loss: losses.avg_or_zero(),
        top1: top1.avg_or_zero(),
        samples: targets.len(),
        skipped,
        metrics,
        rocs,
        roc_image,
        export,
    })
}

fn sgd(cfg: &TrainConfig) -> SgdConfig {
    let momentum = (cfg.momentum > 0.0).then(|| {
        MomentumConfig::new()
            .with_momentum(cfg.momentum)
            .with_dampening(0.0)
    });
    let decay = (cfg.weight_decay > 0.0).then(|| WeightDecayConfig::new(cfg.weight_decay));
    SgdConfig::new()
        .with_momentum(momentum)
        .with_weight_decay(decay)
}

/// Checkpoint writes are best effort: a failure is logged and training goes on.
fn write_checkpoints(
    model: &ResNet<ADBackend>,
    cfg: &TrainConfig,
    epoch: usize,
    best_prec1: f64,
    is_best: bool,
) {
    let arch_dir = cfg.arch_dir();
    let meta = CheckpointMeta {
        arch: cfg.arch,
        epoch: epoch + 1,
        best_prec1,
        num_classes: cfg.num_classes,
        precision: if cfg.half {
            RecordPrecision::Half
        } else {
            RecordPrecision::Full
        },
    };
    let mut stems = vec!["model"];
    if epoch > 0 && epoch % cfg.save_every == 0 {
        stems.push("checkpoint");
    }
    if is_best {
        stems.push("model_best");
    }
    for stem in stems {
        let path = arch_dir.join(stem);
        match save_checkpoint(model, &path, &meta) {
            Ok(()) => tracing::debug!(path = %path.display(), "saved checkpoint"),
            Err(err) => tracing::warn!(%err, "checkpoint not written"),
        }
    }
}

/// Drive the full run: resume, then train/validate/checkpoint per epoch, or a
/// single validation pass when `cfg.evaluate` is set.
pub fn run_train(cfg: TrainConfig) -> anyhow::Result<RunSummary> {
    validate_backend_choice(cfg.backend)?;
    let pool = DevicePool::from_ordinals(&cfg.devices)?;
    pool.log_layout();
    let device = pool.primary().clone();

    let arch_dir = cfg.arch_dir();
    std::fs::create_dir_all(&arch_dir)
        .with_context(|| format!("creating output directory {}", arch_dir.display()))?;
    tracing::info!(arch = %cfg.arch, preprocess = %cfg.preprocess.describe(), "run configuration");

    let mut model = ResNetConfig::new(cfg.arch, cfg.num_classes).init::<ADBackend>(&device);
    let mut start_epoch = cfg.start_epoch;
    let mut best_prec1 = 0.0f64;
    if let Some(path) = &cfg.resume {
        tracing::info!("=> loading checkpoint '{}'", path.display());
        match load_checkpoint::<ADBackend>(path, &device) {
            Ok((loaded, meta)) => {
                if meta.arch != cfg.arch || meta.num_classes != cfg.num_classes {
                    bail!(
                        "checkpoint {} holds {} with {} classes, run is configured for {} with {}",
                        path.display(),
                        meta.arch,
                        meta.num_classes,
                        cfg.arch,
                        cfg.num_classes
                    );
                }
                model = loaded;
                start_epoch = meta.epoch;
                best_prec1 = meta.best_prec1;
                tracing::info!(
                    "=> loaded checkpoint '{}' (epoch {}, best prec@1 {:.3})",
                    path.display(),
                    meta.epoch,
                    meta.best_prec1
                );
            }
            Err(CheckpointError::NotFound { path }) => {
                tracing::warn!("=> no checkpoint found at '{}'; starting from scratch", path.display());
            }
            Err(err) => return Err(err).context("loading checkpoint"),
        }
    }

    let val_ds = open_dataset(&cfg, &cfg.val)?;
    let val_loader = build_loader::<TrainBackend>(&val_ds, &cfg, &device, false);

    if cfg.evaluate {
        let report = validate(
            &model.valid(),
            &val_loader,
            val_ds.root(),
            &cfg,
            start_epoch,
            &device,
        )?;
        return Ok(RunSummary {
            start_epoch,
            epochs_run: 0,
            best_prec1: best_prec1.max(report.top1),
            last_validation: Some(report),
        });
    }

    let train_ds = open_dataset(&cfg, &cfg.train)?;
    let train_loader = build_loader::<ADBackend>(&train_ds, &cfg, &device, true);
    let loss_fn = CrossEntropyLossConfig::new()
        .with_weights(cfg.class_weights.clone())
        .init::<ADBackend>(&device);
    let mut optim = sgd(&cfg).init::<ADBackend, ResNet<ADBackend>>();
    let schedule = if cfg.lr_milestones.is_empty() {
        MultiStepLr::for_epochs(cfg.lr, cfg.epochs, cfg.lr_gamma)
    } else {
        MultiStepLr::new(cfg.lr, cfg.lr_milestones.clone(), cfg.lr_gamma)
    };
    if start_epoch >= cfg.epochs {
        tracing::warn!(start_epoch, epochs = cfg.epochs, "nothing to train: start epoch is past the end");
    }

    let history = arch_dir.join("history.csv");
    let mut last_validation = None;
    let mut epochs_run = 0;
    for epoch in start_epoch..cfg.epochs {
        let lr = schedule.lr_for(epoch, cfg.arch);
        tracing::info!("current lr {lr:.5e}");
        let (next, train_stats) =
            train_epoch(model, &mut optim, &train_loader, &loss_fn, &cfg, epoch, lr)?;
        model = next;

        let report = validate(
            &model.valid(),
            &val_loader,
            val_ds.root(),
            &cfg,
            epoch + 1,
            &device,
        )?;
        let prec1 = report.top1;
        let is_best = prec1 > best_prec1;
        best_prec1 = best_prec1.max(prec1);
        write_checkpoints(&model, &cfg, epoch, best_prec1, is_best);

        let record = EpochRecord {
            epoch: epoch + 1,
            lr,
            train_loss: train_stats.loss,
            train_top1: train_stats.top1,
            val_loss: report.loss,
            val_top1: report.top1,
            hard_negatives: report.metrics.hard_negatives.len(),
            skipped: train_stats.skipped + report.skipped,
        };
        if let Err(err) = append_history(&history, &record) {
            tracing::warn!(path = %history.display(), %err, "failed to append training history");
        }
        epochs_run += 1;
        last_validation = Some(report);
    }

    tracing::info!(best_prec1, epochs_run, "training finished");
    Ok(RunSummary {
        start_epoch,
        epochs_run,
        best_prec1,
        last_validation,
    })
}
