//! Per-epoch reporting: ROC images, history CSV, summary formatting.

use eval_metrics::{render_roc_png, ClassRoc, PlotConfig, PrecisionRecall, UNDEFINED};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `<arch_dir>/roc/roc_<epoch>.png`
pub fn roc_path(arch_dir: &Path, epoch_label: usize) -> PathBuf {
    arch_dir.join("roc").join(format!("roc_{epoch_label}.png"))
}

/// `<arch_dir>/hard_negative/<epoch>`
pub fn hard_negative_dir(arch_dir: &Path, epoch_label: usize) -> PathBuf {
    arch_dir.join("hard_negative").join(epoch_label.to_string())
}

/// Render the ROC overlay; failures are logged, not returned.
pub fn export_roc(curves: &[ClassRoc], arch_dir: &Path, epoch_label: usize) -> Option<PathBuf> {
    for roc in curves.iter().filter(|r| r.curve.is_none()) {
        tracing::warn!(
            class = roc.class,
            "ROC undefined: class has no positive or no negative validation samples"
        );
    }
    let path = roc_path(arch_dir, epoch_label);
    match render_roc_png(curves, &path, &PlotConfig::default()) {
        Ok(()) => Some(path),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to write ROC image");
            None
        }
    }
}

fn fmt_rates(values: &[f64]) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| {
            if *v == UNDEFINED {
                "-1".to_string()
            } else {
                format!("{v:.3}")
            }
        })
        .collect();
    format!("[{}]", parts.join(", "))
}

pub fn format_precision(pr: &PrecisionRecall) -> String {
    fmt_rates(&pr.precision)
}

pub fn format_recall(pr: &PrecisionRecall) -> String {
    fmt_rates(&pr.recall)
}

pub fn format_auc(curves: &[ClassRoc]) -> String {
    let parts: Vec<String> = curves
        .iter()
        .map(|r| match &r.curve {
            Some(c) => format!("{}:{:.3}", r.class, c.auc()),
            None => format!("{}:n/a", r.class),
        })
        .collect();
    parts.join(" ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochRecord {
    /// 1-based.
    pub epoch: usize,
    pub lr: f64,
    pub train_loss: f64,
    pub train_top1: f64,
    pub val_loss: f64,
    pub val_top1: f64,
    pub hard_negatives: usize,
    pub skipped: usize,
}

pub const HISTORY_HEADER: &str =
    "epoch,lr,train_loss,train_top1,val_loss,val_top1,hard_negatives,skipped";

/// Append one row to `<arch_dir>/history.csv`, writing the header for a new file.
/// Resumed runs keep extending the same file.
pub fn append_history(path: &Path, record: &EpochRecord) -> std::io::Result<()> {
    let fresh = !path.exists();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if fresh {
        writeln!(file, "{HISTORY_HEADER}")?;
    }
    writeln!(
        file,
        "{},{:.6e},{:.6},{:.4},{:.6},{:.4},{},{}",
        record.epoch,
        record.lr,
        record.train_loss,
        record.train_top1,
        record.val_loss,
        record.val_top1,
        record.hard_negatives,
        record.skipped
    )?;
    Ok(())
}
