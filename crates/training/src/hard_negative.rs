//! Copies misclassified or low-confidence validation images out for review.

use eval_metrics::HardNegative;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub dir: PathBuf,
    pub copied: usize,
    pub failed: usize,
}

/// `<running_index>_<target>_<predicted>.<original extension>`, 1-based index.
pub fn export_name(position: usize, record: &HardNegative) -> String {
    let ext = record
        .image_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("");
    format!("{}_{}.{}", position + 1, record.code(), ext)
}

/// Copy every hard negative from `source_dir` into `out_dir`.
///
/// Best effort: a failed copy is logged and counted, never fatal. The
/// directory is created even when there is nothing to copy.
pub fn export_hard_negatives(
    records: &[HardNegative],
    source_dir: &Path,
    out_dir: &Path,
) -> ExportSummary {
    let mut summary = ExportSummary {
        dir: out_dir.to_path_buf(),
        ..ExportSummary::default()
    };
    if let Err(err) = fs::create_dir_all(out_dir) {
        tracing::warn!(dir = %out_dir.display(), %err, "cannot create hard-negative directory");
        summary.failed = records.len();
        return summary;
    }

    let bar = ProgressBar::new(records.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("hard negatives [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>6}/{len:6}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }

    for (i, record) in records.iter().enumerate() {
        let src = source_dir.join(&record.image_name);
        let dst = out_dir.join(export_name(i, record));
        match fs::copy(&src, &dst) {
            Ok(_) => summary.copied += 1,
            Err(err) => {
                summary.failed += 1;
                tracing::warn!(
                    src = %src.display(),
                    dst = %dst.display(),
                    %err,
                    "failed to copy hard negative"
                );
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    summary
}
