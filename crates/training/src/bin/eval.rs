//! Single validation pass: precision/recall, ROC and hard negatives for a checkpoint.

use clap::Parser;
use training::logging::init_tracing;
use training::{run_train, TrainArgs, TrainConfig};

fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let mut args = TrainArgs::parse();
    args.evaluate = true;
    let cfg = TrainConfig::resolve(args)?;
    if cfg.resume.is_none() {
        tracing::warn!("no --resume checkpoint given; evaluating a freshly initialised model");
    }
    let summary = run_train(cfg)?;
    if let Some(report) = summary.last_validation {
        tracing::info!(
            top1 = report.top1,
            samples = report.samples,
            hard_negatives = report.metrics.hard_negatives.len(),
            exported = report.export.copied,
            "evaluation complete"
        );
    }
    Ok(())
}
