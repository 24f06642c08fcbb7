use clap::Parser;
use training::logging::init_tracing;
use training::{run_train, TrainArgs, TrainConfig};

fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let cfg = TrainConfig::resolve(TrainArgs::parse())?;
    let summary = run_train(cfg)?;
    tracing::info!(
        best_prec1 = summary.best_prec1,
        epochs_run = summary.epochs_run,
        "done"
    );
    Ok(())
}
