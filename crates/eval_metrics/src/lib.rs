//! Validation metrics for multi-class image classifiers.
//!
//! This crate is framework-free: everything operates on row-major `f32`
//! score buffers so the trainer can pull scores off any backend and feed
//! them here.
//! - `RunningStat`: streaming weighted mean for per-epoch loss/accuracy/timings.
//! - `top1_accuracy`: percentage of rows whose argmax equals the label.
//! - `precision_recall`: per-class precision/recall gated by a confidence
//!   threshold, collecting hard negatives along the way.
//! - `per_class_roc` / `render_roc_png`: one-vs-rest ROC curves and a PNG plot.

pub mod accuracy;
pub mod plot;
pub mod precision_recall;
pub mod roc;
pub mod running;
pub mod types;

pub use accuracy::{argmax, top1_accuracy, top1_correct};
pub use plot::{render_roc_png, PlotConfig};
pub use precision_recall::{precision_recall, HardNegative, PrecisionRecall, UNDEFINED};
pub use roc::{per_class_roc, roc_curve, ClassRoc, RocCurve};
pub use running::RunningStat;
pub use types::{softmax_rows, MetricsError, MetricsResult, ScoreMatrix};
