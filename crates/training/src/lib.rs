#![recursion_limit = "256"]

pub mod checkpoint;
pub mod config;
pub mod device;
pub mod hard_negative;
pub mod logging;
pub mod report;
pub mod schedule;
pub mod trainer;

pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointError, CheckpointMeta, RecordPrecision};
pub use config::{BackendKind, TrainArgs, TrainConfig};
pub use device::DevicePool;
pub use hard_negative::{export_hard_negatives, ExportSummary};
pub use models::{ArchKind, ResNet, ResNetConfig, ScoreModel};
pub use schedule::MultiStepLr;
pub use trainer::{run_train, RunSummary, ValidationReport};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

/// Autodiff wrapper used for the training phase.
pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
