//! Image-folder classification datasets and Burn batching.
//!
//! This crate provides utilities for:
//! - Reading a flat image directory with a JSON filename → label table
//! - Caller-supplied label transforms
//! - Deterministic pad / resize / center-crop / normalize preprocessing
//! - Parallel, order-preserving batch assembly for Burn data loaders

// Module declarations
pub mod batch;
pub mod folder;
pub mod labels;
pub mod preprocess;
pub mod types;

// Re-export public API
pub use batch::{BatchInputs, ClassBatch, ClassBatcher};
pub use folder::{FolderConfig, ImageFolderDataset};
pub use labels::{LabelTable, LabelTransform};
pub use preprocess::{decode_rgb, load_item, Preprocess, IMAGENET_MEAN, IMAGENET_STD};
pub use types::*;
