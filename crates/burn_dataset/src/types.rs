//! Core types, error definitions, and data structures for burn_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, BurnDatasetError>;

#[derive(Debug, Error)]
pub enum BurnDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no label entry for image {image}")]
    MissingLabel { image: String },
    #[error("label {label} for image {image} is outside [0, {num_classes})")]
    LabelOutOfRange {
        image: String,
        label: i64,
        num_classes: usize,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("index {index} out of range for dataset of {len} images")]
    OutOfRange { index: usize, len: usize },
    #[error("no image files found in {path}")]
    EmptyDirectory { path: PathBuf },
}

/// Listing entry for one image: where it lives and its resolved class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub path: PathBuf,
    /// Base filename, the key into the label table.
    pub image_name: String,
    pub label: usize,
}

/// A decoded, preprocessed sample.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub image_name: String,
    pub label: usize,
    /// Image in CHW layout, normalized per channel.
    pub pixels: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

/// A sample dropped from a batch, kept so callers can count and report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSample {
    pub image_name: String,
    pub reason: String,
}

/// How undecodable images are handled while batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Any decode failure drops the whole batch it belongs to.
    #[default]
    Strict,
    /// Lift decoder size limits and drop only the failing samples.
    Lenient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_offending_input() {
        let err = BurnDatasetError::OutOfRange { index: 7, len: 3 };
        assert_eq!(err.to_string(), "index 7 out of range for dataset of 3 images");
        let err = BurnDatasetError::EmptyDirectory {
            path: PathBuf::from("data/testSet"),
        };
        assert_eq!(err.to_string(), "no image files found in data/testSet");
    }
}
