//! Model checkpoints: a Burn record file plus a JSON bookkeeping sidecar.
//!
//! A checkpoint at stem `dir/name` is `dir/name.bin` (module record) and
//! `dir/name.json` ([`CheckpointMeta`]). Both must exist to load.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings, HalfPrecisionSettings};
use burn::tensor::backend::Backend;
use models::{ArchKind, ResNet, ResNetConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPrecision {
    #[default]
    Full,
    Half,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub arch: ArchKind,
    /// Epoch to resume from.
    pub epoch: usize,
    pub best_prec1: f64,
    pub num_classes: usize,
    #[serde(default)]
    pub precision: RecordPrecision,
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint found at {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("checkpoint io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint metadata error at {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint record error at {}: {message}", .path.display())]
    Recorder { path: PathBuf, message: String },
}

/// Accepts `name`, `name.bin` or `name.json` and returns the shared stem.
pub fn checkpoint_stem(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some("bin") | Some("json") => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

fn meta_path(stem: &Path) -> PathBuf {
    stem.with_extension("json")
}

fn record_path(stem: &Path) -> PathBuf {
    stem.with_extension("bin")
}

pub fn save_checkpoint<B: Backend>(
    model: &ResNet<B>,
    stem: &Path,
    meta: &CheckpointMeta,
) -> Result<(), CheckpointError> {
    if let Some(parent) = stem.parent() {
        fs::create_dir_all(parent).map_err(|source| CheckpointError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let recorder_err = |e: burn::record::RecorderError| CheckpointError::Recorder {
        path: record_path(stem),
        message: e.to_string(),
    };
    match meta.precision {
        RecordPrecision::Full => model
            .clone()
            .save_file(stem, &BinFileRecorder::<FullPrecisionSettings>::new())
            .map_err(recorder_err)?,
        RecordPrecision::Half => model
            .clone()
            .save_file(stem, &BinFileRecorder::<HalfPrecisionSettings>::new())
            .map_err(recorder_err)?,
    }
    let path = meta_path(stem);
    let json = serde_json::to_vec_pretty(meta).map_err(|source| CheckpointError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| CheckpointError::Io { path, source })?;
    Ok(())
}

pub fn load_meta(stem: &Path) -> Result<CheckpointMeta, CheckpointError> {
    let path = meta_path(stem);
    let raw = fs::read(&path).map_err(|source| CheckpointError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| CheckpointError::Json { path, source })
}

/// Rebuild the network described by the sidecar and load its weights.
pub fn load_checkpoint<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(ResNet<B>, CheckpointMeta), CheckpointError> {
    let stem = checkpoint_stem(path);
    if !record_path(&stem).is_file() || !meta_path(&stem).is_file() {
        return Err(CheckpointError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let meta = load_meta(&stem)?;
    let model = ResNetConfig::new(meta.arch, meta.num_classes).init::<B>(device);
    let recorder_err = |e: burn::record::RecorderError| CheckpointError::Recorder {
        path: record_path(&stem),
        message: e.to_string(),
    };
    let model = match meta.precision {
        RecordPrecision::Full => model
            .load_file(
                &stem,
                &BinFileRecorder::<FullPrecisionSettings>::new(),
                device,
            )
            .map_err(recorder_err)?,
        RecordPrecision::Half => model
            .load_file(
                &stem,
                &BinFileRecorder::<HalfPrecisionSettings>::new(),
                device,
            )
            .map_err(recorder_err)?,
    };
    Ok((model, meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_known_extensions_only() {
        assert_eq!(checkpoint_stem(Path::new("r/model.bin")), PathBuf::from("r/model"));
        assert_eq!(checkpoint_stem(Path::new("r/model.json")), PathBuf::from("r/model"));
        assert_eq!(checkpoint_stem(Path::new("r/model")), PathBuf::from("r/model"));
        assert_eq!(checkpoint_stem(Path::new("r/model.th")), PathBuf::from("r/model.th"));
    }

    #[test]
    fn meta_defaults_to_full_precision() {
        let meta: CheckpointMeta = serde_json::from_str(
            r#"{"arch":"resnet20","epoch":11,"best_prec1":71.5,"num_classes":4}"#,
        )
        .unwrap();
        assert_eq!(meta.arch, ArchKind::Resnet20);
        assert_eq!(meta.precision, RecordPrecision::Full);
    }
}
