//! Flat image directory + JSON label table as an indexable dataset.

use crate::batch::ClassBatcher;
use crate::labels::{LabelTable, LabelTransform};
use crate::preprocess::{load_item, Preprocess};
use crate::types::{BurnDatasetError, DatasetResult, DecodePolicy, ImageItem, ImageRecord};
use burn::data::dataset::Dataset;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FolderConfig {
    pub image_dir: PathBuf,
    pub labels_path: PathBuf,
    pub num_classes: usize,
    pub label_transform: LabelTransform,
    pub preprocess: Preprocess,
    pub decode_policy: DecodePolicy,
}

impl FolderConfig {
    pub fn new(image_dir: impl Into<PathBuf>, labels_path: impl Into<PathBuf>, num_classes: usize) -> Self {
        Self {
            image_dir: image_dir.into(),
            labels_path: labels_path.into(),
            num_classes,
            label_transform: LabelTransform::identity(),
            preprocess: Preprocess::default(),
            decode_policy: DecodePolicy::Strict,
        }
    }
}

/// Images of one directory in lexicographic filename order, each paired
/// with its class from the label table.
///
/// Every listed file must have a label; that is checked once when the
/// dataset is opened, so indexing never hits a missing key.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    root: PathBuf,
    records: Arc<Vec<ImageRecord>>,
    num_classes: usize,
    preprocess: Preprocess,
    decode_policy: DecodePolicy,
}

impl ImageFolderDataset {
    pub fn open(cfg: &FolderConfig) -> DatasetResult<Self> {
        let table = LabelTable::from_json_path(&cfg.labels_path)?;
        Self::from_table(cfg, &table)
    }

    pub fn from_table(cfg: &FolderConfig, table: &LabelTable) -> DatasetResult<Self> {
        let files = list_image_files(&cfg.image_dir)?;
        if files.is_empty() {
            return Err(BurnDatasetError::EmptyDirectory {
                path: cfg.image_dir.clone(),
            });
        }
        let mut records = Vec::with_capacity(files.len());
        for (image_name, path) in files {
            let raw = table.lookup(&image_name)?;
            let label = cfg.label_transform.apply(raw);
            if label < 0 || label as usize >= cfg.num_classes {
                return Err(BurnDatasetError::LabelOutOfRange {
                    image: image_name,
                    label,
                    num_classes: cfg.num_classes,
                });
            }
            records.push(ImageRecord {
                path,
                image_name,
                label: label as usize,
            });
        }
        tracing::debug!(
            dir = %cfg.image_dir.display(),
            images = records.len(),
            transform = cfg.label_transform.name(),
            "indexed image folder"
        );
        Ok(Self {
            root: cfg.image_dir.clone(),
            records: Arc::new(records),
            num_classes: cfg.num_classes,
            preprocess: cfg.preprocess.clone(),
            decode_policy: cfg.decode_policy,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> DatasetResult<&ImageRecord> {
        self.records.get(index).ok_or(BurnDatasetError::OutOfRange {
            index,
            len: self.records.len(),
        })
    }

    /// Per-class sample counts.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes];
        for r in self.records.iter() {
            counts[r.label] += 1;
        }
        counts
    }

    /// Decoded sample at `index`; indices past the end are an error.
    pub fn try_get(&self, index: usize) -> DatasetResult<ImageItem> {
        let record = self.record(index)?;
        load_item(record, &self.preprocess, self.decode_policy)
    }

    /// Decoded sample at `index % len`.
    ///
    /// Out-of-range indices alias earlier samples instead of failing; only
    /// meant for endless sampling loops.
    pub fn get_wrapped(&self, index: usize) -> DatasetResult<ImageItem> {
        self.try_get(index % self.records.len().max(1))
    }

    /// Batcher sharing this dataset's preprocessing and decode policy.
    pub fn batcher(&self, workers: usize) -> ClassBatcher {
        ClassBatcher::new(self.preprocess.clone(), self.decode_policy, workers)
    }
}

impl Dataset<ImageRecord> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageRecord> {
        self.records.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Regular, non-hidden files whose name has an extension, sorted by name.
fn list_image_files(dir: &Path) -> DatasetResult<Vec<(String, PathBuf)>> {
    let io_err = |source: std::io::Error| BurnDatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 filename");
            continue;
        };
        if name.starts_with('.') || !name.contains('.') {
            continue;
        }
        files.push((name.to_string(), path.clone()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
