//! Filename → class label tables and per-deployment label transforms.

use crate::types::{BurnDatasetError, DatasetResult};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Labels keyed by base image filename, loaded from a JSON object such as
/// `{"0001.png": 2, "0002.png": 0}`.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    entries: HashMap<String, i64>,
}

impl LabelTable {
    pub fn from_json_path(path: &Path) -> DatasetResult<Self> {
        let raw = fs::read(path).map_err(|source| BurnDatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: HashMap<String, i64> =
            serde_json::from_slice(&raw).map_err(|source| BurnDatasetError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { entries })
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, image_name: &str) -> Option<i64> {
        self.entries.get(image_name).copied()
    }

    /// Raw label for `image_name`, or `MissingLabel`.
    pub fn lookup(&self, image_name: &str) -> DatasetResult<i64> {
        self.get(image_name)
            .ok_or_else(|| BurnDatasetError::MissingLabel {
                image: image_name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps raw table labels to training class ids.
#[derive(Clone)]
pub struct LabelTransform {
    name: String,
    f: Arc<dyn Fn(i64) -> i64 + Send + Sync>,
}

impl LabelTransform {
    pub fn new(name: impl Into<String>, f: impl Fn(i64) -> i64 + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn identity() -> Self {
        Self::new("identity", |label| label)
    }

    /// Close a gap in the class ids: every label `>= threshold` moves down by one.
    pub fn compact_above(threshold: i64) -> Self {
        Self::new(format!("compact_above({threshold})"), move |label| {
            if label >= threshold {
                label - 1
            } else {
                label
            }
        })
    }

    pub fn apply(&self, label: i64) -> i64 {
        (self.f)(label)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for LabelTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for LabelTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LabelTransform").field(&self.name).finish()
    }
}
