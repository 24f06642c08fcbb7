//! Error definitions and the score matrix shared by all metrics.

use std::path::PathBuf;
use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("{what}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("target {target} at row {row} is outside [0, {num_classes})")]
    TargetOutOfRange {
        row: usize,
        target: usize,
        num_classes: usize,
    },
    #[error("invalid score shape: {0}")]
    InvalidShape(String),
    #[error("failed to write plot {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Per-class scores for a full validation pass, one row per sample in
/// traversal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreMatrix {
    num_classes: usize,
    data: Vec<f32>,
}

impl ScoreMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            data: Vec::new(),
        }
    }

    /// Build from a flat row-major buffer.
    pub fn from_rows(num_classes: usize, data: Vec<f32>) -> MetricsResult<Self> {
        let mut matrix = Self::new(num_classes);
        matrix.extend_rows(&data)?;
        Ok(matrix)
    }

    /// Append a batch of rows (flat, row-major). The slice length must be a
    /// multiple of `num_classes`.
    pub fn extend_rows(&mut self, rows: &[f32]) -> MetricsResult<()> {
        if self.num_classes == 0 {
            return Err(MetricsError::InvalidShape(
                "score matrix needs at least one class".to_string(),
            ));
        }
        if rows.len() % self.num_classes != 0 {
            return Err(MetricsError::InvalidShape(format!(
                "{} scores is not a multiple of {} classes",
                rows.len(),
                self.num_classes
            )));
        }
        self.data.extend_from_slice(rows);
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_rows(&self) -> usize {
        if self.num_classes == 0 {
            0
        } else {
            self.data.len() / self.num_classes
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, idx: usize) -> &[f32] {
        let start = idx * self.num_classes;
        &self.data[start..start + self.num_classes]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.num_classes.max(1))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Numerically stable softmax over each row of a flat row-major buffer.
pub fn softmax_rows(logits: &[f32], num_classes: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(logits.len());
    for row in logits.chunks_exact(num_classes.max(1)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = row.iter().map(|v| (v - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        out.extend(exps.into_iter().map(|e| e / sum));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_rows_rejects_ragged_batches() {
        let mut m = ScoreMatrix::new(3);
        assert!(m.extend_rows(&[0.1, 0.2, 0.7, 0.5]).is_err());
        m.extend_rows(&[0.1, 0.2, 0.7, 0.3, 0.3, 0.4]).unwrap();
        assert_eq!(m.num_rows(), 2);
        assert_eq!(m.row(1), &[0.3, 0.3, 0.4]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let probs = softmax_rows(&[1.0, 2.0, 3.0, 1000.0, 0.0, -1000.0], 3);
        for row in probs.chunks_exact(3) {
            let s: f32 = row.iter().sum();
            assert!((s - 1.0).abs() < 1e-5);
        }
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
        assert!((probs[3] - 1.0).abs() < 1e-6);
    }
}
