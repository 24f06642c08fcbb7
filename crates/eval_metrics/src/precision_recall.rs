//! Per-class precision/recall gated by a confidence threshold.
//!
//! A sample is a hit only when its top class is the target *and* the top
//! score is strictly greater than the threshold. Every other sample is a
//! hard negative and is reported for manual review.

use crate::accuracy::argmax;
use crate::types::{MetricsError, MetricsResult, ScoreMatrix};
use serde::Serialize;

/// Sentinel for a precision/recall whose denominator is zero.
pub const UNDEFINED: f64 = -1.0;

/// A validation sample that missed the gate or was misclassified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardNegative {
    pub image_name: String,
    pub target: usize,
    pub predicted: usize,
    pub confidence: f32,
}

impl HardNegative {
    /// `"<target>_<predicted>"`, used in exported filenames.
    pub fn code(&self) -> String {
        format!("{}_{}", self.target, self.predicted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrecisionRecall {
    /// `hits[c] / predicted_counts[c]`, or [`UNDEFINED`].
    pub precision: Vec<f64>,
    /// `hits[c] / target_counts[c]`, or [`UNDEFINED`].
    pub recall: Vec<f64>,
    pub hits: Vec<usize>,
    pub predicted_counts: Vec<usize>,
    pub target_counts: Vec<usize>,
    /// In traversal order.
    pub hard_negatives: Vec<HardNegative>,
}

impl PrecisionRecall {
    pub fn num_samples(&self) -> usize {
        self.target_counts.iter().sum()
    }

    pub fn total_hits(&self) -> usize {
        self.hits.iter().sum()
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        UNDEFINED
    } else {
        num as f64 / denom as f64
    }
}

/// Compute gated precision/recall over a full validation pass.
///
/// `scores` should hold softmax-normalised rows; `targets` and `names` are
/// parallel to its rows.
pub fn precision_recall(
    scores: &ScoreMatrix,
    targets: &[usize],
    names: &[String],
    threshold: f32,
) -> MetricsResult<PrecisionRecall> {
    let rows = scores.num_rows();
    if targets.len() != rows {
        return Err(MetricsError::LengthMismatch {
            what: "targets",
            expected: rows,
            actual: targets.len(),
        });
    }
    if names.len() != rows {
        return Err(MetricsError::LengthMismatch {
            what: "image names",
            expected: rows,
            actual: names.len(),
        });
    }
    let num_classes = scores.num_classes();

    let mut hits = vec![0usize; num_classes];
    let mut predicted_counts = vec![0usize; num_classes];
    let mut target_counts = vec![0usize; num_classes];
    let mut hard_negatives = Vec::new();

    for (row_idx, ((row, &target), name)) in scores.rows().zip(targets).zip(names).enumerate() {
        if target >= num_classes {
            return Err(MetricsError::TargetOutOfRange {
                row: row_idx,
                target,
                num_classes,
            });
        }
        let (predicted, confidence) = argmax(row);
        predicted_counts[predicted] += 1;
        target_counts[target] += 1;

        // NaN confidence compares false, so it lands on the hard-negative side.
        if confidence > threshold && predicted == target {
            hits[target] += 1;
        } else {
            hard_negatives.push(HardNegative {
                image_name: name.clone(),
                target,
                predicted,
                confidence,
            });
        }
    }

    for c in 0..num_classes {
        if predicted_counts[c] == 0 || target_counts[c] == 0 {
            tracing::debug!(
                class = c,
                predicted = predicted_counts[c],
                targets = target_counts[c],
                "class has an empty denominator; reporting undefined rate"
            );
        }
    }

    let precision = (0..num_classes)
        .map(|c| ratio(hits[c], predicted_counts[c]))
        .collect();
    let recall = (0..num_classes)
        .map(|c| ratio(hits[c], target_counts[c]))
        .collect();

    Ok(PrecisionRecall {
        precision,
        recall,
        hits,
        predicted_counts,
        target_counts,
        hard_negatives,
    })
}
