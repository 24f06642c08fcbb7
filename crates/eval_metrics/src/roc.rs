//! One-vs-rest ROC curves.
//!
//! The ranking score for every sample is its softmax score for its *true*
//! class; class `c` treats samples whose target is `c` as positives.

use crate::types::{MetricsError, MetricsResult, ScoreMatrix};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Decreasing; the first entry is `+inf` for the (0, 0) point.
    pub thresholds: Vec<f32>,
}

impl RocCurve {
    /// Area under the curve (trapezoidal rule).
    pub fn auc(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) * 0.5)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.fpr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fpr.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRoc {
    pub class: usize,
    /// `None` when the class has no positives or no negatives.
    pub curve: Option<RocCurve>,
}

/// Sweep thresholds over `scores` (descending) and return FPR/TPR pairs.
///
/// One point is kept per distinct score; collinear intermediate points are
/// dropped. Returns `None` if either class of the binary problem is empty,
/// since one of the rates is then undefined.
pub fn roc_curve(scores: &[f32], positives: &[bool]) -> Option<RocCurve> {
    debug_assert_eq!(scores.len(), positives.len());
    let n = scores.len().min(positives.len());
    if n == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    // Stable sort keeps input order among equal scores.
    order.sort_by(|&a, &b| descending_nan_last(scores[a], scores[b]));

    let mut tps = Vec::new();
    let mut fps = Vec::new();
    let mut thresholds = Vec::new();
    let mut tp = 0usize;
    for (rank, &idx) in order.iter().enumerate() {
        if positives[idx] {
            tp += 1;
        }
        let last = rank + 1 == n;
        if last || !same_score(scores[order[rank + 1]], scores[idx]) {
            tps.push(tp);
            fps.push(rank + 1 - tp);
            thresholds.push(scores[idx]);
        }
    }

    let total_pos = *tps.last()?;
    let total_neg = *fps.last()?;
    if total_pos == 0 || total_neg == 0 {
        return None;
    }

    let keep = keep_mask(&tps, &fps);
    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f32::INFINITY],
    };
    for i in (0..tps.len()).filter(|&i| keep[i]) {
        curve.fpr.push(fps[i] as f64 / total_neg as f64);
        curve.tpr.push(tps[i] as f64 / total_pos as f64);
        curve.thresholds.push(thresholds[i]);
    }
    Some(curve)
}

/// Total order: larger scores first, NaN after every number.
fn descending_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.total_cmp(&a),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    }
}

/// NaN scores share one threshold.
fn same_score(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Keep endpoints and every point where the curve changes direction.
fn keep_mask(tps: &[usize], fps: &[usize]) -> Vec<bool> {
    let n = tps.len();
    let mut keep = vec![true; n];
    if n <= 2 {
        return keep;
    }
    let second_diff = |v: &[usize], i: usize| v[i + 1] as i64 - 2 * v[i] as i64 + v[i - 1] as i64;
    for i in 1..n - 1 {
        keep[i] = second_diff(fps, i) != 0 || second_diff(tps, i) != 0;
    }
    keep
}

/// ROC curve for every class in `0..scores.num_classes()`.
pub fn per_class_roc(scores: &ScoreMatrix, targets: &[usize]) -> MetricsResult<Vec<ClassRoc>> {
    let rows = scores.num_rows();
    if targets.len() != rows {
        return Err(MetricsError::LengthMismatch {
            what: "targets",
            expected: rows,
            actual: targets.len(),
        });
    }
    let num_classes = scores.num_classes();
    let mut true_class_scores = Vec::with_capacity(rows);
    for (row_idx, (row, &target)) in scores.rows().zip(targets).enumerate() {
        if target >= num_classes {
            return Err(MetricsError::TargetOutOfRange {
                row: row_idx,
                target,
                num_classes,
            });
        }
        true_class_scores.push(row[target]);
    }

    Ok((0..num_classes)
        .map(|class| {
            let positives: Vec<bool> = targets.iter().map(|&t| t == class).collect();
            ClassRoc {
                class,
                curve: roc_curve(&true_class_scores, &positives),
            }
        })
        .collect())
}
