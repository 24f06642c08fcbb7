//! Top-1 accuracy over flat row-major score buffers.

/// Index and value of the highest score in `row`.
///
/// Ties resolve to the lowest class index. NaN never beats a number; a row
/// of only NaNs (or an empty row) reports class 0 with a NaN score.
pub fn argmax(row: &[f32]) -> (usize, f32) {
    let mut best = 0usize;
    let mut best_score = f32::NAN;
    for (idx, &score) in row.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        if best_score.is_nan() || score > best_score {
            best = idx;
            best_score = score;
        }
    }
    (best, best_score)
}

/// Number of rows whose argmax equals the label.
pub fn top1_correct(scores: &[f32], num_classes: usize, labels: &[usize]) -> usize {
    scores
        .chunks_exact(num_classes.max(1))
        .zip(labels)
        .filter(|(row, &label)| argmax(row).0 == label)
        .count()
}

/// Percentage (0-100) of rows whose argmax equals the label; 0 for an empty batch.
pub fn top1_accuracy(scores: &[f32], num_classes: usize, labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    top1_correct(scores, num_classes, labels) as f64 * 100.0 / labels.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]).0, 0);
        assert_eq!(argmax(&[0.1, 0.45, 0.45]).0, 1);
    }

    #[test]
    fn argmax_skips_nan() {
        let (idx, score) = argmax(&[f32::NAN, 0.2, 0.1]);
        assert_eq!(idx, 1);
        assert_eq!(score, 0.2);
        assert_eq!(argmax(&[f32::NAN, f32::NAN]).0, 0);
    }

    #[test]
    fn all_correct_is_one_hundred() {
        let scores = [0.9, 0.1, 0.2, 0.8, 0.6, 0.4];
        assert_eq!(top1_accuracy(&scores, 2, &[0, 1, 0]), 100.0);
    }

    #[test]
    fn none_correct_is_zero() {
        let scores = [0.9, 0.1, 0.2, 0.8];
        assert_eq!(top1_accuracy(&scores, 2, &[1, 0]), 0.0);
        assert_eq!(top1_accuracy(&[], 2, &[]), 0.0);
    }

    #[test]
    fn partial_accuracy() {
        let scores = [0.9, 0.1, 0.2, 0.8, 0.6, 0.4, 0.3, 0.7];
        assert_eq!(top1_correct(&scores, 2, &[0, 1, 1, 0]), 2);
        assert_eq!(top1_accuracy(&scores, 2, &[0, 1, 1, 0]), 50.0);
    }
}
