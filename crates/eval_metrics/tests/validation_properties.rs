//! Property checks over randomised validation passes.

use eval_metrics::{
    per_class_roc, precision_recall, render_roc_png, softmax_rows, top1_correct, PlotConfig,
    ScoreMatrix, UNDEFINED,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_pass(rng: &mut StdRng, rows: usize, classes: usize) -> (ScoreMatrix, Vec<usize>, Vec<String>) {
    let logits: Vec<f32> = (0..rows * classes)
        .map(|_| rng.random_range(-3.0f32..3.0))
        .collect();
    let scores = ScoreMatrix::from_rows(classes, softmax_rows(&logits, classes)).unwrap();
    let targets: Vec<usize> = (0..rows).map(|_| rng.random_range(0..classes)).collect();
    let names: Vec<String> = (0..rows).map(|i| format!("{i:05}.png")).collect();
    (scores, targets, names)
}

#[test]
fn hits_and_hard_negatives_partition_the_pass() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let rows = rng.random_range(0..40);
        let classes = rng.random_range(1..6);
        let threshold = rng.random_range(0.0f32..1.0);
        let (scores, targets, names) = random_pass(&mut rng, rows, classes);
        let pr = precision_recall(&scores, &targets, &names, threshold).unwrap();

        assert_eq!(pr.total_hits() + pr.hard_negatives.len(), rows);
        assert_eq!(pr.predicted_counts.iter().sum::<usize>(), rows);
        assert_eq!(pr.target_counts.iter().sum::<usize>(), rows);

        let mut seen: Vec<&str> = pr
            .hard_negatives
            .iter()
            .map(|h| h.image_name.as_str())
            .collect();
        seen.dedup();
        assert_eq!(seen.len(), pr.hard_negatives.len());

        for v in pr.precision.iter().chain(pr.recall.iter()) {
            assert!(*v == UNDEFINED || (0.0..=1.0).contains(v), "out of range: {v}");
        }
    }
}

#[test]
fn zero_threshold_hits_match_top1() {
    let mut rng = StdRng::seed_from_u64(11);
    let (scores, targets, names) = random_pass(&mut rng, 64, 4);
    let pr = precision_recall(&scores, &targets, &names, 0.0).unwrap();
    assert_eq!(
        pr.total_hits(),
        top1_correct(scores.as_slice(), 4, &targets)
    );
}

#[test]
fn roc_curves_are_monotone_and_render() {
    let mut rng = StdRng::seed_from_u64(3);
    let (scores, targets, _) = random_pass(&mut rng, 30, 3);
    let rocs = per_class_roc(&scores, &targets).unwrap();
    for roc in &rocs {
        let Some(curve) = &roc.curve else { continue };
        assert_eq!((curve.fpr[0], curve.tpr[0]), (0.0, 0.0));
        assert_eq!(curve.fpr.last(), Some(&1.0));
        assert_eq!(curve.tpr.last(), Some(&1.0));
        assert!(curve.fpr.windows(2).all(|w| w[0] <= w[1]));
        assert!(curve.tpr.windows(2).all(|w| w[0] <= w[1]));
        let auc = curve.auc();
        assert!((0.0..=1.0).contains(&auc));
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roc").join("roc_1.png");
    render_roc_png(&rocs, &path, &PlotConfig::default()).unwrap();
    let img = image::open(&path).unwrap();
    assert_eq!((img.width(), img.height()), (640, 480));
}
