use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use models::{ArchKind, ResNetConfig};
use std::path::Path;
use training::{load_checkpoint, save_checkpoint, CheckpointError, CheckpointMeta, RecordPrecision};

type B = NdArray<f32>;

fn meta(precision: RecordPrecision) -> CheckpointMeta {
    CheckpointMeta {
        arch: ArchKind::Resnet8,
        epoch: 11,
        best_prec1: 62.5,
        num_classes: 3,
        precision,
    }
}

#[test]
fn save_then_load_restores_weights_and_bookkeeping() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let device = Default::default();
    let model = ResNetConfig::new(ArchKind::Resnet8, 3).init::<B>(&device);
    let stem = dir.path().join("resnet8").join("checkpoint");
    save_checkpoint(&model, &stem, &meta(RecordPrecision::Full))?;
    assert!(stem.with_extension("bin").is_file());
    assert!(stem.with_extension("json").is_file());

    // `.bin` paths resolve to the same checkpoint.
    let (loaded, restored) = load_checkpoint::<B>(&stem.with_extension("bin"), &device)?;
    assert_eq!(restored, meta(RecordPrecision::Full));

    let input = Tensor::<B, 4>::random([2, 3, 8, 8], Distribution::Default, &device);
    let a = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
    let b = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-5, "{x} vs {y}");
    }
    Ok(())
}

#[test]
fn half_precision_checkpoints_load_back() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let device = Default::default();
    let model = ResNetConfig::new(ArchKind::Resnet8, 3).init::<B>(&device);
    let stem = dir.path().join("model");
    save_checkpoint(&model, &stem, &meta(RecordPrecision::Half))?;
    let (_, restored) = load_checkpoint::<B>(&stem, &device)?;
    assert_eq!(restored.precision, RecordPrecision::Half);
    assert_eq!(restored.epoch, 11);
    Ok(())
}

#[test]
fn missing_checkpoint_is_reported_as_not_found() {
    let device = Default::default();
    let err = load_checkpoint::<B>(Path::new("/nonexistent/resnet8/checkpoint"), &device)
        .err()
        .expect("load should fail");
    assert!(matches!(err, CheckpointError::NotFound { .. }));
}
