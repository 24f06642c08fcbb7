//! Integration tests for image-folder loading and batch assembly.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn_dataset::{
    BurnDatasetError, ClassBatch, ClassBatcher, DecodePolicy, FolderConfig, ImageFolderDataset,
    ImageRecord, LabelTransform, Preprocess,
};
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;

type B = NdArray<f32>;

/// Writes `names` as small solid PNGs plus a labels.json mapping them to `labels`.
fn write_folder(root: &Path, names: &[&str], labels: &[i64], size: (u32, u32)) -> anyhow::Result<()> {
    fs::create_dir_all(root.join("images"))?;
    let mut table = serde_json::Map::new();
    for (i, (name, label)) in names.iter().zip(labels).enumerate() {
        let shade = (i as u8).wrapping_mul(40);
        RgbImage::from_pixel(size.0, size.1, Rgb([shade, 0, 255 - shade]))
            .save(root.join("images").join(name))?;
        table.insert(name.to_string(), serde_json::json!(label));
    }
    fs::write(root.join("labels.json"), serde_json::to_vec(&table)?)?;
    Ok(())
}

fn small_config(root: &Path, num_classes: usize) -> FolderConfig {
    FolderConfig {
        preprocess: Preprocess {
            resize_shorter: Some(8),
            center_crop: Some((8, 8)),
            pad: 1,
            ..Preprocess::default()
        },
        ..FolderConfig::new(root.join("images"), root.join("labels.json"), num_classes)
    }
}

#[test]
fn listing_is_sorted_and_skips_hidden_and_extensionless() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_folder(dir.path(), &["c.png", "a.png", "b.png"], &[2, 0, 1], (4, 4))?;
    fs::write(dir.path().join("images").join(".hidden.png"), b"x")?;
    fs::write(dir.path().join("images").join("README"), b"x")?;
    fs::create_dir(dir.path().join("images").join("sub.dir"))?;

    let ds = ImageFolderDataset::open(&small_config(dir.path(), 3))?;
    let names: Vec<_> = ds.records().iter().map(|r| r.image_name.as_str()).collect();
    assert_eq!(names, ["a.png", "b.png", "c.png"]);
    assert_eq!(ds.records().iter().map(|r| r.label).collect::<Vec<_>>(), [0, 1, 2]);
    assert_eq!(ds.class_counts(), vec![1, 1, 1]);
    Ok(())
}

#[test]
fn wrapped_access_aliases_and_checked_access_errors() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_folder(dir.path(), &["a.png", "b.png"], &[0, 1], (4, 4))?;
    let ds = ImageFolderDataset::open(&small_config(dir.path(), 2))?;

    let first = ds.try_get(0)?;
    let wrapped = ds.get_wrapped(2)?;
    assert_eq!(wrapped.image_name, first.image_name);
    assert_eq!(wrapped.pixels, first.pixels);
    assert_eq!((first.width, first.height), (8, 8));

    assert!(matches!(
        ds.try_get(2),
        Err(BurnDatasetError::OutOfRange { index: 2, len: 2 })
    ));
    assert!(Dataset::<ImageRecord>::get(&ds, 2).is_none());
    Ok(())
}

#[test]
fn missing_and_out_of_range_labels_fail_at_open() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_folder(dir.path(), &["a.png"], &[5], (4, 4))?;
    assert!(matches!(
        ImageFolderDataset::open(&small_config(dir.path(), 4)),
        Err(BurnDatasetError::LabelOutOfRange { label: 5, .. })
    ));

    RgbImage::new(2, 2).save(dir.path().join("images").join("z.png"))?;
    let mut cfg = small_config(dir.path(), 8);
    assert!(matches!(
        ImageFolderDataset::open(&cfg),
        Err(BurnDatasetError::MissingLabel { image }) if image == "z.png"
    ));

    fs::remove_file(dir.path().join("images").join("z.png"))?;
    cfg.num_classes = 5;
    cfg.label_transform = LabelTransform::compact_above(3);
    let ds = ImageFolderDataset::open(&cfg)?;
    assert_eq!(ds.records()[0].label, 4);
    Ok(())
}

#[test]
fn empty_directory_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_folder(dir.path(), &[], &[], (4, 4))?;
    assert!(matches!(
        ImageFolderDataset::open(&small_config(dir.path(), 2)),
        Err(BurnDatasetError::EmptyDirectory { .. })
    ));
    Ok(())
}

#[test]
fn batcher_stacks_in_input_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_folder(dir.path(), &["a.png", "b.png", "c.png"], &[1, 0, 1], (6, 3))?;
    let ds = ImageFolderDataset::open(&small_config(dir.path(), 2))?;
    let batcher = ds.batcher(2);
    let device = Default::default();

    let batch: ClassBatch<B> = batcher.batch(ds.records().to_vec(), &device);
    let inputs = batch.inputs.expect("non-empty batch");
    assert_eq!(inputs.images.dims(), [3, 3, 8, 8]);
    assert_eq!(batch.labels, vec![1, 0, 1]);
    assert_eq!(batch.image_names, vec!["a.png", "b.png", "c.png"]);
    let targets = inputs.targets.into_data().to_vec::<i64>().expect("int targets");
    assert_eq!(targets, vec![1, 0, 1]);
    assert!(batch.skipped.is_empty());
    Ok(())
}

#[test]
fn decode_policy_controls_how_much_is_dropped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_folder(dir.path(), &["a.png", "b.png", "c.png"], &[0, 1, 0], (4, 4))?;
    fs::write(dir.path().join("images").join("b.png"), b"not a png")?;
    let device = Default::default();

    let mut cfg = small_config(dir.path(), 2);
    let strict = ImageFolderDataset::open(&cfg)?;
    let batch: ClassBatch<B> = strict.batcher(1).batch(strict.records().to_vec(), &device);
    assert!(batch.is_empty());
    assert_eq!(batch.skipped.len(), 3);

    cfg.decode_policy = DecodePolicy::Lenient;
    let lenient = ImageFolderDataset::open(&cfg)?;
    let batch: ClassBatch<B> = lenient.batcher(1).batch(lenient.records().to_vec(), &device);
    assert_eq!(batch.image_names, vec!["a.png", "c.png"]);
    assert_eq!(batch.skipped.len(), 1);
    assert_eq!(batch.skipped[0].image_name, "b.png");
    Ok(())
}

#[test]
fn mixed_sizes_without_crop_drop_the_batch() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    write_folder(dir.path(), &["a.png"], &[0], (4, 4))?;
    RgbImage::new(5, 4).save(dir.path().join("images").join("b.png"))?;
    fs::write(dir.path().join("labels.json"), br#"{"a.png": 0, "b.png": 1}"#)?;

    let cfg = FolderConfig {
        preprocess: Preprocess::identity(),
        ..FolderConfig::new(dir.path().join("images"), dir.path().join("labels.json"), 2)
    };
    let ds = ImageFolderDataset::open(&cfg)?;
    let batcher = ClassBatcher::new(Preprocess::identity(), DecodePolicy::Lenient, 0);
    let batch: ClassBatch<B> = batcher.batch(ds.records().to_vec(), &Default::default());
    assert!(batch.is_empty());
    assert_eq!(batch.skipped.len(), 2);
    Ok(())
}

#[test]
fn unshuffled_loader_preserves_listing_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let names = ["e.png", "d.png", "c.png", "b.png", "a.png"];
    write_folder(dir.path(), &names, &[0, 1, 0, 1, 0], (4, 4))?;
    let ds = ImageFolderDataset::open(&small_config(dir.path(), 2))?;
    let batcher = ds.batcher(2);
    let loader = DataLoaderBuilder::<B, ImageRecord, ClassBatch<B>>::new(batcher)
        .batch_size(2)
        .build(ds);

    let seen: Vec<String> = loader.iter().flat_map(|b| b.image_names).collect();
    assert_eq!(seen, ["a.png", "b.png", "c.png", "d.png", "e.png"]);
    Ok(())
}
