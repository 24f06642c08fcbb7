//! Batch assembly for the Burn data loader.

use crate::preprocess::{load_item, Preprocess};
use crate::types::{DecodePolicy, ImageItem, ImageRecord, SkippedSample};
use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::Arc;

/// Stacked tensors for a non-empty batch.
#[derive(Debug, Clone)]
pub struct BatchInputs<B: Backend> {
    /// `[N, 3, H, W]`
    pub images: Tensor<B, 4>,
    /// `[N]`
    pub targets: Tensor<B, 1, Int>,
}

/// One loader step. `inputs` is `None` when every sample was dropped; the
/// names and labels line up with the rows of `inputs`.
#[derive(Debug, Clone)]
pub struct ClassBatch<B: Backend> {
    pub inputs: Option<BatchInputs<B>>,
    pub labels: Vec<usize>,
    pub image_names: Vec<String>,
    pub skipped: Vec<SkippedSample>,
}

impl<B: Backend> ClassBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_none()
    }

    fn dropped(skipped: Vec<SkippedSample>) -> Self {
        Self {
            inputs: None,
            labels: Vec::new(),
            image_names: Vec::new(),
            skipped,
        }
    }
}

/// Decodes records in parallel and stacks them in input order.
#[derive(Clone)]
pub struct ClassBatcher {
    preprocess: Preprocess,
    policy: DecodePolicy,
    pool: Option<Arc<ThreadPool>>,
}

impl ClassBatcher {
    /// `workers == 0` decodes on the global rayon pool.
    pub fn new(preprocess: Preprocess, policy: DecodePolicy, workers: usize) -> Self {
        let pool = if workers == 0 {
            None
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("decode-{i}"))
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(err) => {
                    tracing::warn!(%err, workers, "decode pool unavailable; using global rayon pool");
                    None
                }
            }
        };
        Self {
            preprocess,
            policy,
            pool,
        }
    }

    pub fn policy(&self) -> DecodePolicy {
        self.policy
    }

    fn decode_all(&self, items: &[ImageRecord]) -> Vec<Result<ImageItem, SkippedSample>> {
        let run = || {
            items
                .par_iter()
                .map(|record| {
                    load_item(record, &self.preprocess, self.policy).map_err(|err| {
                        SkippedSample {
                            image_name: record.image_name.clone(),
                            reason: err.to_string(),
                        }
                    })
                })
                .collect::<Vec<_>>()
        };
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }

    /// Decode and stack `items`, applying the decode policy.
    pub fn assemble<B: Backend>(&self, items: Vec<ImageRecord>, device: &B::Device) -> ClassBatch<B> {
        if items.is_empty() {
            return ClassBatch::dropped(Vec::new());
        }
        let decoded = self.decode_all(&items);

        let mut samples = Vec::with_capacity(decoded.len());
        let mut skipped = Vec::new();
        for res in decoded {
            match res {
                Ok(item) => samples.push(item),
                Err(skip) => {
                    tracing::warn!(image = %skip.image_name, reason = %skip.reason, "skipping sample");
                    skipped.push(skip);
                }
            }
        }

        if !skipped.is_empty() && self.policy == DecodePolicy::Strict {
            tracing::warn!(
                batch = items.len(),
                failed = skipped.len(),
                "strict decode: dropping whole batch"
            );
            let skipped = items
                .into_iter()
                .map(|r| {
                    let reason = skipped
                        .iter()
                        .find(|s| s.image_name == r.image_name)
                        .map(|s| s.reason.clone())
                        .unwrap_or_else(|| "batch dropped after decode failure".to_string());
                    SkippedSample {
                        image_name: r.image_name,
                        reason,
                    }
                })
                .collect();
            return ClassBatch::dropped(skipped);
        }

        let Some(first) = samples.first() else {
            return ClassBatch::dropped(skipped);
        };
        let (width, height) = (first.width, first.height);
        if samples.iter().any(|s| (s.width, s.height) != (width, height)) {
            tracing::warn!(
                batch = samples.len(),
                "batch contains varying image sizes; dropping it (configure a center crop)"
            );
            skipped.extend(samples.into_iter().map(|s| SkippedSample {
                image_name: s.image_name,
                reason: format!("image size {}x{} differs within batch", s.width, s.height),
            }));
            return ClassBatch::dropped(skipped);
        }

        let n = samples.len();
        let mut pixels = Vec::with_capacity(n * 3 * (width * height) as usize);
        let mut labels = Vec::with_capacity(n);
        let mut image_names = Vec::with_capacity(n);
        for s in samples {
            pixels.extend_from_slice(&s.pixels);
            labels.push(s.label);
            image_names.push(s.image_name);
        }

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), device).reshape([
            n,
            3,
            height as usize,
            width as usize,
        ]);
        let target_data: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(target_data, [n]), device);

        ClassBatch {
            inputs: Some(BatchInputs { images, targets }),
            labels,
            image_names,
            skipped,
        }
    }
}

impl<B: Backend> Batcher<B, ImageRecord, ClassBatch<B>> for ClassBatcher {
    fn batch(&self, items: Vec<ImageRecord>, device: &B::Device) -> ClassBatch<B> {
        self.assemble(items, device)
    }
}
