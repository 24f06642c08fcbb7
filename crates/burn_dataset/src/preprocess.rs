//! Deterministic image preprocessing: pad, resize, center crop, normalize.

use crate::types::{BurnDatasetError, DatasetResult, DecodePolicy, ImageItem, ImageRecord};
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocess {
    /// Zero border added on every side before resizing.
    pub pad: u32,
    /// Target length of the shorter side after resizing; `None` keeps the size.
    pub resize_shorter: Option<u32>,
    /// Output (width, height) of the center crop; `None` skips cropping.
    pub center_crop: Option<(u32, u32)>,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Preprocess {
    fn default() -> Self {
        Self {
            pad: 40,
            resize_shorter: Some(400),
            center_crop: Some((320, 320)),
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl Preprocess {
    /// No geometry changes, values scaled to [0, 1] only.
    pub fn identity() -> Self {
        Self {
            pad: 0,
            resize_shorter: None,
            center_crop: None,
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }

    pub fn describe(&self) -> String {
        let resize = self
            .resize_shorter
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());
        let crop = self
            .center_crop
            .map(|(w, h)| format!("{w}x{h}"))
            .unwrap_or_else(|| "none".to_string());
        format!(
            "pad={} resize_shorter={} center_crop={} mean={:?} std={:?}",
            self.pad, resize, crop, self.mean, self.std
        )
    }

    /// Geometry steps only; returns the final RGB image.
    pub fn apply_geometry(&self, img: RgbImage) -> RgbImage {
        let img = pad(img, self.pad);
        let img = match self.resize_shorter {
            Some(target) => resize_shorter(&img, target),
            None => img,
        };
        match self.center_crop {
            Some((w, h)) => center_crop(&img, w, h),
            None => img,
        }
    }

    /// Geometry steps then CHW float conversion and per-channel normalization.
    pub fn apply(&self, img: RgbImage) -> (Vec<f32>, u32, u32) {
        let img = self.apply_geometry(img);
        let (width, height) = img.dimensions();
        let plane = (width * height) as usize;
        let mut chw = vec![0.0f32; plane * 3];
        for (x, y, pixel) in img.enumerate_pixels() {
            let base = (y * width + x) as usize;
            for c in 0..3 {
                let v = pixel[c] as f32 / 255.0;
                chw[c * plane + base] = (v - self.mean[c]) / self.std[c];
            }
        }
        (chw, width, height)
    }
}

fn pad(img: RgbImage, border: u32) -> RgbImage {
    if border == 0 {
        return img;
    }
    let (w, h) = img.dimensions();
    let mut canvas = RgbImage::new(w + 2 * border, h + 2 * border);
    image::imageops::replace(&mut canvas, &img, border.into(), border.into());
    canvas
}

/// Scale so the shorter side equals `target`, keeping aspect ratio.
fn resize_shorter(img: &RgbImage, target: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || target == 0 {
        return img.clone();
    }
    let (new_w, new_h) = if w <= h {
        (target, ((h as f64 * target as f64) / w as f64).round().max(1.0) as u32)
    } else {
        (((w as f64 * target as f64) / h as f64).round().max(1.0) as u32, target)
    };
    if (new_w, new_h) == (w, h) {
        return img.clone();
    }
    image::imageops::resize(img, new_w, new_h, FilterType::Triangle)
}

/// Center crop to `out_w` x `out_h`, zero-padding when the image is smaller.
fn center_crop(img: &RgbImage, out_w: u32, out_h: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let left = ((w as f64 - out_w as f64) / 2.0).round() as i64;
    let top = ((h as f64 - out_h as f64) / 2.0).round() as i64;
    let mut canvas = RgbImage::new(out_w, out_h);
    image::imageops::replace(&mut canvas, img, -left, -top);
    canvas
}

/// Open and decode `path` as RGB8.
pub fn decode_rgb(path: &Path, policy: DecodePolicy) -> DatasetResult<RgbImage> {
    let io_err = |source: std::io::Error| BurnDatasetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ImageReader::open(path)
        .map_err(io_err)?
        .with_guessed_format()
        .map_err(io_err)?;
    if policy == DecodePolicy::Lenient {
        reader.no_limits();
    }
    let img = reader.decode().map_err(|source| BurnDatasetError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Decode and preprocess the image behind `record`.
pub fn load_item(
    record: &ImageRecord,
    preprocess: &Preprocess,
    policy: DecodePolicy,
) -> DatasetResult<ImageItem> {
    let img = decode_rgb(&record.path, policy)?;
    let (pixels, width, height) = preprocess.apply(img);
    Ok(ImageItem {
        image_name: record.image_name.clone(),
        label: record.label,
        pixels,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn default_pipeline_yields_crop_size() {
        let img = RgbImage::from_pixel(50, 30, Rgb([10, 20, 30]));
        let (chw, w, h) = Preprocess::default().apply(img);
        assert_eq!((w, h), (320, 320));
        assert_eq!(chw.len(), 3 * 320 * 320);
    }

    #[test]
    fn resize_keeps_aspect_on_shorter_side() {
        let img = RgbImage::new(40, 20);
        let out = resize_shorter(&img, 10);
        assert_eq!(out.dimensions(), (20, 10));
        let img = RgbImage::new(20, 40);
        assert_eq!(resize_shorter(&img, 10).dimensions(), (10, 20));
    }

    #[test]
    fn pad_and_crop_are_centered() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        let padded = pad(img, 1);
        assert_eq!(padded.dimensions(), (4, 4));
        assert_eq!(padded.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(padded.get_pixel(1, 1), &Rgb([255, 255, 255]));

        let cropped = center_crop(&padded, 2, 2);
        assert!(cropped.pixels().all(|p| *p == Rgb([255, 255, 255])));

        // Crop larger than the image pads with zeros around it.
        let grown = center_crop(&cropped, 4, 4);
        assert_eq!(grown.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grown.get_pixel(2, 2), &Rgb([255, 255, 255]));
    }

    #[test]
    fn normalization_is_per_channel_chw() {
        let img = RgbImage::from_pixel(1, 2, Rgb([255, 0, 51]));
        let pre = Preprocess {
            mean: [0.5, 0.0, 0.0],
            std: [0.5, 1.0, 0.2],
            ..Preprocess::identity()
        };
        let (chw, w, h) = pre.apply(img);
        assert_eq!((w, h), (1, 2));
        assert_eq!(chw.len(), 6);
        assert!((chw[0] - 1.0).abs() < 1e-6);
        assert!((chw[1] - 1.0).abs() < 1e-6);
        assert!(chw[2].abs() < 1e-6);
        assert!((chw[4] - 1.0).abs() < 1e-5);
    }
}
