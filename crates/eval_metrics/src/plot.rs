//! Rasterised ROC plot written as PNG.

use crate::roc::ClassRoc;
use crate::types::{MetricsError, MetricsResult};
use image::{Rgb, RgbImage};
use std::path::Path;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const CHANCE: Rgb<u8> = Rgb([160, 160, 160]);
const TEXT_SCALE: i64 = 2;

/// Class colours: red, blue, yellow, green, cyan, then a few extras; cycles.
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([220, 40, 40]),
    Rgb([40, 80, 220]),
    Rgb([230, 190, 20]),
    Rgb([40, 160, 60]),
    Rgb([20, 190, 200]),
    Rgb([160, 60, 180]),
    Rgb([240, 130, 30]),
    Rgb([110, 80, 50]),
];

#[derive(Debug, Clone, Copy)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub line_thickness: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            margin: 40,
            line_thickness: 2,
        }
    }
}

pub fn class_color(class: usize) -> Rgb<u8> {
    PALETTE[class % PALETTE.len()]
}

/// Draw all defined class curves onto one canvas. Undefined curves still get
/// a legend swatch so the class ordering stays readable.
pub fn roc_image(curves: &[ClassRoc], cfg: &PlotConfig) -> RgbImage {
    let width = cfg.width.max(cfg.margin * 2 + 10);
    let height = cfg.height.max(cfg.margin * 2 + 10);
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    let frame = Frame {
        x0: cfg.margin as f64,
        y0: cfg.margin as f64,
        w: (width - 2 * cfg.margin) as f64,
        h: (height - 2 * cfg.margin) as f64,
    };

    for tick in 1..10 {
        let t = tick as f64 / 10.0;
        draw_line(&mut img, frame.to_px(t, 0.0), frame.to_px(t, 1.0), GRID, 1);
        draw_line(&mut img, frame.to_px(0.0, t), frame.to_px(1.0, t), GRID, 1);
    }
    draw_dashed(&mut img, frame.to_px(0.0, 0.0), frame.to_px(1.0, 1.0), CHANCE);
    draw_line(&mut img, frame.to_px(0.0, 0.0), frame.to_px(1.0, 0.0), AXIS, 2);
    draw_line(&mut img, frame.to_px(0.0, 0.0), frame.to_px(0.0, 1.0), AXIS, 2);

    for roc in curves {
        let Some(curve) = &roc.curve else {
            continue;
        };
        let color = class_color(roc.class);
        for (x, y) in curve.fpr.windows(2).zip(curve.tpr.windows(2)) {
            draw_line(
                &mut img,
                frame.to_px(x[0], y[0]),
                frame.to_px(x[1], y[1]),
                color,
                cfg.line_thickness,
            );
        }
    }

    draw_axis_titles(&mut img, &frame, cfg.margin as i64);
    draw_legend(&mut img, curves, &frame);
    img
}

/// Render curves and save to `path` (parent directories are created).
///
/// Class `c` is drawn in `class_color(c)`: red, blue, yellow, green, cyan,
/// purple, orange, brown, then repeating. The legend lists each class number
/// beside its swatch; a hollow swatch marks a class with no defined curve.
/// The x axis is FPR and the y axis TPR.
pub fn render_roc_png(curves: &[ClassRoc], path: &Path, cfg: &PlotConfig) -> MetricsResult<()> {
    let render_err = |source: image::ImageError| MetricsError::Render {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| render_err(image::ImageError::IoError(e)))?;
    }
    roc_image(curves, cfg).save(path).map_err(render_err)
}

struct Frame {
    x0: f64,
    y0: f64,
    w: f64,
    h: f64,
}

impl Frame {
    /// Plot coordinates (fpr, tpr) in [0, 1] to pixel coordinates; y grows upward.
    fn to_px(&self, fpr: f64, tpr: f64) -> (i64, i64) {
        let x = self.x0 + fpr.clamp(0.0, 1.0) * self.w;
        let y = self.y0 + (1.0 - tpr.clamp(0.0, 1.0)) * self.h;
        (x.round() as i64, y.round() as i64)
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_line(img: &mut RgbImage, a: (i64, i64), b: (i64, i64), color: Rgb<u8>, thickness: u32) {
    let half = (thickness.max(1) as i64 - 1) / 2;
    let extra = (thickness.max(1) as i64 - 1) - half;
    for_each_point(a, b, |x, y| {
        for dx in -half..=extra {
            for dy in -half..=extra {
                put(img, x + dx, y + dy, color);
            }
        }
    });
}

fn draw_dashed(img: &mut RgbImage, a: (i64, i64), b: (i64, i64), color: Rgb<u8>) {
    let mut step = 0usize;
    for_each_point(a, b, |x, y| {
        if (step / 6) % 2 == 0 {
            put(img, x, y, color);
        }
        step += 1;
    });
}

/// Bresenham walk from `a` to `b`, inclusive.
fn for_each_point(a: (i64, i64), b: (i64, i64), mut f: impl FnMut(i64, i64)) {
    let (mut x, mut y) = a;
    let dx = (b.0 - a.0).abs();
    let dy = -(b.1 - a.1).abs();
    let sx = if a.0 < b.0 { 1 } else { -1 };
    let sy = if a.1 < b.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        f(x, y);
        if x == b.0 && y == b.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn fill_rect(img: &mut RgbImage, x0: i64, y0: i64, w: i64, h: i64, color: Rgb<u8>) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            put(img, x, y, color);
        }
    }
}

/// Legend box in the lower-right corner of the plot area: one swatch per class,
/// stacked top to bottom in class order.
fn draw_legend(img: &mut RgbImage, curves: &[ClassRoc], frame: &Frame) {
    if curves.is_empty() {
        return;
    }
    let swatch = 12i64;
    let pad = 6i64;
    let label_w = curves
        .iter()
        .map(|roc| text_width(&roc.class.to_string()))
        .max()
        .unwrap_or(0);
    let box_w = swatch + 3 * pad + label_w;
    let box_h = curves.len() as i64 * (swatch + pad) + pad;
    let right = (frame.x0 + frame.w) as i64 - pad;
    let bottom = (frame.y0 + frame.h) as i64 - pad;
    let (bx, by) = (right - box_w, bottom - box_h);

    fill_rect(img, bx, by, box_w, box_h, BACKGROUND);
    draw_line(img, (bx, by), (bx + box_w, by), AXIS, 1);
    draw_line(img, (bx, by + box_h), (bx + box_w, by + box_h), AXIS, 1);
    draw_line(img, (bx, by), (bx, by + box_h), AXIS, 1);
    draw_line(img, (bx + box_w, by), (bx + box_w, by + box_h), AXIS, 1);

    for (slot, roc) in curves.iter().enumerate() {
        let sy = by + pad + slot as i64 * (swatch + pad);
        let color = class_color(roc.class);
        if roc.curve.is_some() {
            fill_rect(img, bx + pad, sy, swatch, swatch, color);
        } else {
            // Hollow swatch marks a class without a defined curve.
            draw_line(img, (bx + pad, sy), (bx + pad + swatch, sy), color, 1);
            draw_line(img, (bx + pad, sy + swatch), (bx + pad + swatch, sy + swatch), color, 1);
            draw_line(img, (bx + pad, sy), (bx + pad, sy + swatch), color, 1);
            draw_line(img, (bx + pad + swatch, sy), (bx + pad + swatch, sy + swatch), color, 1);
        }
        draw_text(img, bx + 2 * pad + swatch, sy + 1, &roc.class.to_string(), AXIS);
    }
}

fn draw_axis_titles(img: &mut RgbImage, frame: &Frame, margin: i64) {
    let glyph_h = 5 * TEXT_SCALE;
    let bottom = (frame.y0 + frame.h) as i64;
    let x_title = "FPR";
    let x = (frame.x0 + frame.w / 2.0) as i64 - text_width(x_title) / 2;
    draw_text(img, x, bottom + (margin - glyph_h) / 2, x_title, AXIS);

    let y_title = "TPR";
    let y = (frame.y0 + frame.h / 2.0) as i64 - glyph_h / 2;
    draw_text(img, (margin - text_width(y_title)) / 2, y, y_title, AXIS);
}

/// 3x5 bitmaps, one row per entry, high bit on the left.
fn glyph(c: char) -> Option<[u8; 5]> {
    let rows = match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        _ => return None,
    };
    Some(rows)
}

fn text_width(text: &str) -> i64 {
    let n = text.chars().count() as i64;
    if n == 0 {
        0
    } else {
        (4 * n - 1) * TEXT_SCALE
    }
}

/// Draws `text` with its top-left corner at `(x, y)`; unknown characters leave a gap.
fn draw_text(img: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else {
            continue;
        };
        let left = x + i as i64 * 4 * TEXT_SCALE;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..3i64 {
                if bits & (0b100 >> col) != 0 {
                    fill_rect(
                        img,
                        left + col * TEXT_SCALE,
                        y + row as i64 * TEXT_SCALE,
                        TEXT_SCALE,
                        TEXT_SCALE,
                        color,
                    );
                }
            }
        }
    }
}
