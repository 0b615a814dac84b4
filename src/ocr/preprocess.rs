use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Pixel transform applied to a snapshot before recognition.
pub trait Preprocessor: Send + Sync {
    fn execute(&self, image: &RgbaImage) -> RgbaImage;
}

/// One filter in a [`PreprocessPipeline`]. Configured in config.json as e.g.
/// `{ "step": "ensure_min_size", "min_width": 200, "min_height": 200 }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PreprocessStep {
    /// Upscales small images by at least 2x so both sides reach the minimum.
    EnsureMinSize { min_width: u32, min_height: u32 },
    Resize { scale: f32 },
    Grayscale,
    GaussianBlur { sigma: f32 },
    /// Histogram equalization of luma.
    Equalize,
    /// Otsu binarization.
    Binarize,
    /// Keeps only pixels with every channel above `level` (as black on white).
    Threshold { level: u8 },
    Invert,
}

impl PreprocessStep {
    pub fn default_pipeline() -> Vec<PreprocessStep> {
        vec![
            PreprocessStep::EnsureMinSize {
                min_width: 200,
                min_height: 200,
            },
            PreprocessStep::Grayscale,
            PreprocessStep::Equalize,
        ]
    }

    pub fn apply(&self, img: &RgbaImage) -> RgbaImage {
        match self {
            PreprocessStep::EnsureMinSize {
                min_width,
                min_height,
            } => ensure_min_size(img, *min_width, *min_height),
            PreprocessStep::Resize { scale } => resize(img, *scale),
            PreprocessStep::Grayscale => grayscale(img),
            PreprocessStep::GaussianBlur { sigma } => imageops::blur(img, *sigma),
            PreprocessStep::Equalize => equalize(img),
            PreprocessStep::Binarize => binarize_otsu(img),
            PreprocessStep::Threshold { level } => threshold_bright_pixels(img, *level),
            PreprocessStep::Invert => {
                let mut out = img.clone();
                imageops::invert(&mut out);
                out
            }
        }
    }
}

/// Ordered list of steps, run front to back.
#[derive(Clone, Debug, Default)]
pub struct PreprocessPipeline {
    steps: Vec<PreprocessStep>,
}

impl PreprocessPipeline {
    pub fn new(steps: Vec<PreprocessStep>) -> Self {
        Self { steps }
    }
}

impl Preprocessor for PreprocessPipeline {
    fn execute(&self, image: &RgbaImage) -> RgbaImage {
        let mut current = image.clone();
        for step in &self.steps {
            current = step.apply(&current);
        }
        current
    }
}

fn luma(p: &Rgba<u8>) -> u8 {
    let v = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
    v.round().clamp(0.0, 255.0) as u8
}

fn gray_pixel(v: u8) -> Rgba<u8> {
    Rgba([v, v, v, 255])
}

pub fn resize(img: &RgbaImage, scale: f32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if !(scale.is_finite() && scale > 0.0) || w == 0 || h == 0 {
        return img.clone();
    }
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    imageops::resize(img, nw, nh, FilterType::Triangle)
}

pub fn ensure_min_size(img: &RgbaImage, min_width: u32, min_height: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || (w >= min_width && h >= min_height) {
        return img.clone();
    }
    let scale = (min_width as f32 / w as f32)
        .max(min_height as f32 / h as f32)
        .max(2.0);
    log::debug!("Image too small ({}x{}), scaling by {:.2}x", w, h, scale);
    resize(img, scale)
}

pub fn grayscale(img: &RgbaImage) -> RgbaImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| gray_pixel(luma(img.get_pixel(x, y))))
}

/// Equalizes the luma histogram; output is grayscale.
pub fn equalize(img: &RgbaImage) -> RgbaImage {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return img.clone();
    }
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[luma(p) as usize] += 1;
    }

    let mut cdf = [0u64; 256];
    let mut acc = 0;
    for (i, count) in hist.iter().enumerate() {
        acc += count;
        cdf[i] = acc;
    }
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total == cdf_min {
        // Single-valued image.
        return grayscale(img);
    }

    let mut lut = [0u8; 256];
    for i in 0..256 {
        let v = (cdf[i].saturating_sub(cdf_min)) as f64 / (total - cdf_min) as f64 * 255.0;
        lut[i] = v.round().clamp(0.0, 255.0) as u8;
    }
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        gray_pixel(lut[luma(img.get_pixel(x, y)) as usize])
    })
}

/// Otsu's threshold over luma. Pixels above the threshold become white.
pub fn binarize_otsu(img: &RgbaImage) -> RgbaImage {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[luma(p) as usize] += 1;
    }
    let threshold = otsu_threshold(&hist);
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        gray_pixel(if luma(img.get_pixel(x, y)) > threshold { 255 } else { 0 })
    })
}

fn otsu_threshold(hist: &[u64; 256]) -> u8 {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut best = 0u8;
    let mut best_var = -1.0f64;
    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    for t in 0..256 {
        weight_bg += hist[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * hist[t] as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let var = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if var > best_var {
            best_var = var;
            best = t as u8;
        }
    }
    best
}

/// Converts image to binary by keeping only bright pixels.
///
/// Pixels where R > threshold AND G > threshold AND B > threshold become black (text).
/// All other pixels become white (background). Useful for light signage on dark
/// backgrounds.
pub fn threshold_bright_pixels(img: &RgbaImage, threshold: u8) -> RgbaImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        if p[0] > threshold && p[1] > threshold && p[2] > threshold {
            gray_pixel(0)
        } else {
            gray_pixel(255)
        }
    })
}
