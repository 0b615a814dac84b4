pub mod engine;
pub mod nearest;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractRecognizer;
pub use nearest::{find_nearest_ocr_box, find_nearest_ocr_box_indexed};
pub use preprocess::{PreprocessPipeline, Preprocessor};

use anyhow::Result;
use image::RgbaImage;

/// `[x, y]` in image pixels.
pub type Point = [f64; 2];

/// Quadrilateral corners, clockwise from top-left.
pub type OcrBox = [Point; 4];

/// One recognized text line.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub bbox: OcrBox,
    pub text: String,
    pub confidence: f32,
}

impl OcrResult {
    pub fn new(bbox: OcrBox, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            text: text.into(),
            confidence,
        }
    }

    /// Multiplies every corner by `factor` (maps boxes from a resized image back).
    pub fn scaled(mut self, factor: f64) -> Self {
        for p in self.bbox.iter_mut() {
            p[0] *= factor;
            p[1] *= factor;
        }
        self
    }
}

/// Text recognizer run on a snapshot.
pub trait Recognizer: Send + Sync {
    fn run(&self, image: &RgbaImage) -> Result<Vec<OcrResult>>;
}

/// Axis-aligned box as four corners.
pub fn rect_box(left: f64, top: f64, width: f64, height: f64) -> OcrBox {
    let right = left + width;
    let bottom = top + height;
    [[left, top], [right, top], [right, bottom], [left, bottom]]
}
