use anyhow::{anyhow, Result};
use image::RgbaImage;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::{find_tessdata_dir, find_tesseract_executable};
use super::{rect_box, OcrResult, Recognizer};

/// Runs the `tesseract` CLI with TSV output and groups words into lines.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
    psm: u32,
}

impl TesseractRecognizer {
    pub fn new(language: impl Into<String>, psm: u32) -> Self {
        Self {
            language: language.into(),
            psm,
        }
    }

    pub fn from_config(config: &crate::config::OcrConfig) -> Self {
        Self::new(config.language.clone(), u32::from(config.psm))
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl Recognizer for TesseractRecognizer {
    fn run(&self, image: &RgbaImage) -> Result<Vec<OcrResult>> {
        let tesseract_exe = find_tesseract_executable()?;
        let tessdata_dir = find_tessdata_dir(&self.language)?;

        let temp_input = NamedTempFile::with_suffix(".png")?;
        image.save(temp_input.path())?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let output = Command::new(&tesseract_exe)
            .arg(temp_input.path())
            .arg(&output_base)
            .arg("--tessdata-dir")
            .arg(&tessdata_dir)
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        let results = parse_tsv_output(&tsv_content);
        log::debug!("Tesseract returned {} line(s)", results.len());
        Ok(results)
    }
}

struct LineAccumulator {
    key: (i32, i32, i32),
    text: String,
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
    conf_sum: f32,
    words: usize,
}

impl LineAccumulator {
    fn new(key: (i32, i32, i32)) -> Self {
        Self {
            key,
            text: String::new(),
            left: f64::INFINITY,
            top: f64::INFINITY,
            right: f64::NEG_INFINITY,
            bottom: f64::NEG_INFINITY,
            conf_sum: 0.0,
            words: 0,
        }
    }

    fn push(&mut self, word: &str, left: f64, top: f64, width: f64, height: f64, conf: f32) {
        if needs_space(&self.text, word) {
            self.text.push(' ');
        }
        self.text.push_str(word);
        self.left = self.left.min(left);
        self.top = self.top.min(top);
        self.right = self.right.max(left + width);
        self.bottom = self.bottom.max(top + height);
        self.conf_sum += conf;
        self.words += 1;
    }

    fn finish(self) -> Option<OcrResult> {
        if self.words == 0 {
            return None;
        }
        Some(OcrResult::new(
            rect_box(self.left, self.top, self.right - self.left, self.bottom - self.top),
            self.text,
            self.conf_sum / self.words as f32 / 100.0,
        ))
    }
}

/// Japanese words come back space-separated per glyph run; only Latin
/// alphanumerics on both sides keep a space.
fn needs_space(current: &str, next: &str) -> bool {
    match (current.chars().last(), next.chars().next()) {
        (Some(a), Some(b)) => a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric(),
        _ => false,
    }
}

/// Parses Tesseract TSV output into one result per (block, paragraph, line).
pub fn parse_tsv_output(tsv: &str) -> Vec<OcrResult> {
    let mut results = Vec::new();
    let mut current: Option<LineAccumulator> = None;

    for line in tsv.lines().skip(1) {
        // level, page_num, block_num, par_num, line_num, word_num,
        // left, top, width, height, conf, text
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let text = fields[11].trim();
        let conf: f32 = fields[10].trim().parse().unwrap_or(-1.0);
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        let num = |i: usize| fields[i].trim().parse::<f64>().unwrap_or(0.0);

        if current.as_ref().is_some_and(|acc| acc.key != key) {
            if let Some(done) = current.take().and_then(LineAccumulator::finish) {
                results.push(done);
            }
        }
        current
            .get_or_insert_with(|| LineAccumulator::new(key))
            .push(text, num(6), num(7), num(8), num(9), conf);
    }

    if let Some(done) = current.and_then(LineAccumulator::finish) {
        results.push(done);
    }
    results
}
