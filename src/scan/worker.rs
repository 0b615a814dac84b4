//! Scan worker thread.
//!
//! Receives tap snapshots, runs preprocessing and OCR, picks the text line
//! nearest the tap, and resolves it against the facility directory.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, OnceLock};

use anyhow::Result;

use super::queue::ScanReport;
use crate::camera::TapPayload;
use crate::facility::{Facility, FacilityMatcher};
use crate::ocr::{find_nearest_ocr_box, find_nearest_ocr_box_indexed, Preprocessor, Recognizer};

/// Filled once the recognizer has finished preparing (tessdata present).
pub type RecognizerSlot = Arc<OnceLock<Arc<dyn Recognizer>>>;

/// What a tap resolved to.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    FoundFacility { facility: Arc<Facility>, text: String },
    /// Text was read near the tap but matched no facility.
    TextOnly { text: String },
    NoText,
    /// The recognizer is still being prepared.
    NotReady,
    Error(String),
}

impl ScanOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, ScanOutcome::FoundFacility { .. })
    }
}

/// Collaborators the worker needs for each tap.
#[derive(Clone)]
pub struct ScanContext {
    pub recognizer: RecognizerSlot,
    pub preprocessor: Arc<dyn Preprocessor>,
    pub matcher: Arc<FacilityMatcher>,
    /// Use the deepest containing line instead of the first one.
    pub prefer_deepest_box: bool,
    /// Developer mode: where to keep every tap snapshot.
    pub snapshot_dir: Option<PathBuf>,
}

impl ScanContext {
    pub fn new(
        recognizer: RecognizerSlot,
        preprocessor: Arc<dyn Preprocessor>,
        matcher: Arc<FacilityMatcher>,
    ) -> Self {
        Self {
            recognizer,
            preprocessor,
            matcher,
            prefer_deepest_box: false,
            snapshot_dir: None,
        }
    }

    pub fn with_deepest_box(mut self, enabled: bool) -> Self {
        self.prefer_deepest_box = enabled;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshot_dir = dir;
        self
    }
}

/// Resolves one tap. Never fails: errors become [`ScanOutcome::Error`].
pub fn process_payload(ctx: &ScanContext, payload: &TapPayload) -> ScanOutcome {
    let Some(recognizer) = ctx.recognizer.get() else {
        return ScanOutcome::NotReady;
    };

    let processed = ctx.preprocessor.execute(&payload.image);
    let results = match recognizer.run(&processed) {
        Ok(results) => results,
        Err(e) => {
            log::warn!("Scan worker: OCR failed: {:#}", e);
            return ScanOutcome::Error(e.to_string());
        }
    };
    if results.is_empty() {
        return ScanOutcome::NoText;
    }

    // Preprocessing may have resized; bring boxes back to snapshot pixels.
    let factor = if processed.width() > 0 {
        payload.image.width() as f64 / processed.width() as f64
    } else {
        1.0
    };
    let results: Vec<_> = results.into_iter().map(|r| r.scaled(factor)).collect();

    let tap = [payload.x as f64, payload.y as f64];
    let nearest = if ctx.prefer_deepest_box {
        find_nearest_ocr_box_indexed(tap, &results)
    } else {
        find_nearest_ocr_box(tap, &results)
    };
    let Some(nearest) = nearest else {
        return ScanOutcome::NoText;
    };

    let text = nearest.text.trim().to_string();
    log::info!(
        "Scan: nearest text {:?} (distance {:.1}, confidence {:.2})",
        text,
        nearest.distance,
        nearest.confidence
    );

    match ctx.matcher.find_building(&text) {
        Some(facility) => ScanOutcome::FoundFacility { facility, text },
        None => ScanOutcome::TextOnly { text },
    }
}

/// Saves the snapshot as `tap_<timestamp>_<x>_<y>.png` under `dir`.
pub fn save_snapshot(dir: &Path, payload: &TapPayload) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let filename = format!(
        "tap_{}_{}_{}.png",
        payload.captured_at.format("%Y%m%d_%H%M%S%.3f"),
        payload.x,
        payload.y
    );
    let path = dir.join(filename);
    payload.image.save(&path)?;
    Ok(path)
}

/// Runs the scan worker loop.
///
/// Processes taps until the tap channel closes or nobody listens for reports.
/// Blocks, so run it on a dedicated thread.
pub fn run_scan_worker(
    receiver: Receiver<TapPayload>,
    ctx: ScanContext,
    reports: Sender<ScanReport>,
) {
    log::info!("Scan worker started");

    loop {
        match receiver.recv() {
            Ok(payload) => {
                log::info!(
                    "Scan worker: tap at ({}, {}) on {}x{} snapshot",
                    payload.x,
                    payload.y,
                    payload.image.width(),
                    payload.image.height()
                );

                if let Some(dir) = &ctx.snapshot_dir {
                    match save_snapshot(dir, &payload) {
                        Ok(path) => log::debug!("Snapshot saved: {}", path.display()),
                        Err(e) => log::warn!("Scan worker: failed to save snapshot: {}", e),
                    }
                }

                let outcome = process_payload(&ctx, &payload);
                let report = ScanReport {
                    x: payload.x,
                    y: payload.y,
                    captured_at: payload.captured_at,
                    outcome,
                };
                if reports.send(report).is_err() {
                    log::info!("Scan worker: report receiver dropped, exiting");
                    break;
                }
            }
            Err(_) => {
                log::info!("Scan worker: channel closed, exiting");
                break;
            }
        }
    }

    log::info!("Scan worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facility::matcher::DEFAULT_CACHE_CAPACITY;
    use crate::facility::{FacilityDirectory, SAMPLE_DIRECTORY};
    use crate::ocr::preprocess::{PreprocessPipeline, PreprocessStep};
    use crate::ocr::{rect_box, OcrResult};
    use crate::scan::queue::{create_report_channel, create_scan_queue};
    use anyhow::anyhow;
    use chrono::Local;
    use image::RgbaImage;
    use std::thread;

    struct FixedRecognizer(Vec<OcrResult>);

    impl Recognizer for FixedRecognizer {
        fn run(&self, _image: &RgbaImage) -> Result<Vec<OcrResult>> {
            Ok(self.0.clone())
        }
    }

    struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn run(&self, _image: &RgbaImage) -> Result<Vec<OcrResult>> {
            Err(anyhow!("engine crashed"))
        }
    }

    fn ready(recognizer: impl Recognizer + 'static) -> RecognizerSlot {
        let slot: RecognizerSlot = Arc::new(OnceLock::new());
        let _ = slot.set(Arc::new(recognizer));
        slot
    }

    fn context(slot: RecognizerSlot, steps: Vec<PreprocessStep>) -> ScanContext {
        let dir = FacilityDirectory::from_json(SAMPLE_DIRECTORY).unwrap();
        ScanContext::new(
            slot,
            Arc::new(PreprocessPipeline::new(steps)),
            Arc::new(FacilityMatcher::new(&dir, DEFAULT_CACHE_CAPACITY)),
        )
    }

    fn payload(x: u32, y: u32) -> TapPayload {
        TapPayload {
            x,
            y,
            image: RgbaImage::new(640, 480),
            captured_at: Local::now(),
        }
    }

    fn lines() -> Vec<OcrResult> {
        vec![
            OcrResult::new(rect_box(100.0, 100.0, 120.0, 40.0), " 真理館 ", 0.9),
            OcrResult::new(rect_box(400.0, 300.0, 100.0, 40.0), "出口", 0.8),
        ]
    }

    #[test]
    fn test_tap_on_sign_finds_facility() {
        let ctx = context(ready(FixedRecognizer(lines())), Vec::new());
        match process_payload(&ctx, &payload(150, 120)) {
            ScanOutcome::FoundFacility { facility, text } => {
                assert_eq!(facility.id, "Shinri");
                assert_eq!(facility.name, "真理館");
                assert_eq!(text, "真理館");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_text_is_text_only() {
        let ctx = context(ready(FixedRecognizer(lines())), Vec::new());
        match process_payload(&ctx, &payload(450, 310)) {
            ScanOutcome::TextOnly { text } => assert_eq!(text, "出口"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_not_ready_without_recognizer() {
        let ctx = context(Arc::new(OnceLock::new()), Vec::new());
        assert!(matches!(
            process_payload(&ctx, &payload(0, 0)),
            ScanOutcome::NotReady
        ));
    }

    #[test]
    fn test_empty_results_are_no_text() {
        let ctx = context(ready(FixedRecognizer(Vec::new())), Vec::new());
        assert!(matches!(
            process_payload(&ctx, &payload(0, 0)),
            ScanOutcome::NoText
        ));
    }

    #[test]
    fn test_recognizer_error_is_reported() {
        let ctx = context(ready(FailingRecognizer), Vec::new());
        assert!(matches!(
            process_payload(&ctx, &payload(0, 0)),
            ScanOutcome::Error(msg) if msg.contains("engine crashed")
        ));
    }

    #[test]
    fn test_boxes_scaled_back_after_resize() {
        // Boxes are reported in the 2x image; the tap is in snapshot pixels.
        let doubled = vec![
            OcrResult::new(rect_box(200.0, 200.0, 240.0, 80.0), "T103", 0.9),
            OcrResult::new(rect_box(0.0, 0.0, 40.0, 40.0), "S101", 0.9),
        ];
        let ctx = context(
            ready(FixedRecognizer(doubled)),
            vec![PreprocessStep::Resize { scale: 2.0 }],
        );
        let outcome = process_payload(&ctx, &payload(150, 120));
        match outcome {
            ScanOutcome::FoundFacility { facility, .. } => assert_eq!(facility.id, "Tenchi"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_deepest_box_preference() {
        // A wide line overlaps a tall one; the tap is near the wide line's
        // edge but deep inside the tall one.
        let overlapping = vec![
            OcrResult::new(rect_box(0.0, 100.0, 400.0, 24.0), "出口", 0.9),
            OcrResult::new(rect_box(140.0, 40.0, 120.0, 140.0), "天地館", 0.9),
        ];
        let tap = payload(200, 102);

        let first = context(ready(FixedRecognizer(overlapping.clone())), Vec::new());
        assert!(matches!(
            process_payload(&first, &tap),
            ScanOutcome::TextOnly { text } if text == "出口"
        ));

        let deepest = first.with_deepest_box(true);
        match process_payload(&deepest, &tap) {
            ScanOutcome::FoundFacility { facility, .. } => assert_eq!(facility.id, "Tenchi"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_worker_reports_and_exits_when_channel_closes() {
        let ctx = context(ready(FixedRecognizer(lines())), Vec::new());
        let (sender, receiver) = create_scan_queue();
        let (report_tx, report_rx) = create_report_channel();

        let handle = thread::spawn(move || run_scan_worker(receiver, ctx, report_tx));

        sender.send(payload(150, 120)).unwrap();
        let report = report_rx.recv().unwrap();
        assert_eq!((report.x, report.y), (150, 120));
        assert!(report.outcome.is_found());

        drop(sender);
        handle.join().expect("Worker thread panicked");
    }

    #[test]
    fn test_developer_mode_saves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_snapshot(dir.path(), &payload(3, 4)).unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("_3_4.png"));
    }
}
