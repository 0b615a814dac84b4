//! GUI application state management.
//!
//! Tracks the camera status and the dialog shown after a scan.

use std::sync::Arc;

use crate::camera::TapResult;
use crate::facility::Facility;
use crate::scan::ScanOutcome;

/// Camera status for display in GUI.
#[derive(Clone, Debug, Default)]
pub enum CameraStatus {
    /// Waiting for the first frame
    #[default]
    Starting,
    Live,
    /// Stream ended (device unplugged, track stopped)
    Ended,
    /// Opening the camera failed; no automatic retry
    Failed(String),
}

impl CameraStatus {
    /// Get display text for current status.
    pub fn status_text(&self) -> String {
        match self {
            Self::Starting => "カメラ起動中...".to_string(),
            Self::Live => "文字をタップしてください".to_string(),
            Self::Ended => "カメラが停止しました".to_string(),
            Self::Failed(msg) => format!("カメラを利用できません: {}", msg),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

/// Dialog shown after a tap has been processed.
#[derive(Clone, Debug)]
pub enum ResultDialog {
    Found { facility: Arc<Facility>, text: String },
    TextOnly { text: String },
    NoText,
    /// OCR is still being prepared
    Preparing,
    Error(String),
    CameraFailed(String),
}

impl ResultDialog {
    pub fn from_outcome(outcome: ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::FoundFacility { facility, text } => Self::Found { facility, text },
            ScanOutcome::TextOnly { text } => Self::TextOnly { text },
            ScanOutcome::NoText => Self::NoText,
            ScanOutcome::NotReady => Self::Preparing,
            ScanOutcome::Error(msg) => Self::Error(msg),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Found { .. } => "施設が見つかりました",
            Self::TextOnly { .. } => "文字を読み取りました",
            Self::NoText => "文字が見つかりません",
            Self::Preparing => "準備中",
            Self::Error(_) => "エラー",
            Self::CameraFailed(_) => "カメラエラー",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Found { facility, text } => {
                format!("「{}」は {} です", text, facility.name)
            }
            Self::TextOnly { text } => {
                format!("「{}」に一致する施設はありませんでした", text)
            }
            Self::NoText => "タップした付近に文字が見つかりませんでした。".to_string(),
            Self::Preparing => "文字認識を準備しています。しばらくしてから再度お試しください。".to_string(),
            Self::Error(msg) => format!("読み取りに失敗しました: {}", msg),
            Self::CameraFailed(msg) => format!("カメラを起動できませんでした: {}", msg),
        }
    }

    /// Facility to link to, if any.
    pub fn facility(&self) -> Option<&Arc<Facility>> {
        match self {
            Self::Found { facility, .. } => Some(facility),
            _ => None,
        }
    }
}

/// GUI application state.
#[derive(Debug, Default)]
pub struct GuiState {
    pub camera: CameraStatus,
    /// A tap is being processed by the scan worker.
    pub scanning: bool,
    pub dialog: Option<ResultDialog>,
    /// Set once the camera failure dialog has been shown.
    pub camera_failure_shown: bool,
}

impl GuiState {
    /// Taps are ignored while a dialog is open or a scan is running.
    pub fn accepts_taps(&self) -> bool {
        self.camera.is_live() && self.dialog.is_none() && !self.scanning
    }

    /// A dropped tap never produces a report, so nothing else would end the scan.
    pub fn on_tap_result(&mut self, result: TapResult) {
        if result == TapResult::Dropped && self.scanning {
            log::info!("GUI: tap was dropped before reaching the scanner");
            self.scanning = false;
        }
    }

    pub fn on_report(&mut self, outcome: ScanOutcome) {
        self.scanning = false;
        self.dialog = Some(ResultDialog::from_outcome(outcome));
    }

    pub fn on_worker_stopped(&mut self) {
        if self.scanning {
            log::warn!("GUI: scan worker stopped with a scan outstanding");
            self.scanning = false;
        }
    }
}
