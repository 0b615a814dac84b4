//! Channels between the UI thread and the scan worker.
//!
//! Taps flow UI → worker as [`TapPayload`]s; outcomes flow back as
//! [`ScanReport`]s which the UI polls once per frame.

use std::sync::mpsc::{channel, Receiver, Sender};

use chrono::{DateTime, Local};

use super::worker::ScanOutcome;
use crate::camera::TapPayload;

/// Outcome of one tap, tagged with where and when it happened.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub x: u32,
    pub y: u32,
    pub captured_at: DateTime<Local>,
    pub outcome: ScanOutcome,
}

/// Creates the tap queue. Unbounded: taps are rare compared to frames.
pub fn create_scan_queue() -> (Sender<TapPayload>, Receiver<TapPayload>) {
    channel()
}

pub fn create_report_channel() -> (Sender<ScanReport>, Receiver<ScanReport>) {
    channel()
}
