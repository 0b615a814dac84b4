pub mod queue;
pub mod worker;

pub use queue::{create_report_channel, create_scan_queue, ScanReport};
pub use worker::{run_scan_worker, process_payload, RecognizerSlot, ScanContext, ScanOutcome};
