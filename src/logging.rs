//! File + console logger.
//!
//! Every record is printed as `[HH:MM:SS.mmm] LEVEL message` and appended to
//! `<exe_dir>/logs/campus_scan.log`. Install once with [`init_with_level`].

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

pub const LOG_FILE_NAME: &str = "campus_scan.log";

struct FileLogger {
    level: LevelFilter,
    path: PathBuf,
    // Serializes appends so lines from the worker and UI threads never interleave.
    write_lock: Mutex<()>,
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), &record.args().to_string());
        print!("{}", line);

        let _guard = self.write_lock.lock();
        append_line(&self.path, &line);
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<FileLogger> = OnceLock::new();

/// Formats a single log line with a wall-clock timestamp.
fn format_line(level: log::Level, msg: &str) -> String {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    format!("[{}] {:<5} {}\n", timestamp, level, msg)
}

fn append_line(path: &Path, line: &str) {
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Install the file logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| FileLogger {
            level,
            path: crate::paths::get_logs_dir().join(LOG_FILE_NAME),
            write_lock: Mutex::new(()),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Routes panics to the log file, even if the logger was never installed.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();

        let line = format!("[PANIC]{} {}\n", location, msg);
        eprint!("{}", line);
        append_line(&crate::paths::get_logs_dir().join(LOG_FILE_NAME), &line);
    }));
}
