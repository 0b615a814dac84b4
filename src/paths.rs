use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the snapshot directory: `<exe_dir>/snapshots/`
///
/// Tap snapshots are only written here in developer mode.
pub fn get_snapshots_dir() -> PathBuf {
    get_exe_dir().join("snapshots")
}

/// Default location of the facility directory: `<exe_dir>/resources/facilities.json`
pub fn get_default_directory_path() -> PathBuf {
    get_exe_dir().join("resources").join("facilities.json")
}

/// Path of the config file: `<exe_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Returns the tesseract data directory under the user's local data dir.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("campus-scan")
        .join("tesseract")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_snapshots_dir())?;
    Ok(())
}
