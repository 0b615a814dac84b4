//! Application configuration.
//!
//! Loads settings from config.json at startup. Every field has a default so a
//! partial (or missing) file still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::camera::gesture::TapThresholds;
use crate::camera::source::CameraConstraints;
use crate::ocr::preprocess::PreprocessStep;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Zoom input tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    /// Wheel mapping: `next = value * exp(-delta_y * wheel_sensitivity)`
    pub wheel_sensitivity: f32,
    /// Step used when the camera reports a step of zero
    pub fallback_step: f32,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            wheel_sensitivity: 0.002,
            fallback_step: 0.001,
        }
    }
}

/// Canvas sizing and sampling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Values above 1.0 sample a smaller central region of the frame
    pub overscan: f32,
    /// Upper bound on the device pixel ratio used for the canvas backing store
    pub max_dpr: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            overscan: 1.0,
            max_dpr: 2.0,
        }
    }
}

/// OCR engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language string (e.g. "jpn+eng")
    pub language: String,
    /// Tesseract page segmentation mode
    pub psm: u8,
    /// Filters applied to the snapshot before recognition, in order
    pub preprocess: Vec<PreprocessStep>,
    /// When several lines contain the tap, pick the one it sits deepest in
    pub prefer_deepest_box: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "jpn+eng".to_string(),
            psm: 11,
            preprocess: PreprocessStep::default_pipeline(),
            prefer_deepest_box: false,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Thresholds separating a tap from a drag or long press
    #[serde(default)]
    pub tap: TapThresholds,
    #[serde(default)]
    pub zoom: ZoomConfig,
    #[serde(default)]
    pub render: RenderConfig,
    /// Constraints requested when opening the camera
    #[serde(default)]
    pub camera: CameraConstraints,
    #[serde(default)]
    pub ocr: OcrConfig,
    /// Bounded size of the text → facility result cache
    #[serde(default = "default_match_cache_capacity")]
    pub match_cache_capacity: usize,
    /// Path of the facility directory JSON; defaults to resources/facilities.json
    #[serde(default)]
    pub directory_path: Option<PathBuf>,
    /// Saves every tap snapshot to the snapshots directory
    #[serde(default)]
    pub developer_mode: bool,
}

fn default_match_cache_capacity() -> usize {
    crate::facility::matcher::DEFAULT_CACHE_CAPACITY
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tap: TapThresholds::default(),
            zoom: ZoomConfig::default(),
            render: RenderConfig::default(),
            camera: CameraConstraints::default(),
            ocr: OcrConfig::default(),
            match_cache_capacity: default_match_cache_capacity(),
            directory_path: None,
            developer_mode: false,
        }
    }
}

impl AppConfig {
    /// Facility directory path, falling back to the bundled location.
    pub fn directory_path(&self) -> PathBuf {
        self.directory_path
            .clone()
            .unwrap_or_else(crate::paths::get_default_directory_path)
    }
}

/// Loads configuration from `path`, or returns defaults if it is missing or invalid.
pub fn load_config_from(path: &Path) -> AppConfig {
    log::info!("Looking for config at: {}", path.display());

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Config loaded from {}", path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            }
        }
    } else {
        log::info!("{} not found. Using default config.", path.display());
    }

    AppConfig::default()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config(path: Option<&Path>) {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(crate::paths::get_config_path);
    let _ = CONFIG.set(load_config_from(&path));
}

/// Returns a reference to the global configuration.
/// Falls back to defaults if called before init_config().
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(AppConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json"));

        assert_eq!(config.match_cache_capacity, 500);
        assert_eq!(config.tap.max_distance_px, 5.0);
        assert_eq!(config.tap.max_duration_ms, 250);
        assert_eq!(config.render.max_dpr, 2.0);
        assert!(!config.developer_mode);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "tap": { "max_distance_px": 8.0 }, "render": { "overscan": 1.25 } }"#,
        )
        .unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.tap.max_distance_px, 8.0);
        assert_eq!(config.tap.max_duration_ms, 250);
        assert_eq!(config.render.overscan, 1.25);
        assert_eq!(config.render.max_dpr, 2.0);
        assert_eq!(config.zoom.wheel_sensitivity, 0.002);
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.match_cache_capacity, 500);
    }
}
