//! Application configuration
//!
//! Settings are stored as JSON in the platform config directory
//! (`<config_dir>/SignDetection/config.json`). Every field has a default, so a
//! missing or partial file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::landmarks::LandmarkFallback;
use crate::telemetry::LogConfig;

/// Environment variable overriding [`ServiceSettings::base_url`]
pub const ENDPOINT_ENV: &str = "SIGN_DETECTION_ENDPOINT";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowSettings,
    pub camera: CameraSettings,
    pub tracker: TrackerSettings,
    pub service: ServiceSettings,
    pub detection: DetectionSettings,
    pub logging: LogConfig,
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub width: u32,
    pub height: u32,
    /// Redraw rate (15-120)
    pub target_fps: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            target_fps: 60,
        }
    }
}

/// Camera acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device index (0 for default)
    pub index: u32,
    /// Requested frame width
    pub width: u32,
    /// Requested frame height
    pub height: u32,
    /// How long to wait for the device to open before giving up
    pub open_timeout_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            open_timeout_ms: 5000,
        }
    }
}

impl CameraSettings {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

/// Hand landmark tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// ONNX model file name, looked up in `model_dir` or the `models` directory
    pub model_file: String,
    /// Explicit model directory
    pub model_dir: Option<PathBuf>,
    /// Minimum hand presence score (0.0-1.0)
    pub min_presence: f32,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            model_file: "hand_landmark_full.onnx".to_string(),
            model_dir: None,
            min_presence: 0.7,
            intra_threads: 2,
        }
    }
}

/// Prediction service endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Base URL of the prediction service
    pub base_url: String,
    /// Landmark prediction endpoint (`/predict` or `/api/predict`)
    pub predict_path: String,
    /// Server-side detection toggle endpoint (remote mode)
    pub toggle_path: String,
    /// MJPEG stream with server-rendered overlay (remote mode)
    pub video_feed_path: String,
    /// Per-request timeout
    pub timeout_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            predict_path: "/predict".to_string(),
            toggle_path: "/toggle_detection".to_string(),
            video_feed_path: "/video_feed".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl ServiceSettings {
    pub fn predict_url(&self) -> String {
        self.join(&self.predict_path)
    }

    pub fn toggle_url(&self) -> String {
        self.join(&self.toggle_path)
    }

    pub fn video_feed_url(&self) -> String {
        self.join(&self.video_feed_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn join(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

/// Where detection runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Local webcam and landmark tracker, landmarks posted to the service
    #[default]
    Local,
    /// The service owns the camera; we toggle it and show its MJPEG feed
    Remote,
}

/// Detection cycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub mode: DetectionMode,
    /// What to send for incomplete landmark sets
    pub fallback: LandmarkFallback,
    /// Minimum spacing between prediction requests
    pub min_predict_interval_ms: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Local,
            fallback: LandmarkFallback::Reject,
            min_predict_interval_ms: 250,
        }
    }
}

impl DetectionSettings {
    pub fn min_predict_interval(&self) -> Duration {
        Duration::from_millis(self.min_predict_interval_ms)
    }
}

impl AppConfig {
    /// Get the config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("SignDetection");
            p.push("config.json");
            p
        })
    }

    /// Load from the default location, falling back to defaults when the file
    /// does not exist. The endpoint environment override is applied last.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_endpoint_override(std::env::var(ENDPOINT_ENV).ok());
        Ok(config)
    }

    /// Load settings from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let mut config: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        config.sanitize();
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to_file(&path)?;
        Ok(path)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Parse)?;
        fs::write(path, json).map_err(ConfigError::Io)
    }

    /// Replace the service base URL if an override is set and non-empty
    pub fn apply_endpoint_override(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            tracing::info!(base_url = %url, "Prediction endpoint overridden from {}", ENDPOINT_ENV);
            self.service.base_url = url;
        }
    }

    /// Clamp values into their valid ranges
    pub fn sanitize(&mut self) {
        self.window.width = self.window.width.max(320);
        self.window.height = self.window.height.max(240);
        self.window.target_fps = self.window.target_fps.clamp(15, 120);
        self.camera.width = self.camera.width.max(1);
        self.camera.height = self.camera.height.max(1);
        self.camera.open_timeout_ms = self.camera.open_timeout_ms.max(100);
        self.tracker.min_presence = if self.tracker.min_presence.is_nan() {
            TrackerSettings::default().min_presence
        } else {
            self.tracker.min_presence.clamp(0.0, 1.0)
        };
        self.tracker.intra_threads = self.tracker.intra_threads.clamp(1, 16);
        self.service.timeout_ms = self.service.timeout_ms.max(100);
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("JSON error: {0}")]
    Parse(serde_json::Error),
    #[error("Could not find config directory")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.service.predict_url(), "http://localhost:5000/predict");
        assert_eq!(config.detection.mode, DetectionMode::Local);
        assert_eq!(config.detection.fallback, LandmarkFallback::Reject);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "service": { "base_url": "https://signs.example.com/", "predict_path": "api/predict" },
            "detection": { "mode": "remote", "fallback": "zero_vector" }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.service.predict_url(), "https://signs.example.com/api/predict");
        assert_eq!(config.service.toggle_url(), "https://signs.example.com/toggle_detection");
        assert_eq!(config.service.timeout_ms, 5000);
        assert_eq!(config.detection.mode, DetectionMode::Remote);
        assert_eq!(config.detection.fallback, LandmarkFallback::ZeroVector);
        assert_eq!(config.window, WindowSettings::default());
    }

    #[test]
    fn test_sanitize() {
        let mut config = AppConfig::default();
        config.window.target_fps = 1000;
        config.tracker.min_presence = 3.0;
        config.tracker.intra_threads = 0;
        config.service.timeout_ms = 0;
        config.sanitize();
        assert_eq!(config.window.target_fps, 120);
        assert_eq!(config.tracker.min_presence, 1.0);
        assert_eq!(config.tracker.intra_threads, 1);
        assert_eq!(config.service.timeout_ms, 100);

        config.tracker.min_presence = f32::NAN;
        config.sanitize();
        assert_eq!(config.tracker.min_presence, 0.7);
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = AppConfig::default();
        config.apply_endpoint_override(Some("  ".to_string()));
        assert_eq!(config.service.base_url, "http://localhost:5000");

        config.apply_endpoint_override(Some("http://10.0.0.2:8000".to_string()));
        assert_eq!(config.service.predict_url(), "http://10.0.0.2:8000/predict");

        config.apply_endpoint_override(None);
        assert_eq!(config.service.base_url, "http://10.0.0.2:8000");
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("sign-detection-config-{}", std::process::id()))
            .join("config.json");

        let mut config = AppConfig::default();
        config.camera.index = 2;
        config.detection.min_predict_interval_ms = 500;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
