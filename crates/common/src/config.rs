//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PosecapError, PosecapResult};

/// Default file name of the keypoint export.
pub const DEFAULT_EXPORT_FILE_NAME: &str = "keypoints_with_scores.csv";

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where recordings and exports are written.
    pub output_dir: PathBuf,

    /// Capture session settings.
    pub capture: CaptureConfig,

    /// Overlay styling.
    pub style: StyleConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Capture session parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Pose model identifier (`movenet`, `posenet`, `blazepose`).
    pub model: String,

    /// Minimum keypoint score to draw or export a keypoint.
    ///
    /// One value shared by the renderer and the recording session.
    pub score_threshold: f64,

    /// File name of the tabular keypoint export.
    pub export_file_name: String,

    /// File name of the encoded video.
    pub video_file_name: String,

    /// Frame rate advertised to the encoder.
    pub fps: u32,

    /// Drawing surface width in pixels.
    pub width: u32,

    /// Drawing surface height in pixels.
    pub height: u32,

    /// Delay between capture-sink completion and serialization, letting the
    /// last buffered media data settle.
    pub export_flush_delay_ms: u64,
}

/// Overlay styling. Purely visual.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub line_width: f64,
    pub point_radius: f64,
    /// Color of middle-group keypoints and all skeleton edges (`#rrggbb`).
    pub middle_color: String,
    pub left_color: String,
    pub right_color: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "posecap=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            capture: CaptureConfig::default(),
            style: StyleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            model: "movenet".to_string(),
            score_threshold: 0.0,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
            video_file_name: "recording.webm".to_string(),
            fps: 30,
            width: 640,
            height: 480,
            export_flush_delay_ms: 1000,
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            line_width: 2.0,
            point_radius: 4.0,
            middle_color: "#ffffff".to_string(),
            left_color: "#008000".to_string(),
            right_color: "#ffa500".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match Self::from_json(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(content: &str) -> PosecapResult<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    pub fn validate(&self) -> PosecapResult<()> {
        self.capture.validate()?;
        self.style.validate()
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> PosecapResult<()> {
        let t = self.score_threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(PosecapError::config(format!(
                "score_threshold must be within [0, 1], got {t}"
            )));
        }
        if self.fps == 0 {
            return Err(PosecapError::config("fps must be positive"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(PosecapError::config(format!(
                "Invalid surface size {}x{}",
                self.width, self.height
            )));
        }
        if self.export_file_name.trim().is_empty() {
            return Err(PosecapError::config("export_file_name is empty"));
        }
        Ok(())
    }
}

impl StyleConfig {
    pub fn validate(&self) -> PosecapResult<()> {
        for (field, value) in [
            ("middle_color", &self.middle_color),
            ("left_color", &self.left_color),
            ("right_color", &self.right_color),
        ] {
            if !is_hex_color(value) {
                return Err(PosecapError::config(format!(
                    "{field} must be a #rrggbb color, got {value:?}"
                )));
            }
        }
        if !(self.line_width.is_finite() && self.line_width > 0.0) {
            return Err(PosecapError::config("line_width must be positive"));
        }
        if !(self.point_radius.is_finite() && self.point_radius > 0.0) {
            return Err(PosecapError::config("point_radius must be positive"));
        }
        Ok(())
    }
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("posecap").join("config.json")
}
