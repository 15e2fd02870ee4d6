//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where rendered videos and saved plans are written.
    pub output_dir: PathBuf,

    /// External tool locations.
    pub tools: ToolPaths,

    /// Compositing and encoding settings.
    pub render: RenderSettings,

    /// Planning limits checked when validating timeline plans.
    pub planning: PlanningLimits,

    /// Remote media retrieval settings.
    pub acquisition: AcquisitionSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Where job workspaces are created. The system temp dir when unset.
    pub work_dir: Option<PathBuf>,
}

/// Paths (or bare names resolved through `PATH`) of the external tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

/// Compositing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Fade-in/fade-out length applied to every overlay, in seconds.
    pub transition_secs: f64,

    /// Fixed output encoding parameters.
    pub encoding: EncodingParams,
}

/// Output encoding parameters passed to the render engine verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingParams {
    /// Video encoder (e.g. "libx264").
    pub video_codec: String,

    /// Encoder preset.
    pub preset: String,

    /// Constant rate factor.
    pub crf: u32,

    /// Target video bitrate in kbps. `None` leaves rate control to CRF.
    pub video_bitrate_kbps: Option<u32>,

    /// Output pixel format.
    pub pixel_format: String,

    /// Audio encoder.
    pub audio_codec: String,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,

    /// Move the MP4 index to the front of the file.
    pub faststart: bool,
}

/// Limits the planning service is asked to respect.
///
/// The renderer does not enforce these; they are reported by plan validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningLimits {
    pub min_insertions: usize,
    pub max_insertions: usize,
    /// Minimum gap between the end of one insertion and the start of the next.
    pub min_gap_secs: f64,
}

/// Remote fetch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Whole-request timeout for a single download, in seconds.
    pub timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "inlay=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_outputs(),
            tools: ToolPaths::default(),
            render: RenderSettings::default(),
            planning: PlanningLimits::default(),
            acquisition: AcquisitionSettings::default(),
            logging: LoggingConfig::default(),
            work_dir: None,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            transition_secs: 0.3,
            encoding: EncodingParams::default(),
        }
    }
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 20,
            video_bitrate_kbps: None,
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
            faststart: true,
        }
    }
}

impl Default for PlanningLimits {
    fn default() -> Self {
        Self {
            min_insertions: 3,
            max_insertions: 6,
            min_gap_secs: 5.0,
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self { timeout_secs: 120 }
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

impl RenderSettings {
    /// Reject fade lengths that cannot be expressed as a filter window.
    pub fn validate_transition(secs: f64) -> Result<(), crate::error::InlayError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(crate::error::InlayError::config(format!(
                "transition must be a non-negative number of seconds, got {secs}"
            )));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
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

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&config_path, json)?;
        Ok(config_path)
    }

    /// Check values that would otherwise produce a broken render graph.
    pub fn validate(&self) -> Result<(), crate::error::InlayError> {
        RenderSettings::validate_transition(self.render.transition_secs)?;
        if self.planning.min_insertions > self.planning.max_insertions {
            return Err(crate::error::InlayError::config(
                "planning.min_insertions exceeds planning.max_insertions",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("inlay").join("config.json")
}

/// Default output directory.
fn dirs_default_outputs() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("inlay").join("outputs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_encoding() {
        let config = AppConfig::default();
        assert_eq!(config.render.encoding.video_codec, "libx264");
        assert_eq!(config.render.encoding.crf, 20);
        assert_eq!(config.render.encoding.audio_bitrate_kbps, 192);
        assert!(config.render.encoding.faststart);
        assert!((config.render.transition_secs - 0.3).abs() < 1e-9);
        assert!((config.planning.min_gap_secs - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "render": { "transition_secs": 0.5 } }"#).unwrap();
        assert!((parsed.render.transition_secs - 0.5).abs() < 1e-9);
        assert_eq!(parsed.render.encoding, EncodingParams::default());
        assert_eq!(parsed.tools, ToolPaths::default());
    }

    #[test]
    fn test_validate_rejects_negative_transition() {
        let mut config = AppConfig::default();
        config.render.transition_secs = -0.1;
        assert!(config.validate().is_err());

        config.render.transition_secs = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_transition_override() {
        assert!(RenderSettings::validate_transition(0.5).is_ok());
        assert!(RenderSettings::validate_transition(0.0).is_ok());
        assert!(RenderSettings::validate_transition(-0.2).is_err());
        assert!(RenderSettings::validate_transition(f64::NAN).is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
