//! Local media sources taking part in a render job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::rate::FrameRate;

/// The primary narrated video. Its geometry, rate and audio define the output.
///
/// Built from probe results; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseTrack {
    path: PathBuf,
    width: u32,
    height: u32,
    frame_rate: FrameRate,
    duration_secs: f64,
}

impl BaseTrack {
    pub fn new(
        path: impl Into<PathBuf>,
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        duration_secs: f64,
    ) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            frame_rate,
            duration_secs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

/// A secondary clip that insertions place over the base track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayClip {
    /// Identifier unique within one job.
    pub id: String,

    /// Local file path.
    pub path: PathBuf,

    /// Known duration in seconds, if the planner reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,

    /// Free text carried along for traceability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OverlayClip {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            duration_secs: None,
            description: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}
