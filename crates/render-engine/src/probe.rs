//! Media probing.
//!
//! The render pipeline only needs four facts about a file: frame width,
//! frame height, exact frame rate and duration. [`FfprobeProber`] gets them
//! from `ffprobe`'s JSON output; [`StaticProber`] returns fixed values so
//! graph construction can run without the tool installed.

use std::path::{Path, PathBuf};
use std::process::Command;

use inlay_common::config::ToolPaths;
use inlay_common::error::{InlayError, InlayResult};
use inlay_timeline_model::rate::FrameRate;
use inlay_timeline_model::track::BaseTrack;
use serde::{Deserialize, Serialize};

/// Properties of the first video stream of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub duration_secs: f64,
}

impl MediaInfo {
    /// Turn probe results into the base track of a render plan.
    pub fn into_base_track(self, path: impl Into<PathBuf>) -> BaseTrack {
        BaseTrack::new(
            path,
            self.width,
            self.height,
            self.frame_rate,
            self.duration_secs,
        )
    }
}

/// Something that can report [`MediaInfo`] for a local file.
pub trait Prober: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Probe `path`. Fails if the file is missing, unreadable, or has no
    /// video stream.
    fn probe(&self, path: &Path) -> InlayResult<MediaInfo>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Use the configured ffprobe location.
    pub fn from_config(tools: &ToolPaths) -> Self {
        Self::new(tools.ffprobe.clone())
    }

    /// Find ffprobe on `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffprobe").ok().map(Self::new)
    }

    pub fn is_available(&self) -> bool {
        which::which(&self.ffprobe_path).is_ok()
    }
}

impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, path: &Path) -> InlayResult<MediaInfo> {
        if !path.is_file() {
            return Err(InlayError::probe(path, "file does not exist"));
        }

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=codec_type,width,height,r_frame_rate,avg_frame_rate,duration:format=duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| {
                InlayError::probe(
                    path,
                    format!("failed to run {}: {e}", self.ffprobe_path.display()),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InlayError::probe(
                path,
                format!("ffprobe exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info = parse_ffprobe_json(path, &stdout)?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            frame_rate = %info.frame_rate,
            duration_secs = info.duration_secs,
            "Probed media"
        );
        Ok(info)
    }
}

/// A prober that reports the same geometry for every existing file.
#[derive(Debug, Clone)]
pub struct StaticProber {
    info: MediaInfo,
}

impl StaticProber {
    pub fn new(info: MediaInfo) -> Self {
        Self { info }
    }
}

impl Prober for StaticProber {
    fn name(&self) -> &'static str {
        "static"
    }

    fn probe(&self, path: &Path) -> InlayResult<MediaInfo> {
        if !path.exists() {
            return Err(InlayError::probe(path, "file does not exist"));
        }
        Ok(self.info.clone())
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Map ffprobe JSON output (`-of json`) to [`MediaInfo`].
pub fn parse_ffprobe_json(path: &Path, json: &str) -> InlayResult<MediaInfo> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| InlayError::probe(path, format!("ffprobe JSON parse error: {e}")))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or_else(|| InlayError::probe(path, "no video stream"))?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(InlayError::probe(
            path,
            format!("invalid frame size {width}x{height}"),
        ));
    }

    let frame_rate = [&stream.r_frame_rate, &stream.avg_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|text| FrameRate::parse(text).ok())
        .ok_or_else(|| InlayError::probe(path, "no usable frame rate"))?;

    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_duration)
        .or_else(|| stream.duration.as_deref().and_then(parse_duration))
        .ok_or_else(|| InlayError::probe(path, "no duration reported"))?;

    Ok(MediaInfo {
        width,
        height,
        frame_rate,
        duration_secs,
    })
}

fn parse_duration(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}
