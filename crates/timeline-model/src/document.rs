//! The timeline plan document (`timeline_plan.json`).
//!
//! This is the job artifact exchanged with the planning service: where the
//! media lives, what was said, and where each B-roll clip goes. It is written
//! as pretty JSON and reads back into an identical value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use inlay_common::config::PlanningLimits;
use serde::{Deserialize, Serialize};

use crate::insertion::Insertion;
use crate::plan::RenderPlan;
use crate::track::{BaseTrack, OverlayClip};

/// Current document schema version.
pub const PLAN_SCHEMA_VERSION: &str = "1.0";

/// Top-level plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePlan {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Where the base (A-roll) video comes from. Older documents omit it and
    /// rely on the caller to supply the reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_roll: Option<BaseSource>,

    /// Base track duration reported by the planner, in seconds.
    #[serde(rename = "a_roll_duration")]
    pub a_roll_duration_secs: f64,

    /// Timestamped transcript of the base track.
    #[serde(default)]
    pub transcript: Vec<TranscriptSegment>,

    /// Overlay placements, in whatever order the planner produced them.
    pub insertions: Vec<Insertion>,

    /// Available overlay clips.
    #[serde(default)]
    pub b_rolls: Vec<ClipSource>,
}

/// Remote or local reference to the base video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSource {
    pub url: String,

    #[serde(default)]
    pub metadata: String,

    #[serde(
        rename = "duration_sec",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_secs: Option<f64>,
}

/// Remote or local reference to one overlay clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSource {
    pub id: String,

    pub url: String,

    #[serde(default)]
    pub metadata: String,

    #[serde(
        rename = "duration_sec",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_secs: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_description: Option<String>,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    #[serde(rename = "start_sec")]
    pub start_secs: f64,
    #[serde(rename = "end_sec")]
    pub end_secs: f64,
    pub text: String,
}

fn default_version() -> String {
    PLAN_SCHEMA_VERSION.to_string()
}

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueSeverity {
    /// The plan cannot be rendered as written.
    Error,
    /// The plan renders, but not the way the planner intended.
    Warning,
}

/// A finding from [`TimelinePlan::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl PlanIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
        };
        write!(f, "{label}: {}", self.message)
    }
}

impl TimelinePlan {
    /// An empty plan for a base track of the given duration.
    pub fn new(a_roll_duration_secs: f64) -> Self {
        Self {
            version: default_version(),
            a_roll: None,
            a_roll_duration_secs,
            transcript: vec![],
            insertions: vec![],
            b_rolls: vec![],
        }
    }

    /// Load a plan document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| PlanError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| PlanError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save the plan as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PlanError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PlanError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| PlanError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(|e| PlanError::IoError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Look up a clip source by id.
    pub fn clip(&self, id: &str) -> Option<&ClipSource> {
        self.b_rolls.iter().find(|clip| clip.id == id)
    }

    /// Ids of clips that at least one insertion references and that exist.
    pub fn referenced_clips(&self) -> Vec<&ClipSource> {
        let wanted: BTreeSet<&str> = self
            .insertions
            .iter()
            .map(|insertion| insertion.clip_id.as_str())
            .collect();
        self.b_rolls
            .iter()
            .filter(|clip| wanted.contains(clip.id.as_str()))
            .collect()
    }

    /// Combine this document with local media into a [`RenderPlan`].
    ///
    /// `clip_paths` maps clip ids to acquired files. Clips without an entry
    /// are left out, so insertions naming them are dropped at scheduling.
    pub fn to_render_plan(
        &self,
        base: BaseTrack,
        clip_paths: &BTreeMap<String, PathBuf>,
    ) -> Result<RenderPlan, PlanError> {
        let clips = self.b_rolls.iter().filter_map(|source| {
            let path = clip_paths.get(&source.id)?;
            let mut clip = OverlayClip::new(source.id.clone(), path.clone());
            if let Some(secs) = source.duration_secs {
                clip = clip.with_duration(secs);
            }
            let description = source
                .enhanced_description
                .as_deref()
                .unwrap_or(&source.metadata);
            if !description.is_empty() {
                clip = clip.with_description(description);
            }
            Some(clip)
        });
        RenderPlan::new(base, clips, self.insertions.clone())
    }

    /// Check the plan against structural rules and the planning limits.
    ///
    /// Errors make the document unusable (duplicate clip ids). Everything the
    /// renderer can recover from by dropping or clamping is a warning.
    pub fn validate(&self, limits: &PlanningLimits) -> Vec<PlanIssue> {
        let mut issues = vec![];

        let mut seen = BTreeSet::new();
        for clip in &self.b_rolls {
            if !seen.insert(clip.id.as_str()) {
                issues.push(PlanIssue::error(format!("duplicate clip id '{}'", clip.id)));
            }
            if clip.url.trim().is_empty() {
                issues.push(PlanIssue::error(format!("clip '{}' has no url", clip.id)));
            }
        }

        if !self.a_roll_duration_secs.is_finite() || self.a_roll_duration_secs <= 0.0 {
            issues.push(PlanIssue::warning(format!(
                "a_roll_duration is not positive ({})",
                self.a_roll_duration_secs
            )));
        }

        for (index, insertion) in self.insertions.iter().enumerate() {
            if !insertion.has_valid_window() {
                issues.push(PlanIssue::warning(format!(
                    "insertion #{index} has invalid window (start {}, duration {})",
                    insertion.start_secs, insertion.duration_secs
                )));
                continue;
            }
            if self.clip(&insertion.clip_id).is_none() {
                issues.push(PlanIssue::warning(format!(
                    "insertion #{index} references unknown clip '{}'",
                    insertion.clip_id
                )));
            }
            if self.a_roll_duration_secs > 0.0 && insertion.end_secs() > self.a_roll_duration_secs
            {
                issues.push(PlanIssue::warning(format!(
                    "insertion #{index} ends at {:.3}s, past the base end {:.3}s",
                    insertion.end_secs(),
                    self.a_roll_duration_secs
                )));
            }
        }

        let count = self.insertions.len();
        if count < limits.min_insertions {
            issues.push(PlanIssue::warning(format!(
                "{count} insertion(s), fewer than the planning minimum of {}",
                limits.min_insertions
            )));
        }
        if count > limits.max_insertions {
            issues.push(PlanIssue::warning(format!(
                "{count} insertion(s), more than the planning maximum of {}",
                limits.max_insertions
            )));
        }

        let mut ordered: Vec<&Insertion> = self
            .insertions
            .iter()
            .filter(|insertion| insertion.has_valid_window())
            .collect();
        ordered.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
        for pair in ordered.windows(2) {
            let gap = pair[1].start_secs - pair[0].end_secs();
            if gap < limits.min_gap_secs {
                issues.push(PlanIssue::warning(format!(
                    "gap of {gap:.2}s between insertions at {:.2}s and {:.2}s is below the {:.2}s minimum",
                    pair[0].start_secs, pair[1].start_secs, limits.min_gap_secs
                )));
            }
        }

        issues
    }
}

/// Errors that can occur when working with plans.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Duplicate overlay clip id '{id}'")]
    DuplicateClip { id: String },
}

impl From<PlanError> for inlay_common::error::InlayError {
    fn from(err: PlanError) -> Self {
        inlay_common::error::InlayError::plan(err.to_string())
    }
}
