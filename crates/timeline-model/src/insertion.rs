//! Scheduled placements of overlay clips on the base timeline.

use serde::{Deserialize, Serialize};

/// One overlay placement produced by the planning service.
///
/// Field names on the wire follow the planner's output (`start_sec`,
/// `duration_sec`, `broll_id`) so its documents are read as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insertion {
    /// Start offset from the beginning of the base track, in seconds.
    #[serde(rename = "start_sec")]
    pub start_secs: f64,

    /// Visible duration in seconds.
    #[serde(rename = "duration_sec")]
    pub duration_secs: f64,

    /// Id of the overlay clip to show.
    #[serde(rename = "broll_id")]
    pub clip_id: String,

    /// Planner confidence. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Planner justification. Opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Insertion {
    pub fn new(start_secs: f64, duration_secs: f64, clip_id: impl Into<String>) -> Self {
        Self {
            start_secs,
            duration_secs,
            clip_id: clip_id.into(),
            confidence: None,
            reason: None,
        }
    }

    pub fn with_audit(mut self, confidence: f64, reason: impl Into<String>) -> Self {
        self.confidence = Some(confidence);
        self.reason = Some(reason.into());
        self
    }

    /// End of the visible window on the base timeline.
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }

    /// Finite, non-negative start and finite, strictly positive duration.
    pub fn has_valid_window(&self) -> bool {
        self.start_secs.is_finite()
            && self.start_secs >= 0.0
            && self.duration_secs.is_finite()
            && self.duration_secs > 0.0
    }
}
