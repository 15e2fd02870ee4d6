//! Render plans: a base track, overlay clips, and their insertions.
//!
//! The caller's insertion order carries no meaning. [`RenderPlan::schedule`]
//! establishes the canonical order (ascending start, ties by original list
//! position), resolves clip references, and fits every window inside the base
//! track. Anything it cannot use is dropped and reported as a [`PlanWarning`];
//! scheduling itself never fails.

use std::collections::BTreeMap;
use std::fmt;

use crate::insertion::Insertion;
use crate::track::{BaseTrack, OverlayClip};
use crate::PlanError;

/// Tolerance for "ends exactly at the base end" comparisons.
const WINDOW_EPSILON_SECS: f64 = 1e-6;

/// Everything one render job composites.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    base: BaseTrack,
    clips: BTreeMap<String, OverlayClip>,
    insertions: Vec<Insertion>,
}

/// An insertion that survived scheduling, in canonical order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledOverlay {
    /// Zero-based position in the canonical order.
    pub order: usize,

    /// Position of the insertion in the caller's list.
    pub source_index: usize,

    pub start_secs: f64,

    /// Visible duration after fitting to the base track.
    pub duration_secs: f64,

    pub clip: OverlayClip,
}

impl ScheduledOverlay {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// A non-fatal adjustment made while scheduling.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanWarning {
    /// The insertion names a clip the plan does not contain; it was dropped.
    UnresolvedOverlayReference {
        insertion_index: usize,
        clip_id: String,
    },

    /// Negative/non-finite start or non-positive duration; dropped.
    InvalidWindow {
        insertion_index: usize,
        start_secs: f64,
        duration_secs: f64,
    },

    /// The insertion starts at or after the end of the base track; dropped.
    StartsAfterBaseEnd {
        insertion_index: usize,
        start_secs: f64,
        base_duration_secs: f64,
    },

    /// The insertion ran past the base end and was shortened.
    ClampedToBaseEnd {
        insertion_index: usize,
        requested_secs: f64,
        clamped_secs: f64,
    },
}

impl PlanWarning {
    pub fn insertion_index(&self) -> usize {
        match self {
            Self::UnresolvedOverlayReference {
                insertion_index, ..
            }
            | Self::InvalidWindow {
                insertion_index, ..
            }
            | Self::StartsAfterBaseEnd {
                insertion_index, ..
            }
            | Self::ClampedToBaseEnd {
                insertion_index, ..
            } => *insertion_index,
        }
    }

    /// Whether the insertion was removed from the plan.
    pub fn is_drop(&self) -> bool {
        !matches!(self, Self::ClampedToBaseEnd { .. })
    }
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedOverlayReference {
                insertion_index,
                clip_id,
            } => write!(
                f,
                "insertion #{insertion_index} references unknown clip '{clip_id}', dropped"
            ),
            Self::InvalidWindow {
                insertion_index,
                start_secs,
                duration_secs,
            } => write!(
                f,
                "insertion #{insertion_index} has invalid window (start {start_secs}, duration {duration_secs}), dropped"
            ),
            Self::StartsAfterBaseEnd {
                insertion_index,
                start_secs,
                base_duration_secs,
            } => write!(
                f,
                "insertion #{insertion_index} starts at {start_secs:.3}s, after base end {base_duration_secs:.3}s, dropped"
            ),
            Self::ClampedToBaseEnd {
                insertion_index,
                requested_secs,
                clamped_secs,
            } => write!(
                f,
                "insertion #{insertion_index} shortened from {requested_secs:.3}s to {clamped_secs:.3}s to fit base track"
            ),
        }
    }
}

/// Result of [`RenderPlan::schedule`].
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub overlays: Vec<ScheduledOverlay>,
    pub warnings: Vec<PlanWarning>,
}

impl RenderPlan {
    /// Assemble a plan. Clip ids must be unique.
    pub fn new(
        base: BaseTrack,
        clips: impl IntoIterator<Item = OverlayClip>,
        insertions: Vec<Insertion>,
    ) -> Result<Self, PlanError> {
        let mut by_id = BTreeMap::new();
        for clip in clips {
            if by_id.contains_key(&clip.id) {
                return Err(PlanError::DuplicateClip { id: clip.id });
            }
            by_id.insert(clip.id.clone(), clip);
        }
        Ok(Self {
            base,
            clips: by_id,
            insertions,
        })
    }

    pub fn base(&self) -> &BaseTrack {
        &self.base
    }

    pub fn clip(&self, id: &str) -> Option<&OverlayClip> {
        self.clips.get(id)
    }

    pub fn clips(&self) -> impl Iterator<Item = &OverlayClip> {
        self.clips.values()
    }

    /// Insertions in the caller's order.
    pub fn insertions(&self) -> &[Insertion] {
        &self.insertions
    }

    /// Canonically order, resolve, and fit insertions to the base track.
    pub fn schedule(&self) -> Schedule {
        let base_end = self.base.duration_secs();
        let clamp_to_base = base_end.is_finite() && base_end > 0.0;

        let mut warnings = Vec::new();
        let mut accepted: Vec<(usize, f64, f64, &OverlayClip)> = Vec::new();

        for (index, insertion) in self.insertions.iter().enumerate() {
            if !insertion.has_valid_window() {
                warnings.push(PlanWarning::InvalidWindow {
                    insertion_index: index,
                    start_secs: insertion.start_secs,
                    duration_secs: insertion.duration_secs,
                });
                continue;
            }

            let Some(clip) = self.clips.get(&insertion.clip_id) else {
                warnings.push(PlanWarning::UnresolvedOverlayReference {
                    insertion_index: index,
                    clip_id: insertion.clip_id.clone(),
                });
                continue;
            };

            let mut duration = insertion.duration_secs;
            if clamp_to_base {
                if insertion.start_secs >= base_end - WINDOW_EPSILON_SECS {
                    warnings.push(PlanWarning::StartsAfterBaseEnd {
                        insertion_index: index,
                        start_secs: insertion.start_secs,
                        base_duration_secs: base_end,
                    });
                    continue;
                }
                if insertion.end_secs() > base_end + WINDOW_EPSILON_SECS {
                    duration = base_end - insertion.start_secs;
                    warnings.push(PlanWarning::ClampedToBaseEnd {
                        insertion_index: index,
                        requested_secs: insertion.duration_secs,
                        clamped_secs: duration,
                    });
                }
            }

            accepted.push((index, insertion.start_secs, duration, clip));
        }

        // Stable: equal starts keep list order.
        accepted.sort_by(|a, b| a.1.total_cmp(&b.1));

        let overlays = accepted
            .into_iter()
            .enumerate()
            .map(|(order, (source_index, start, duration, clip))| ScheduledOverlay {
                order,
                source_index,
                start_secs: start,
                duration_secs: duration,
                clip: clip.clone(),
            })
            .collect();

        Schedule { overlays, warnings }
    }
}
