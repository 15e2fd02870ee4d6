//! Processing graph construction.
//!
//! A [`ProcessingGraph`] is an engine-agnostic DAG of typed nodes. Sources
//! are indexed inputs (the base track is always source 0, then one source
//! per scheduled overlay). Every node reads one or two streams and produces
//! exactly one labelled stream. Overlays are combined by a left fold:
//!
//! ```text
//! [0:v] ─ BasePrep ─ [base] ─────── Compose ─ [v0] ─ Compose ─ ... ─ [vout]
//!                                     │                 │
//! [1:v] ─ Normalize ─ [ov0] ─ TimeShift ─ [ov0s]        │
//! [2:v] ─ Normalize ─ [ov1] ─ TimeShift ─ [ov1s] ───────┘
//! ```
//!
//! With no overlays the graph collapses to a single pass-through node.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use inlay_common::config::RenderSettings;
use inlay_common::error::{InlayError, InlayResult};
use inlay_timeline_model::plan::{PlanWarning, RenderPlan};
use inlay_timeline_model::rate::FrameRate;

use crate::filtergraph;

/// Label of the stream every graph must finish with.
pub const OUTPUT_LABEL: &str = "vout";

/// Label produced by the base preparation node.
pub const BASE_LABEL: &str = "base";

/// A stream a node reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamRef {
    /// Video stream of the source at this input index.
    Source(usize),
    /// Output of an earlier node.
    Port(String),
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(index) => write!(f, "[{index}:v]"),
            Self::Port(label) => write!(f, "[{label}]"),
        }
    }
}

/// Fade-in/fade-out timing for one overlay, relative to its own start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeWindow {
    /// Length of each fade.
    pub transition_secs: f64,
    /// Fade-in start. Always zero.
    pub fade_in_start_secs: f64,
    /// Fade-out start, `max(0, duration - transition)`.
    pub fade_out_start_secs: f64,
}

impl FadeWindow {
    pub fn new(duration_secs: f64, transition_secs: f64) -> Self {
        let transition_secs = transition_secs.max(0.0);
        Self {
            transition_secs,
            fade_in_start_secs: 0.0,
            fade_out_start_secs: (duration_secs - transition_secs).max(0.0),
        }
    }

    /// Whether fades are applied at all.
    pub fn is_enabled(&self) -> bool {
        self.transition_secs > 0.0
    }

    /// Fade-in and fade-out overlap when the clip is shorter than two
    /// transitions. The result still renders; opacity never reaches 1.
    pub fn overlaps(&self) -> bool {
        self.is_enabled() && self.fade_out_start_secs < self.transition_secs
    }
}

/// What a node does.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Pin the base track's frame rate and pixel format.
    BasePrep {
        frame_rate: FrameRate,
        pixel_format: String,
    },

    /// Fit one overlay instance to the base frame and window.
    Normalize {
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        duration_secs: f64,
        fade: FadeWindow,
    },

    /// Move an overlay's first frame to its insertion start.
    TimeShift { offset_secs: f64 },

    /// Draw the second input over the first; the first drives duration.
    Compose,

    /// Hand the input through untouched.
    Output,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BasePrep { .. } => "base_prep",
            Self::Normalize { .. } => "normalize",
            Self::TimeShift { .. } => "time_shift",
            Self::Compose => "compose",
            Self::Output => "output",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Self::Compose => 2,
            _ => 1,
        }
    }
}

/// One node of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub kind: NodeKind,
    pub inputs: Vec<StreamRef>,
    pub output: String,
}

/// A validated processing graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingGraph {
    sources: Vec<PathBuf>,
    nodes: Vec<GraphNode>,
    frame_rate: FrameRate,
    duration_secs: f64,
}

impl ProcessingGraph {
    /// Input files in input-index order. Index 0 is the base track.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Nodes in topological (construction) order.
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    /// Label of the final video stream.
    pub fn output_label(&self) -> &str {
        OUTPUT_LABEL
    }

    /// Output frame rate, identical to the base track's.
    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// Output duration. The base track drives it.
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Whether the graph passes the base video through unchanged.
    pub fn is_passthrough(&self) -> bool {
        matches!(self.nodes.as_slice(), [node] if node.kind == NodeKind::Output)
    }

    pub fn count(&self, kind: &str) -> usize {
        self.nodes.iter().filter(|n| n.kind.name() == kind).count()
    }

    /// Render as an ffmpeg `-filter_complex` argument.
    pub fn to_filter_complex(&self) -> String {
        filtergraph::serialize(self)
    }

    /// Check every node reads only sources or earlier outputs, labels are
    /// unique, arities match, and the graph ends in [`OUTPUT_LABEL`].
    pub fn validate(&self) -> InlayResult<()> {
        let mut produced: HashSet<&str> = HashSet::new();

        for (index, node) in self.nodes.iter().enumerate() {
            if node.inputs.len() != node.kind.arity() {
                return Err(InlayError::render(format!(
                    "node #{index} ({}) has {} inputs, expected {}",
                    node.kind.name(),
                    node.inputs.len(),
                    node.kind.arity()
                )));
            }

            for input in &node.inputs {
                match input {
                    StreamRef::Source(source) if *source >= self.sources.len() => {
                        return Err(InlayError::render(format!(
                            "node #{index} reads missing source {source}"
                        )));
                    }
                    StreamRef::Port(label) if !produced.contains(label.as_str()) => {
                        return Err(InlayError::render(format!(
                            "node #{index} reads [{label}] before it is produced"
                        )));
                    }
                    _ => {}
                }
            }

            if !produced.insert(node.output.as_str()) {
                return Err(InlayError::render(format!(
                    "label [{}] produced twice",
                    node.output
                )));
            }
        }

        match self.nodes.last() {
            Some(last) if last.output == OUTPUT_LABEL => Ok(()),
            _ => Err(InlayError::render(format!(
                "graph does not end in [{OUTPUT_LABEL}]"
            ))),
        }
    }
}

/// Audit trail of one graph build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphReport {
    /// Overlay instances that made it into the graph.
    pub overlays: usize,
    /// Insertions dropped or adjusted while scheduling.
    pub warnings: Vec<PlanWarning>,
    /// Orders (zero-based) of overlays whose fades overlap.
    pub overlapping_fades: Vec<usize>,
}

impl GraphReport {
    pub fn dropped(&self) -> usize {
        self.warnings.iter().filter(|w| w.is_drop()).count()
    }
}

/// Builds processing graphs from render plans.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    transition_secs: f64,
    pixel_format: String,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::from_settings(&RenderSettings::default())
    }
}

impl GraphBuilder {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            transition_secs: settings.transition_secs,
            pixel_format: settings.encoding.pixel_format.clone(),
        }
    }

    pub fn with_transition(mut self, secs: f64) -> Self {
        self.transition_secs = secs;
        self
    }

    /// Build the graph for `plan`.
    ///
    /// Unresolvable or out-of-range insertions are left out and listed in
    /// the report; they never fail the build.
    pub fn build(&self, plan: &RenderPlan) -> InlayResult<(ProcessingGraph, GraphReport)> {
        let base = plan.base();
        let schedule = plan.schedule();

        for warning in &schedule.warnings {
            tracing::warn!(insertion = warning.insertion_index(), "{warning}");
        }

        let mut sources = vec![base.path().to_path_buf()];
        let mut nodes = Vec::new();
        let mut report = GraphReport {
            overlays: schedule.overlays.len(),
            warnings: schedule.warnings.clone(),
            overlapping_fades: vec![],
        };

        if schedule.overlays.is_empty() {
            nodes.push(GraphNode {
                kind: NodeKind::Output,
                inputs: vec![StreamRef::Source(0)],
                output: OUTPUT_LABEL.to_string(),
            });
        } else {
            nodes.push(GraphNode {
                kind: NodeKind::BasePrep {
                    frame_rate: base.frame_rate(),
                    pixel_format: self.pixel_format.clone(),
                },
                inputs: vec![StreamRef::Source(0)],
                output: BASE_LABEL.to_string(),
            });

            let last = schedule.overlays.len() - 1;
            let mut acc = StreamRef::Port(BASE_LABEL.to_string());

            for overlay in &schedule.overlays {
                let i = overlay.order;
                sources.push(overlay.clip.path.clone());

                let fade = FadeWindow::new(overlay.duration_secs, self.transition_secs);
                if fade.overlaps() {
                    report.overlapping_fades.push(i);
                }

                let normalized = format!("ov{i}");
                nodes.push(GraphNode {
                    kind: NodeKind::Normalize {
                        width: base.width(),
                        height: base.height(),
                        frame_rate: base.frame_rate(),
                        duration_secs: overlay.duration_secs,
                        fade,
                    },
                    inputs: vec![StreamRef::Source(sources.len() - 1)],
                    output: normalized.clone(),
                });

                let shifted = format!("ov{i}s");
                nodes.push(GraphNode {
                    kind: NodeKind::TimeShift {
                        offset_secs: overlay.start_secs,
                    },
                    inputs: vec![StreamRef::Port(normalized)],
                    output: shifted.clone(),
                });

                let composed = if i == last {
                    OUTPUT_LABEL.to_string()
                } else {
                    format!("v{i}")
                };
                nodes.push(GraphNode {
                    kind: NodeKind::Compose,
                    inputs: vec![acc, StreamRef::Port(shifted)],
                    output: composed.clone(),
                });
                acc = StreamRef::Port(composed);
            }
        }

        let graph = ProcessingGraph {
            sources,
            nodes,
            frame_rate: base.frame_rate(),
            duration_secs: base.duration_secs(),
        };
        graph.validate()?;

        tracing::debug!(
            nodes = graph.nodes.len(),
            overlays = report.overlays,
            dropped = report.dropped(),
            "Built processing graph"
        );

        Ok((graph, report))
    }
}
