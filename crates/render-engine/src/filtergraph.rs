//! ffmpeg `filter_complex` text for a [`ProcessingGraph`].

use crate::graph::{FadeWindow, GraphNode, NodeKind, ProcessingGraph};

/// Pixel format for overlays while they carry fade alpha.
const OVERLAY_ALPHA_FORMAT: &str = "yuva420p";

/// Serialize every node, in order, separated by `;`.
pub fn serialize(graph: &ProcessingGraph) -> String {
    graph
        .nodes()
        .iter()
        .map(node_chain)
        .collect::<Vec<_>>()
        .join(";")
}

fn node_chain(node: &GraphNode) -> String {
    let inputs: String = node.inputs.iter().map(ToString::to_string).collect();
    format!("{inputs}{}[{}]", filters(&node.kind), node.output)
}

fn filters(kind: &NodeKind) -> String {
    match kind {
        NodeKind::BasePrep {
            frame_rate,
            pixel_format,
        } => format!("fps={frame_rate},format={pixel_format}"),

        NodeKind::Normalize {
            width,
            height,
            frame_rate,
            duration_secs,
            fade,
        } => {
            let mut chain = vec![
                format!("fps={frame_rate}"),
                format!("scale={width}:{height}:force_original_aspect_ratio=decrease"),
                format!("pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black"),
                "setpts=PTS-STARTPTS".to_string(),
                format!("trim=duration={}", format_secs(*duration_secs)),
                "setpts=PTS-STARTPTS".to_string(),
                format!("format={OVERLAY_ALPHA_FORMAT}"),
            ];
            chain.extend(fade_filters(fade));
            chain.join(",")
        }

        NodeKind::TimeShift { offset_secs } => {
            format!("setpts=PTS+{}/TB", format_secs(*offset_secs))
        }

        NodeKind::Compose => "overlay=0:0:eof_action=pass".to_string(),

        NodeKind::Output => "null".to_string(),
    }
}

fn fade_filters(fade: &FadeWindow) -> Vec<String> {
    if !fade.is_enabled() {
        return vec![];
    }
    let d = format_secs(fade.transition_secs);
    vec![
        format!(
            "fade=t=in:st={}:d={d}:alpha=1",
            format_secs(fade.fade_in_start_secs)
        ),
        format!(
            "fade=t=out:st={}:d={d}:alpha=1",
            format_secs(fade.fade_out_start_secs)
        ),
    ]
}

/// Seconds with at most microsecond precision and no trailing zeros.
pub fn format_secs(secs: f64) -> String {
    let text = format!("{secs:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
