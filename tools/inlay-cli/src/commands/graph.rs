//! Print the processing graph and ffmpeg command for a plan without rendering.

use std::collections::BTreeMap;
use std::path::PathBuf;

use inlay_common::config::{AppConfig, RenderSettings};
use inlay_render_engine::{
    FfprobeProber, GraphBuilder, MediaRef, NodeKind, Prober, RenderExecutor, RenderInvocation,
};
use inlay_timeline_model::TimelinePlan;

pub fn run(
    config: &AppConfig,
    plan_path: PathBuf,
    base: PathBuf,
    transition: Option<f64>,
) -> anyhow::Result<()> {
    config.validate()?;
    if let Some(secs) = transition {
        RenderSettings::validate_transition(secs)?;
    }

    let plan = TimelinePlan::load(&plan_path)
        .map_err(|e| anyhow::anyhow!("Failed to load plan: {e}"))?;

    let info = FfprobeProber::from_config(&config.tools).probe(&base)?;

    // Remote clips are shown by URL; nothing is downloaded here.
    let clip_paths: BTreeMap<String, PathBuf> = plan
        .b_rolls
        .iter()
        .map(|clip| {
            let path = match MediaRef::parse(&clip.url) {
                MediaRef::Local(path) => path,
                MediaRef::Remote(url) => PathBuf::from(url),
            };
            (clip.id.clone(), path)
        })
        .collect();

    let render_plan = plan.to_render_plan(info.into_base_track(&base), &clip_paths)?;

    let mut builder = GraphBuilder::from_settings(&config.render);
    if let Some(secs) = transition {
        builder = builder.with_transition(secs);
    }
    let (graph, report) = builder.build(&render_plan)?;

    println!("Sources:");
    for (index, source) in graph.sources().iter().enumerate() {
        println!("  [{index}] {}", source.display());
    }
    println!();

    println!("Nodes:");
    for node in graph.nodes() {
        let inputs: Vec<String> = node.inputs.iter().map(ToString::to_string).collect();
        let detail = match &node.kind {
            NodeKind::TimeShift { offset_secs } => format!(" (+{offset_secs:.3}s)"),
            NodeKind::Normalize {
                duration_secs,
                fade,
                ..
            } => format!(
                " ({duration_secs:.3}s, fade-out at {:.3}s)",
                fade.fade_out_start_secs
            ),
            _ => String::new(),
        };
        println!(
            "  {:<10} {} -> [{}]{detail}",
            node.kind.name(),
            inputs.join(""),
            node.output
        );
    }
    println!();

    if !report.warnings.is_empty() {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
        println!();
    }

    let output = config.output_dir.join("preview.mp4");
    let invocation = RenderInvocation::from_graph(&graph, &config.render.encoding, output);
    let executor = RenderExecutor::from_config(&config.tools);

    println!("filter_complex:");
    println!("  {}", graph.to_filter_complex());
    println!();
    println!("Command:");
    println!("  {}", invocation.command_line(executor.program()));

    Ok(())
}
