//! Render a timeline plan to video.

use std::io::Write;
use std::path::PathBuf;

use inlay_common::config::{AppConfig, RenderSettings};
use inlay_render_engine::{CancelFlag, ProgressCallback, RenderRequest, RenderStage, Renderer};
use inlay_timeline_model::TimelinePlan;

pub async fn run(
    config: AppConfig,
    plan_path: PathBuf,
    base: Option<String>,
    output: Option<PathBuf>,
    transition: Option<f64>,
) -> anyhow::Result<()> {
    config.validate()?;
    if let Some(secs) = transition {
        RenderSettings::validate_transition(secs)?;
    }

    println!("Rendering plan: {}", plan_path.display());
    let plan = TimelinePlan::load(&plan_path)
        .map_err(|e| anyhow::anyhow!("Failed to load plan: {e}"))?;

    let output_path = output.unwrap_or_else(|| {
        let stem = plan_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "timeline_plan".to_string());
        config.output_dir.join(format!("{stem}_final.mp4"))
    });

    let mut request = RenderRequest::new(&output_path);
    if let Some(base) = base {
        request = request.with_base(base);
    }
    if let Some(secs) = transition {
        request = request.with_transition(secs);
    }

    println!("  Output: {}", output_path.display());
    println!("  Insertions: {}", plan.insertions.len());
    println!("  B-roll clips: {}", plan.b_rolls.len());

    let cancel = CancelFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling...");
            ctrl_c_flag.cancel();
        }
    });

    let progress_cb: ProgressCallback = Box::new(|p| {
        match p.stage {
            RenderStage::Acquiring => print!("\r  Fetching media...  "),
            RenderStage::Preparing => {
                print!("\r  Preparing render ({} frames)...  ", p.total_frames)
            }
            _ => print!(
                "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                p.progress * 100.0,
                p.frames_rendered,
                p.total_frames,
                p.eta_secs,
            ),
        }
        let _ = std::io::stdout().flush();
    });

    let renderer = Renderer::new(config);
    match renderer
        .render_timeline_plan(&plan, request, Some(progress_cb), cancel)
        .await
    {
        Ok(outcome) => {
            println!("\nRender complete: {}", outcome.output_path.display());
            println!("  Job: {}", outcome.job_id);
            println!("  Overlays: {}", outcome.report.overlays);
            for warning in &outcome.report.warnings {
                println!("  [WARN] {warning}");
            }
            if !outcome.report.overlapping_fades.is_empty() {
                println!(
                    "  [WARN] {} overlay(s) shorter than two transitions; fades overlap",
                    outcome.report.overlapping_fades.len()
                );
            }
            println!("  Elapsed: {:.1}s", outcome.elapsed.as_secs_f64());
            Ok(())
        }
        Err(e) => {
            println!();
            Err(anyhow::anyhow!("Render failed: {e}"))
        }
    }
}
