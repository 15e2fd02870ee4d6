//! Show timeline plan information.

use std::path::PathBuf;

use inlay_timeline_model::TimelinePlan;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let plan =
        TimelinePlan::load(&path).map_err(|e| anyhow::anyhow!("Failed to load plan: {e}"))?;

    println!("Plan: {}", path.display());
    println!("  Version: {}", plan.version);
    println!();

    println!("A-roll:");
    match &plan.a_roll {
        Some(a_roll) => {
            println!("  URL: {}", a_roll.url);
            if !a_roll.metadata.is_empty() {
                println!("  Metadata: {}", a_roll.metadata);
            }
        }
        None => println!("  URL: (not set, pass --base when rendering)"),
    }
    println!("  Duration: {:.2}s", plan.a_roll_duration_secs);
    println!("  Transcript segments: {}", plan.transcript.len());
    println!();

    println!("B-roll clips:");
    for clip in &plan.b_rolls {
        let duration = clip
            .duration_secs
            .map(|d| format!("{d:.1}s"))
            .unwrap_or_else(|| "?".to_string());
        println!("  {} ({duration}): {}", clip.id, clip.url);
    }
    println!();

    let mut insertions: Vec<_> = plan.insertions.iter().collect();
    insertions.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));

    println!("Insertions:");
    for insertion in insertions {
        let confidence = insertion
            .confidence
            .map(|c| format!(" [{:.0}%]", c * 100.0))
            .unwrap_or_default();
        println!(
            "  {:>7.2}s - {:>7.2}s  {}{confidence}",
            insertion.start_secs,
            insertion.end_secs(),
            insertion.clip_id
        );
        if let Some(reason) = &insertion.reason {
            println!("             {reason}");
        }
    }

    Ok(())
}
