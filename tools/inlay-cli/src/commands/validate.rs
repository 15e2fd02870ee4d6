//! Validate a timeline plan document.

use std::path::PathBuf;

use inlay_common::config::AppConfig;
use inlay_timeline_model::{IssueSeverity, TimelinePlan};

pub fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    println!("Validating plan at: {}", path.display());

    let plan =
        TimelinePlan::load(&path).map_err(|e| anyhow::anyhow!("Failed to load plan: {e}"))?;

    println!("  Version: {}", plan.version);
    println!("  A-roll duration: {:.2}s", plan.a_roll_duration_secs);
    println!("  Insertions: {}", plan.insertions.len());
    println!("  B-roll clips: {}", plan.b_rolls.len());

    let issues = plan.validate(&config.planning);
    if issues.is_empty() {
        println!("\nPlan is valid.");
        return Ok(());
    }

    println!("\nValidation issues:");
    for issue in &issues {
        println!("  - {issue}");
    }

    let errors = issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("{errors} error(s) found. Plan cannot be rendered.");
    }
    println!(
        "\n{} warning(s) found. Plan renders; affected insertions are adjusted or skipped.",
        issues.len()
    );
    Ok(())
}
