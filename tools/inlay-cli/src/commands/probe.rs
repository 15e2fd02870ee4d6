//! Show media information.

use std::path::PathBuf;

use inlay_common::config::AppConfig;
use inlay_render_engine::{FfprobeProber, Prober};

pub fn run(config: &AppConfig, path: PathBuf, json: bool) -> anyhow::Result<()> {
    let info = FfprobeProber::from_config(&config.tools).probe(&path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Media: {}", path.display());
    println!("  Resolution: {}x{}", info.width, info.height);
    println!(
        "  Frame rate: {} ({:.3} fps)",
        info.frame_rate,
        info.frame_rate.as_f64()
    );
    println!("  Duration: {:.3}s", info.duration_secs);
    println!("  Frames: {}", info.frame_rate.frames_in(info.duration_secs));

    Ok(())
}
