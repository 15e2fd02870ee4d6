//! Check that the external tools are installed.

use inlay_common::config::{config_file_path, AppConfig};
use inlay_render_engine::{FfprobeProber, RenderExecutor};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Inlay System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg_ok = RenderExecutor::from_config(&config.tools).is_available();
    report("ffmpeg", ffmpeg_ok, &config.tools.ffmpeg.display().to_string());

    let ffprobe_ok = FfprobeProber::from_config(&config.tools).is_available();
    report("ffprobe", ffprobe_ok, &config.tools.ffprobe.display().to_string());

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] Config: defaults (no file at {})", config_path.display());
    }
    println!("[INFO] Output directory: {}", config.output_dir.display());

    println!();
    if ffmpeg_ok && ffprobe_ok {
        println!("All required tools are available. Inlay is ready.");
    } else {
        println!("Some required tools are missing. Install ffmpeg or set tools paths in config.");
    }

    Ok(())
}

fn report(name: &str, ok: bool, location: &str) {
    if ok {
        println!("[OK] {name}: {location}");
    } else {
        println!("[MISSING] {name}: {location}");
    }
}
