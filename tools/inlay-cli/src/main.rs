//! Inlay CLI: command-line interface for rendering B-roll composites.
//!
//! Usage:
//!   inlay render <PLAN>       Render a timeline plan to video
//!   inlay graph <PLAN>        Print the processing graph and ffmpeg command
//!   inlay probe <FILE>        Show media information
//!   inlay validate <PLAN>     Validate a timeline plan document
//!   inlay info <PLAN>         Summarize a timeline plan document
//!   inlay check               Check for required tools
//!   inlay config              Show or write configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use inlay_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "inlay",
    about = "Composite planned B-roll over a narrated video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a timeline plan to a video file
    Render {
        /// Path to timeline_plan.json
        plan: PathBuf,

        /// Base video URL or path (defaults to the plan's a_roll.url)
        #[arg(long)]
        base: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fade length in seconds (overrides config)
        #[arg(long)]
        transition: Option<f64>,
    },

    /// Build the processing graph for a local base video and print it
    Graph {
        /// Path to timeline_plan.json
        plan: PathBuf,

        /// Local base video path
        #[arg(long)]
        base: PathBuf,

        /// Fade length in seconds (overrides config)
        #[arg(long)]
        transition: Option<f64>,
    },

    /// Probe a media file
    Probe {
        /// Path to the media file
        path: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a timeline plan document
    Validate {
        /// Path to timeline_plan.json
        plan: PathBuf,
    },

    /// Show timeline plan information
    Info {
        /// Path to timeline_plan.json
        plan: PathBuf,
    },

    /// Check for ffmpeg and ffprobe
    Check,

    /// Show the effective configuration
    Config {
        /// Write the default configuration file
        #[arg(long)]
        write_default: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    inlay_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Render {
            plan,
            base,
            output,
            transition,
        } => commands::render::run(config, plan, base, output, transition).await,
        Commands::Graph {
            plan,
            base,
            transition,
        } => commands::graph::run(&config, plan, base, transition),
        Commands::Probe { path, json } => commands::probe::run(&config, path, json),
        Commands::Validate { plan } => commands::validate::run(&config, plan),
        Commands::Info { plan } => commands::info::run(plan),
        Commands::Check => commands::check::run(&config),
        Commands::Config { write_default } => commands::config::run(config, write_default),
    }
}
