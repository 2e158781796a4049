//! barpath CLI: barbell velocity analysis from lift videos.
//!
//! Usage:
//!   barpath analyze <VIDEO>    Track the bar and report velocity metrics
//!   barpath probe <VIDEO>      Show duration, dimensions and frame rate
//!   barpath check              Check for ffmpeg and ffprobe
//!   barpath config             Print or write the default configuration

use std::path::PathBuf;

use barpath_common::config::AppConfig;
use clap::{Parser, Subcommand};

mod commands;

use commands::analyze::AnalyzeArgs;

#[derive(Parser)]
#[command(
    name = "barpath",
    about = "Velocity-based training metrics from barbell lift videos",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a lift video
    Analyze(AnalyzeArgs),

    /// Probe a video with ffprobe
    Probe {
        /// Path to the video file
        path: PathBuf,
    },

    /// Check system capabilities
    Check,

    /// Show or write configuration
    Config {
        /// Write the defaults to the config file instead of printing
        #[arg(long)]
        write: bool,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        app.logging.level = "debug".to_string();
    }
    barpath_common::logging::init_logging(&app.logging);

    match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args, app).await,
        Commands::Probe { path } => commands::probe::run(path, &app.sampling),
        Commands::Check => commands::check::run(),
        Commands::Config { write, force } => commands::config::run(cli.config, write, force),
    }
}
