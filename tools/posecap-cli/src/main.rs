//! Posecap CLI: replay pose logs through the capture pipeline.
//!
//! Usage:
//!   posecap replay <POSES.jsonl>   Record an overlay video and keypoint export
//!   posecap header                 Print the keypoint export header
//!   posecap check                  Check encoder availability
//!   posecap config [--init]        Show or write the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "posecap",
    about = "Pose keypoint overlay recording with synchronized keypoint export",
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

/// Where rendered frames go during a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// VP9/WebM through GStreamer
    Gst,
    /// Raw RGBA frames written back to back
    Raw,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a pose log as one capture session
    Replay {
        /// JSON-lines file, one frame per line: {"t_ms": 33.3, "poses": [...]}
        poses: PathBuf,

        /// Output directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum keypoint score to draw and export [0.0, 1.0]
        #[arg(long)]
        threshold: Option<f64>,

        /// Capture sink
        #[arg(long, value_enum, default_value = "gst")]
        sink: SinkKind,

        /// Surface width
        #[arg(long)]
        width: Option<u32>,

        /// Surface height
        #[arg(long)]
        height: Option<u32>,

        /// Pace frames by their timestamps and stamp rows with the wall clock
        #[arg(long)]
        realtime: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the keypoint export header
    Header,

    /// Check GStreamer and the required encoder elements
    Check,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = posecap_common::config::AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    posecap_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Replay {
            poses,
            output,
            threshold,
            sink,
            width,
            height,
            realtime,
            json,
        } => {
            let options = commands::replay::ReplayOptions {
                output,
                threshold,
                sink,
                width,
                height,
                realtime,
                json,
            };
            commands::replay::run(config, poses, options).await
        }
        Commands::Header => commands::header::run(),
        Commands::Check => commands::check::run(),
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
