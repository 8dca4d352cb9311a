// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stereo_camera::config::Config;
use stereo_camera::constants::app_info;
use stereo_camera::terminal;

mod cli;

#[derive(Parser)]
#[command(name = "stereo-camera")]
#[command(about = "Red/cyan anaglyph 3D camera for the terminal")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List detected cameras and their formats
    List,

    /// Capture a stereo pair headlessly and save the anaglyph
    Photo {
        /// Camera index to use (from 'stereo-camera list')
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Seconds to wait between the left and right stills
        #[arg(short, long, default_value = "5")]
        delay: u64,

        /// Output file path (default: ~/Pictures/Stereo/anaglyph_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build an anaglyph from two existing images
    Composite {
        /// Image for the left eye
        #[arg(short, long)]
        left: PathBuf,

        /// Image for the right eye
        #[arg(short, long)]
        right: PathBuf,

        /// Output file path (default: ~/Pictures/Stereo/anaglyph_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Feed the right image into the red channel instead of the left
        #[arg(long)]
        right_is_red: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging is driven by RUST_LOG (e.g. RUST_LOG=stereo_camera=debug),
    // quiet by default so the viewer's screen stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Some(Commands::List) => cli::list_cameras(),
        Some(Commands::Photo {
            camera,
            delay,
            output,
        }) => cli::take_photo(camera, delay, output, &config),
        Some(Commands::Composite {
            left,
            right,
            output,
            right_is_red,
        }) => cli::composite_files(left, right, output, right_is_red, &config),
        None => terminal::run(config),
    }
}
