// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Drive a camera capture session against the virtual backend")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/camera-session/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the devices of the virtual host
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configure, start, switch, tap-to-focus/expose, reset and stop a session
    Demo {
        /// Host with a single camera (switching is refused)
        #[arg(long)]
        single_camera: bool,

        /// Host without a microphone
        #[arg(long)]
        no_microphone: bool,

        /// Tap point as normalized "x,y"
        #[arg(short, long, default_value = "0.25,0.75")]
        point: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List { json } => cli::list_devices(json),
        Commands::Demo {
            single_camera,
            no_microphone,
            point,
        } => cli::run_demo(config, single_camera, no_microphone, &point),
    }
}
