use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "image-batch")]
#[command(author, version, about = "Batch image processing through reusable action queues")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process files through a preset's action queue
    Run {
        /// Preset file describing the action queue
        #[arg(short, long)]
        preset: PathBuf,

        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Source files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Inspect presets
    Preset {
        #[command(subcommand)]
        command: PresetCommands,
    },
}

#[derive(Subcommand)]
pub enum PresetCommands {
    /// Print the actions of a preset and its fingerprint
    Show {
        /// Preset file to display
        file: PathBuf,
    },
}
