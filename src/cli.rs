use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "castserve")]
#[command(author, version, about = "Serves a tree of video files with per-device renditions")]
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
    /// Watch a library, keep the catalog fresh and preload metadata
    Serve {
        /// Library root directory (defaults to the working directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Rendition cache directory (defaults to <root>/.cache)
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Preferred audio language
        #[arg(long)]
        lang: Option<String>,
    },

    /// Probe a media file and print its identification
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Preferred audio language
        #[arg(long, default_value = "eng")]
        lang: String,
    },

    /// Transcode one file for a device, outside any catalog
    Transcode {
        /// Input file
        #[arg(required = true)]
        input: PathBuf,

        /// Target device (streaming-dongle, streaming-dongle-hd, laptop,
        /// preview)
        #[arg(long, default_value = "streaming-dongle")]
        device: String,

        /// Output path (defaults to the input with the device's container
        /// extension)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Preferred audio language
        #[arg(long, default_value = "eng")]
        lang: String,
    },

    /// Display version information
    Version,
}
