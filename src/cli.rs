use clap::{Parser, Subcommand};
use fraglift_media::OutputMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fraglift")]
#[command(author, version, about = "Extract audio elementary streams from MP4 files")]
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
    /// Extract one track as an elementary stream
    Extract {
        /// MP4 or fragmented MP4 file
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (defaults to the input name with a codec extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Select the track by ID instead of by handler
        #[arg(long, conflicts_with = "handler")]
        track_id: Option<u32>,

        /// Handler type of the track to extract, e.g. soun
        #[arg(long)]
        handler: Option<String>,

        /// Output framing: auto, adts or raw
        #[arg(short, long)]
        mode: Option<OutputMode>,
    },

    /// Print the box tree of a file
    Dump {
        /// File to dump
        #[arg(required = true)]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the tracks of a file
    Tracks {
        /// File to inspect
        #[arg(required = true)]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
