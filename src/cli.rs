use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelpipe")]
#[command(author, version, about = "Fetch media from a URL and transcode it with ffmpeg")]
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
    /// Start the HTTP job server
    Start {
        /// Host to bind to [default: 0.0.0.0]
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on [default: 8000]
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Transcode a local file without starting the server
    Transcode {
        /// Input media file
        #[arg(required = true)]
        input: PathBuf,

        /// Target format id (see `reelpipe formats`)
        #[arg(short, long)]
        format: String,

        /// Output path (default: input name with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List supported target formats
    Formats,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
