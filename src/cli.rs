use clap::{Parser, Subcommand};
use rangeprobe_media::DimensionPolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rangeprobe")]
#[command(author, version, about = "Read media metadata with as few byte-range fetches as possible")]
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
    /// Probe a local file or an http(s) URL
    Probe {
        /// File path or URL
        #[arg(required = true)]
        source: String,

        /// Comma-separated fields, e.g. duration,dimensions,fps
        #[arg(short, long)]
        fields: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Dimension policy for rotated video (coded or display)
        #[arg(long)]
        policy: Option<DimensionPolicy>,

        /// Minimum bytes per range fetch
        #[arg(long)]
        block_size: Option<u64>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
