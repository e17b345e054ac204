//! CLI argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Sieve - Incremental file transformation
#[derive(Parser)]
#[command(name = "sieve")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Options file path (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transform a source tree into an output directory
    Build(BuildArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Source directory
    pub source: PathBuf,

    /// Output directory; its contents are replaced
    #[arg(short, long, value_name = "DIR")]
    pub out: PathBuf,

    /// Shell command run once per file, reading content on stdin and
    /// writing the new content to stdout
    #[arg(short, long, value_name = "COMMAND")]
    pub exec: String,

    /// Glob patterns selecting files (default: all files)
    #[arg(long, value_name = "GLOB")]
    pub files: Vec<String>,

    /// Glob patterns excluding files
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Replace the extension of every output file
    #[arg(long, value_name = "EXT")]
    pub target_extension: Option<String>,

    /// Pass raw bytes instead of UTF-8 text
    #[arg(long)]
    pub binary: bool,

    /// Copy outputs instead of hard-linking them
    #[arg(long)]
    pub copy: bool,
}
