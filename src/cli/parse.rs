//! CLI parse: clap types for foldscope. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Foldscope CLI - foldable rich display of structured values
#[derive(Parser)]
#[command(name = "foldscope")]
#[command(about = "Render structured values as foldable, streaming HTML or text")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (searched for foldscope.toml)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Html,
    Text,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a JSON document through a headless host and print the result
    Render {
        /// JSON file to render
        file: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value = "html")]
        format: OutputFormat,
        /// Render in one pass instead of streaming deferred leaves
        #[arg(long)]
        no_stream: bool,
        /// Emit uncompressed HTML
        #[arg(long)]
        no_compress: bool,
        /// Disable the array autovisualizer
        #[arg(long)]
        no_autovisualize: bool,
        /// Seconds to wait for deferred leaves
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// Print the effective configuration as TOML
    Config,
}
