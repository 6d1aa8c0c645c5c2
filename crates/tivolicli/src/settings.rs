use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tivoli_images::types::ImageSummary;

/// The container width used when none is given, the width of a typical phone screen in points.
pub const DEFAULT_CONTAINER_WIDTH: f64 = 390.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Outputs the entire layout as JSON.
    Json,
    /// Outputs the placed items as a table.
    Compact,
}

/// A utility to inspect the image grid of a Tivoli photo server.
///
/// Both commands read the result of a search on the photo server, a JSON array of images as
/// returned by `POST /images/search`.
#[derive(Clone, Parser, Debug)]
#[command(author, version, about, long_about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Commands {
    /// Prints the waterfall layout of a search result.
    Layout(LayoutArgs),
    /// Warms an image cache the way the grid does when an item becomes visible.
    Warm(WarmArgs),
}

#[derive(Clone, Args, Debug)]
pub struct LayoutArgs {
    /// The search result to lay out.
    pub search: PathBuf,

    /// The number of columns.
    #[arg(long, default_value_t = 3)]
    pub columns: usize,

    /// The width of the container holding all columns.
    #[arg(long, default_value_t = DEFAULT_CONTAINER_WIDTH)]
    pub width: f64,

    /// The gap between columns and between items of a column.
    #[arg(long, default_value_t = 2.0)]
    pub spacing: f64,

    /// The output format.
    #[arg(long, value_enum, default_value = "compact")]
    pub format: OutputFormat,
}

#[derive(Clone, Args, Debug)]
pub struct WarmArgs {
    /// The search result whose images are loaded.
    pub search: PathBuf,

    /// Path to the configuration file.
    #[arg(long, short, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The base URL of the photo server.
    ///
    /// Overrides `server.url` from the configuration file.
    #[arg(long)]
    pub server: Option<String>,

    /// The index of the item that becomes visible.
    #[arg(long, default_value_t = 0)]
    pub visible: usize,

    /// The width of the container holding all columns.
    #[arg(long, default_value_t = DEFAULT_CONTAINER_WIDTH)]
    pub width: f64,

    /// The maximum number of seconds to wait for prefetches to settle.
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

/// Reads a search result from a JSON file.
pub fn read_search(path: &Path) -> Result<Vec<ImageSummary>> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open search result {}", path.display()))?;
    serde_json::from_reader(file).context("failed to parse search result")
}
