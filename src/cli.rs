//! Command-line arguments for the sandfs service.

use std::path::PathBuf;

use clap::Parser;

/// Sandboxed filesystem service speaking line-delimited JSON-RPC on stdio.
#[derive(Debug, Parser)]
#[command(name = "sandfs", version, about, long_about = None)]
pub struct Cli {
    /// Directory the service may access; repeatable. Paths must be absolute.
    #[arg(long = "root", value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Additionally allow the current working directory.
    #[arg(long)]
    pub allow_cwd: bool,

    /// Log filter, e.g. `info` or `sandfs_core=debug`.
    #[arg(long, default_value = "info", value_name = "FILTER")]
    pub log: String,
}
