//! sandfs - sandboxed filesystem service over stdio JSON-RPC.
//!
//! Thin binary entry point: parse flags, initialize tracing, install the
//! allowed roots, and hand the stdio loop to the RPC module.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod rpc;

use cli::Cli;
use sandfs_core::ops::FsService;
use sandfs_core::roots::init_allowed_roots;

fn main() -> std::process::ExitCode {
    // Exit code 2 for bad arguments comes from clap's own error path.
    let cli = Cli::parse();

    initialize_tracing(&cli.log);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Error: failed to build Tokio runtime: {error}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:?}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_allowed_roots(&cli.roots, cli.allow_cwd)
        .context("configuring allowed roots")?;
    let service = FsService::from_global().context("building service")?;

    tracing::info!(
        roots = service.roots().len(),
        workers = sandfs_core::config::limits().search_workers,
        "sandfs ready"
    );

    rpc::serve(service).await
}

fn initialize_tracing(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdout belongs to the RPC stream.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
