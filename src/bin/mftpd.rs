use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use mftp::cli::DaemonOpts;
use mftp::logger::StderrLogger;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();

    if !opts.root.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", opts.root.display());
    }
    let root = std::fs::canonicalize(&opts.root)
        .with_context(|| format!("Failed to canonicalize root path: {}", opts.root.display()))?;

    println!("Starting mftp daemon:");
    println!("  Root: {}", root.display());
    println!("  Bind: {}", opts.bind);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(mftp::session::serve(&opts.bind, &root, Arc::new(StderrLogger)))
}
