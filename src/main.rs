use anyhow::{Context, Result};
use clap::Parser;

use mftp::cli::ClientOpts;

fn main() -> Result<()> {
    let opts = ClientOpts::parse();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(mftp::client::run(&opts.host, opts.port))
}
