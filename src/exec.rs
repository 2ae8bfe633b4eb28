//! External collaborators: directory listing and paging
//!
//! Listing and paging are delegated to `ls -l` and `more -20` with their
//! standard streams bound to the given channels, rather than reimplementing
//! either in-process.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use crate::transfer;

const LIST_PROGRAM: &str = "ls";
const LIST_ARG: &str = "-l";
const PAGER_PROGRAM: &str = "more";
const PAGER_ARG: &str = "-20";

fn spawn_listing(dir: &Path) -> Result<Child> {
    Command::new(LIST_PROGRAM)
        .arg(LIST_ARG)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn listing process")
}

/// Produce a listing of `dir` into `sink`, waiting for the helper process to
/// finish before returning.
pub async fn stream_listing<W>(dir: &Path, sink: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut child = spawn_listing(dir)?;
    let mut stdout = child.stdout.take().context("capture listing stdout")?;
    transfer::copy_until_eof(&mut stdout, sink).await?;
    let status = child.wait().await.context("wait for listing process")?;
    if !status.success() {
        bail!("listing process exited with {status}");
    }
    Ok(())
}

/// Page `source` to the user's terminal, returning once the pager exits.
/// The pager may quit before the stream ends; the leftover bytes are simply
/// dropped.
pub async fn page<R>(source: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut child = Command::new(PAGER_PROGRAM)
        .arg(PAGER_ARG)
        .stdin(Stdio::piped())
        .spawn()
        .context("spawn pager process")?;
    let mut stdin = child.stdin.take().context("capture pager stdin")?;
    let _ = transfer::copy_until_eof(source, &mut stdin).await;
    drop(stdin);
    child.wait().await.context("wait for pager process")?;
    Ok(())
}

/// Local `ls`: pipe a listing of `dir` through the pager.
pub async fn page_listing(dir: &Path) -> Result<()> {
    let mut child = spawn_listing(dir)?;
    let mut stdout = child.stdout.take().context("capture listing stdout")?;
    page(&mut stdout).await?;
    child.wait().await.context("wait for listing process")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listing_contains_known_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("world.txt"), b"ho").unwrap();

        let mut sink: Vec<u8> = Vec::new();
        stream_listing(dir.path(), &mut sink).await.unwrap();
        let listing = String::from_utf8_lossy(&sink);
        assert!(listing.contains("hello.txt"), "listing was: {listing}");
        assert!(listing.contains("world.txt"), "listing was: {listing}");
    }

    #[tokio::test]
    async fn listing_of_empty_directory_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink: Vec<u8> = Vec::new();
        stream_listing(dir.path(), &mut sink).await.unwrap();
    }
}
