//! Byte-stream transfer engine and the file-open policy
//!
//! Transfers copy from a source until end-of-stream with no length
//! negotiation or integrity signal in either direction; a dropped data
//! connection is indistinguishable from a legitimate end-of-stream.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Stream `source` into `sink` until the source reaches end-of-stream.
/// A write failure aborts the transfer; there is no retry. Returns the
/// number of bytes moved.
pub async fn copy_until_eof<R, W>(source: &mut R, sink: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = source.read(&mut buf).await.context("read transfer source")?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])
            .await
            .context("write transfer sink")?;
        total += n as u64;
    }
    sink.flush().await.context("flush transfer sink")?;
    Ok(total)
}

/// Open `path` for reading. The target must resolve to a pre-existing
/// regular file; any other outcome is session-recoverable and yields the
/// display message reported to the peer (`name` is the user-supplied
/// spelling of the path).
pub async fn open_existing(path: &Path, name: &str) -> Result<File, String> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(format!("{name} does not exist"));
        }
        Err(_) => return Err(format!("Cannot open {name}")),
    };
    let meta = file
        .metadata()
        .await
        .map_err(|_| format!("Cannot open {name}"))?;
    if !meta.is_file() {
        return Err(format!("{name} is not a regular file"));
    }
    Ok(file)
}

/// Create `path` for writing, failing if it already exists. Concurrent
/// writers racing for the same new filename are resolved by the
/// filesystem's atomic create-exclusive semantics: the loser gets the
/// "already exists" message.
pub async fn create_exclusive(path: &Path, name: &str) -> Result<File, String> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(f) => Ok(f),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(format!("{name} already exists"))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("{name} does not exist"))
        }
        Err(_) => Err(format!("Cannot open {name}")),
    }
}

/// Restrict a freshly received file to owner read/write.
pub async fn restrict_to_owner(file: &File) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .context("restrict file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = file;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copy_moves_all_bytes_until_eof() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut source = &payload[..];
        let mut sink: Vec<u8> = Vec::new();
        let moved = copy_until_eof(&mut source, &mut sink).await.unwrap();
        assert_eq!(moved, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    #[tokio::test]
    async fn copy_of_empty_source_is_zero_bytes() {
        let mut source = &b""[..];
        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(copy_until_eof(&mut source, &mut sink).await.unwrap(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn open_existing_rejects_missing_and_non_regular() {
        let dir = tempfile::tempdir().unwrap();

        let err = open_existing(&dir.path().join("nope.txt"), "nope.txt")
            .await
            .unwrap_err();
        assert_eq!(err, "nope.txt does not exist");

        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let err = open_existing(&sub, "sub").await.unwrap_err();
        assert_eq!(err, "sub is not a regular file");

        std::fs::write(dir.path().join("ok.txt"), b"hello").unwrap();
        assert!(open_existing(&dir.path().join("ok.txt"), "ok.txt")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn create_exclusive_rejects_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.txt");

        assert!(create_exclusive(&path, "new.txt").await.is_ok());
        let err = create_exclusive(&path, "new.txt").await.unwrap_err();
        assert_eq!(err, "new.txt already exists");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn received_files_end_up_owner_read_write() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recv.txt");
        let file = create_exclusive(&path, "recv.txt").await.unwrap();
        restrict_to_owner(&file).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
