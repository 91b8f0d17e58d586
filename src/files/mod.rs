//! Idempotent on-disk configuration files
//!
//! Every file the operator owns goes through [`sync_file`]: the desired
//! content is compared with what is on disk and the file is only rewritten
//! when the bytes differ. Callers use the returned flag to decide whether
//! a dependent service needs a restart.

pub mod args;
pub mod sans;

use std::io::ErrorKind;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::Error;

/// Mode for configuration files written by the operator
pub const FILE_MODE: u32 = 0o660;

/// Mode for directories created by the operator
pub const DIR_MODE: u32 = 0o755;

/// Read a file, treating a missing file as empty
pub(crate) async fn read_or_empty(path: &Path) -> Result<Vec<u8>, Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Write `content` to `path` unless the file already holds exactly that content.
///
/// Returns `true` when the file was written. A missing file counts as empty,
/// so empty content for a missing file is a no-op. New files are created with
/// `mode`; the file is always replaced as a whole.
pub async fn sync_file(path: &Path, content: &str, mode: u32) -> Result<bool, Error> {
    let current = read_or_empty(path).await?;
    if current == content.as_bytes() {
        debug!(path = %path.display(), "file up to date");
        return Ok(false);
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| Error::io(path, e))?;
    file.flush().await.map_err(|e| Error::io(path, e))?;

    debug!(path = %path.display(), bytes = content.len(), "file updated");
    Ok(true)
}

/// Create `dir` and any missing parents with `mode`
pub async fn ensure_dir(dir: &Path, mode: u32) -> Result<(), Error> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(dir)
        .await
        .map_err(|e| Error::io(dir, e))
}
