//! Atomic write: sibling temp file, fsync, rename over the target.
//!
//! The target directory is never left with a truncated file; on any failure
//! the temp file is unlinked. The temp file is fsynced before the rename; the
//! parent directory is not fsynced afterwards.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::cancel::OperationSignal;
use crate::error::{ServiceError, ServiceResult};

/// Outcome of a successful atomic write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub created: bool,
}

/// Write `content` to `target` atomically via `<name>.<rand>.tmp` + rename.
///
/// `target` must already have passed write-mode path validation; this function
/// only performs the I/O.
pub async fn write_atomic(
    target: &Path,
    content: Vec<u8>,
    signal: &OperationSignal,
) -> ServiceResult<WriteReceipt> {
    signal.ensure_live()?;

    let parent = target
        .parent()
        .ok_or_else(|| ServiceError::invalid_input("Write target has no parent directory"))?
        .to_path_buf();
    let name = target
        .file_name()
        .ok_or_else(|| ServiceError::invalid_input("Write target has no file name"))?
        .to_string_lossy()
        .into_owned();

    if !tokio::fs::try_exists(&parent)
        .await
        .map_err(|e| ServiceError::from_io(e, &parent))?
    {
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| ServiceError::from_io(e, &parent))?;
    }

    let existed = tokio::fs::try_exists(target)
        .await
        .map_err(|e| ServiceError::from_io(e, target))?;

    let target_owned = target.to_path_buf();
    let signal_for_blocking = signal.clone();
    let bytes = content.len() as u64;

    // The temp file handle lives entirely inside this blocking section; its
    // guard unlinks the file on every failure path.
    tokio::task::spawn_blocking(move || -> ServiceResult<()> {
        let mut temp = tempfile::Builder::new()
            .prefix(&format!("{name}."))
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| ServiceError::from_io(e, &parent))?;

        temp.write_all(&content)
            .map_err(|e| ServiceError::from_io(e, temp.path()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ServiceError::from_io(e, temp.path()))?;

        // Last chance to observe a cancellation before the point of no return.
        signal_for_blocking.ensure_live()?;

        temp.persist(&target_owned)
            .map_err(|e| ServiceError::from_io(e.error, &target_owned))?;
        Ok(())
    })
    .await
    .map_err(|e| ServiceError::unknown(format!("Write task failed: {e}")))??;

    debug!(path = %target.display(), bytes, "atomic write committed");
    Ok(WriteReceipt {
        path: target.to_path_buf(),
        bytes_written: bytes,
        created: !existed,
    })
}
