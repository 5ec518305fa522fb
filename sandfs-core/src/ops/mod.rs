//! Operation facades: the public entry points composing the path kernel,
//! traversal, search, readers, and batch scheduler.
//!
//! Every facade validates its paths first, threads one composed signal
//! through all I/O, and returns either a typed payload or a [`ServiceError`];
//! the RPC layer serializes both without touching core state.

mod checksum;
mod find;
mod grep;
mod list;
mod read;
mod read_many;
mod stat;
mod tree;
mod write;

pub use checksum::{ChecksumAlgorithm, ChecksumEntry, ChecksumRequest, ChecksumResponse};
pub use find::{FindRequest, FindResponse};
pub use grep::{GrepRequest, GrepResponse, GrepSummary};
pub use list::{ListRequest, ListResponse};
pub use read::{ReadRequest, ReadResponse};
pub use read_many::{ReadManyEntry, ReadManyRequest, ReadManyResponse};
pub use stat::{StatEntry, StatInfo, StatManyRequest, StatManyResponse, StatRequest};
pub use tree::{TreeNode, TreeRequest, TreeResponse};
pub use write::{PatchRequest, PatchResponse, WriteRequest, WriteResponse};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cancel::{OperationSignal, SignalGuard, compose};
use crate::config::limits;
use crate::error::{ServiceError, ServiceResult};
use crate::path::ResolvedPath;
use crate::roots::{RootSet, allowed_roots};
use crate::walk::FileEntry;

/// The facade surface. Holds the root snapshot; cheap to clone.
#[derive(Debug, Clone)]
pub struct FsService {
    roots: Arc<RootSet>,
}

impl FsService {
    pub fn new(roots: RootSet) -> Self {
        Self {
            roots: Arc::new(roots),
        }
    }

    /// Build from the process-wide snapshot installed at startup.
    pub fn from_global() -> ServiceResult<Self> {
        Ok(Self::new(allowed_roots()?.clone()))
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    /// Compose the per-operation signal from a caller token and the request
    /// deadline (default when unspecified).
    pub(crate) fn signal_for(
        &self,
        timeout_ms: Option<u64>,
        cancel: Option<CancellationToken>,
    ) -> (OperationSignal, SignalGuard) {
        let deadline = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(limits().default_timeout)
            .min(crate::config::constants::timeout::MAX);
        compose(cancel, Some(deadline))
    }
}

/// Sort order for entry streams. Stable; ties break on absolute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Name,
    Path,
    Size,
    Mtime,
}

impl SortBy {
    /// Size and mtime ordering need stat data on every entry.
    pub fn needs_stats(self) -> bool {
        matches!(self, Self::Size | Self::Mtime)
    }
}

pub(crate) fn sort_entries(entries: &mut [FileEntry], sort_by: SortBy) {
    match sort_by {
        SortBy::Name => entries.sort_by(|a, b| {
            (a.name.as_str(), &a.absolute_path).cmp(&(b.name.as_str(), &b.absolute_path))
        }),
        SortBy::Path => entries.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path)),
        SortBy::Size => entries.sort_by(|a, b| {
            (b.size.unwrap_or(0), &a.absolute_path).cmp(&(a.size.unwrap_or(0), &b.absolute_path))
        }),
        SortBy::Mtime => entries.sort_by(|a, b| {
            (b.mtime.unwrap_or(0), &a.absolute_path).cmp(&(a.mtime.unwrap_or(0), &b.absolute_path))
        }),
    }
}

pub(crate) fn ensure_directory(resolved: &ResolvedPath) -> ServiceResult<()> {
    let metadata = std::fs::metadata(&resolved.resolved)
        .map_err(|e| ServiceError::from_io(e, &resolved.requested))?;
    if !metadata.is_dir() {
        return Err(ServiceError::not_directory(&resolved.requested));
    }
    Ok(())
}

pub(crate) async fn ensure_file(resolved: &ResolvedPath) -> ServiceResult<u64> {
    let metadata = tokio::fs::metadata(&resolved.resolved)
        .await
        .map_err(|e| ServiceError::from_io(e, &resolved.requested))?;
    if !metadata.is_file() {
        return Err(ServiceError::not_file(&resolved.requested));
    }
    Ok(metadata.len())
}

/// Aggregate counters for batch operations; the call as a whole succeeds.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::path::Path;

    /// Service rooted at a test directory.
    pub fn service_at(root: &Path) -> FsService {
        let roots = RootSet::resolve(&[root.to_path_buf()], false).expect("root set");
        FsService::new(roots)
    }
}
