//! File metadata inspection, single and batched.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::batch::parallel_map;
use crate::config::limits;
use crate::error::{ErrorEnvelope, ServiceResult};
use crate::mime::mime_type_for;
use crate::path::{relative_display, validate_existing_path};
use crate::walk::EntryKind;

use super::{BatchSummary, FsService};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatRequest {
    pub path: String,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatManyRequest {
    pub paths: Vec<String>,
    pub timeout_ms: Option<u64>,
}

/// Metadata for one filesystem object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatInfo {
    pub path: String,
    pub absolute_path: PathBuf,
    pub kind: EntryKind,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    pub readonly: bool,
    /// Octal permission bits on Unix, absent elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<StatInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatManyResponse {
    pub entries: Vec<StatEntry>,
    pub summary: BatchSummary,
}

impl FsService {
    pub async fn stat(
        &self,
        request: StatRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<StatInfo> {
        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let resolved = validate_existing_path(self.roots(), &request.path, &signal).await?;
        signal.ensure_live()?;
        self.stat_resolved(&resolved.requested, &resolved.resolved).await
    }

    pub async fn stat_many(
        &self,
        request: StatManyRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<StatManyResponse> {
        if request.paths.is_empty() {
            return Err(crate::error::ServiceError::invalid_input(
                "At least one path is required",
            ));
        }

        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let service = self.clone();
        let work_signal = signal.clone();
        let results = parallel_map(
            request.paths.clone(),
            limits().parallel_concurrency,
            &signal,
            move |_, path| {
                let service = service.clone();
                let signal = work_signal.clone();
                async move {
                    let resolved =
                        validate_existing_path(service.roots(), &path, &signal).await?;
                    service
                        .stat_resolved(&resolved.requested, &resolved.resolved)
                        .await
                }
            },
        )
        .await;

        let mut summary = BatchSummary {
            total: request.paths.len(),
            ..BatchSummary::default()
        };
        let entries = request
            .paths
            .into_iter()
            .zip(results)
            .map(|(path, result)| match result {
                Ok(info) => {
                    summary.succeeded += 1;
                    StatEntry {
                        path,
                        info: Some(info),
                        error: None,
                    }
                }
                Err(error) => {
                    summary.failed += 1;
                    StatEntry {
                        path,
                        info: None,
                        error: Some(error.to_envelope()),
                    }
                }
            })
            .collect();

        Ok(StatManyResponse { entries, summary })
    }

    async fn stat_resolved(&self, requested: &Path, resolved: &Path) -> ServiceResult<StatInfo> {
        let link_meta = tokio::fs::symlink_metadata(requested)
            .await
            .map_err(|e| crate::error::ServiceError::from_io(e, requested))?;
        let is_symlink = link_meta.file_type().is_symlink();
        let metadata = tokio::fs::metadata(resolved)
            .await
            .map_err(|e| crate::error::ServiceError::from_io(e, resolved))?;

        let kind = if is_symlink {
            EntryKind::Symlink
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };

        let since_epoch = |time: std::io::Result<std::time::SystemTime>| {
            time.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
        };

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(format!("{:o}", metadata.permissions().mode() & 0o7777))
        };
        #[cfg(not(unix))]
        let permissions = None;

        let symlink_target = if is_symlink {
            tokio::fs::read_link(requested).await.ok()
        } else {
            None
        };

        Ok(StatInfo {
            path: relative_display(self.roots(), requested),
            absolute_path: resolved.to_path_buf(),
            kind,
            size: metadata.len(),
            mtime: since_epoch(metadata.modified()),
            atime: since_epoch(metadata.accessed()),
            created: since_epoch(metadata.created()),
            readonly: metadata.permissions().readonly(),
            permissions,
            symlink_target,
            mime_type: if metadata.is_file() {
                mime_type_for(resolved)
            } else {
                None
            },
        })
    }
}
