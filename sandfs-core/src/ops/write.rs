//! Mutations: atomic writes and unified-diff patching.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::limits;
use crate::error::ServiceResult;
use crate::io::{read_capped, write_atomic};
use crate::patch::{HunkReport, Patch};
use crate::path::{relative_display, validate_existing_path, validate_path_for_write};

use super::{FsService, ensure_file};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteRequest {
    pub path: String,
    pub content: String,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    pub path: String,
    pub bytes_written: u64,
    pub created: bool,
}

/// Default fuzz mirrors `patch(1)`: up to two edge context lines may drift.
const DEFAULT_FUZZ: u32 = 2;
const MAX_FUZZ: u32 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatchRequest {
    pub path: String,
    /// Unified diff targeting the single file at `path`.
    pub diff: String,
    pub fuzz: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResponse {
    pub path: String,
    /// False on dry runs: the rewrite was computed but not committed.
    pub applied: bool,
    pub hunks: Vec<HunkReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    /// Rewritten content, returned on dry runs for inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl FsService {
    pub async fn write(
        &self,
        request: WriteRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<WriteResponse> {
        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let target = validate_path_for_write(self.roots(), &request.path, &signal).await?;

        let receipt = write_atomic(&target, request.content.into_bytes(), &signal).await?;
        info!(
            path = %target.display(),
            bytes = receipt.bytes_written,
            created = receipt.created,
            "file written"
        );

        Ok(WriteResponse {
            path: relative_display(self.roots(), &target),
            bytes_written: receipt.bytes_written,
            created: receipt.created,
        })
    }

    pub async fn patch(
        &self,
        request: PatchRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<PatchResponse> {
        let fuzz = request.fuzz.unwrap_or(DEFAULT_FUZZ).min(MAX_FUZZ);
        let patch = Patch::parse(&request.diff)?;

        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let resolved = validate_existing_path(self.roots(), &request.path, &signal).await?;
        ensure_file(&resolved).await?;

        let original = read_capped(&resolved.resolved, limits().max_file_size, &signal).await?;
        let original = String::from_utf8_lossy(&original).into_owned();
        let applied = patch.apply(&original, fuzz)?;

        let display = relative_display(self.roots(), &resolved.requested);
        if request.dry_run {
            return Ok(PatchResponse {
                path: display,
                applied: false,
                hunks: applied.reports,
                bytes_written: None,
                preview: Some(applied.content),
            });
        }

        // The rename target is the resolved path, re-checked for write mode so
        // a symlinked spelling cannot redirect the replacement.
        let target = validate_path_for_write(
            self.roots(),
            &resolved.resolved.to_string_lossy(),
            &signal,
        )
        .await?;
        let receipt = write_atomic(&target, applied.content.into_bytes(), &signal).await?;
        info!(
            path = %target.display(),
            hunks = applied.reports.len(),
            "patch applied"
        );

        Ok(PatchResponse {
            path: display,
            applied: true,
            hunks: applied.reports,
            bytes_written: Some(receipt.bytes_written),
            preview: None,
        })
    }
}
