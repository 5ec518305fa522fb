//! Single-level directory listing.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::constants::traversal;
use crate::error::ServiceResult;
use crate::path::{relative_display, validate_existing_path};
use crate::walk::{FileEntry, WalkOptions, WalkSummary, walk};

use super::{FsService, SortBy, ensure_directory, sort_entries};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListRequest {
    pub path: String,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub with_stats: bool,
    /// Upper bound on returned entries; clamped to the hard cap.
    pub max_entries: Option<usize>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub path: String,
    pub entries: Vec<FileEntry>,
    pub summary: WalkSummary,
}

impl FsService {
    pub async fn list(
        &self,
        request: ListRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<ListResponse> {
        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let resolved = validate_existing_path(self.roots(), &request.path, &signal).await?;
        ensure_directory(&resolved)?;

        let options = WalkOptions {
            include_hidden: request.include_hidden,
            with_stats: request.with_stats || request.sort_by.needs_stats(),
            max_depth: 1,
            max_results: request.max_entries.unwrap_or(traversal::MAX_ENTRIES),
            default_excludes: false,
            ..WalkOptions::default()
        }
        .clamped();

        let mut outcome = walk(&resolved.resolved, &options, &signal).await?;
        sort_entries(&mut outcome.entries, request.sort_by);
        debug!(
            path = %resolved.resolved.display(),
            entries = outcome.entries.len(),
            "directory listed"
        );

        Ok(ListResponse {
            path: relative_display(self.roots(), &resolved.resolved),
            entries: outcome.entries,
            summary: outcome.summary,
        })
    }
}
