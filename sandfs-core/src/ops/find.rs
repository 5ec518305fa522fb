//! Glob-based file search: traverse, filter, sort, truncate.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::constants::traversal;
use crate::error::ServiceResult;
use crate::path::{relative_display, validate_existing_path};
use crate::walk::{FileEntry, WalkOptions, WalkSummary, walk};

use super::{FsService, SortBy, ensure_directory, sort_entries};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FindRequest {
    pub path: String,
    /// Positive glob; matched against basenames when it has no `/`.
    pub pattern: String,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
    /// Defaults to case-sensitive except on Windows.
    pub case_sensitive: Option<bool>,
    #[serde(default = "default_true")]
    pub base_name_match: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub only_files: bool,
    #[serde(default)]
    pub respect_gitignore: bool,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub with_stats: bool,
    pub max_depth: Option<usize>,
    pub max_results: Option<usize>,
    pub max_files_scanned: Option<usize>,
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResponse {
    pub path: String,
    pub pattern: String,
    pub entries: Vec<FileEntry>,
    pub summary: WalkSummary,
}

impl FsService {
    pub async fn find(
        &self,
        request: FindRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<FindResponse> {
        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let resolved = validate_existing_path(self.roots(), &request.path, &signal).await?;
        ensure_directory(&resolved)?;

        let options = WalkOptions {
            pattern: Some(request.pattern.clone()),
            exclude: request.exclude.clone(),
            include_hidden: request.include_hidden,
            base_name_match: request.base_name_match,
            case_sensitive: request.case_sensitive.unwrap_or(!cfg!(windows)),
            max_depth: request.max_depth.unwrap_or(traversal::MAX_DEPTH),
            follow_symlinks: request.follow_symlinks,
            only_files: request.only_files,
            with_stats: request.with_stats || request.sort_by.needs_stats(),
            respect_gitignore: request.respect_gitignore,
            max_results: request.max_results.unwrap_or(traversal::MAX_RESULTS),
            max_files_scanned: request
                .max_files_scanned
                .unwrap_or(traversal::MAX_FILES_SCANNED),
            ..WalkOptions::default()
        }
        .clamped();

        let mut outcome = walk(&resolved.resolved, &options, &signal).await?;
        sort_entries(&mut outcome.entries, request.sort_by);

        Ok(FindResponse {
            path: relative_display(self.roots(), &resolved.resolved),
            pattern: request.pattern,
            entries: outcome.entries,
            summary: outcome.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::service_at;
    use crate::walk::StopReason;
    use pretty_assertions::assert_eq;

    fn request(path: &str, pattern: &str) -> FindRequest {
        FindRequest {
            path: path.to_string(),
            pattern: pattern.to_string(),
            exclude: Vec::new(),
            include_hidden: false,
            case_sensitive: None,
            base_name_match: true,
            follow_symlinks: false,
            only_files: true,
            respect_gitignore: false,
            sort_by: SortBy::Path,
            with_stats: false,
            max_depth: None,
            max_results: None,
            max_files_scanned: None,
            timeout_ms: None,
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/deep")).unwrap();
        std::fs::write(dir.path().join("main.rs"), "x").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "x").unwrap();
        std::fs::write(dir.path().join("src/deep/core.rs"), "x").unwrap();
        std::fs::write(dir.path().join("src/notes.txt"), "x").unwrap();
        dir
    }

    #[tokio::test]
    async fn finds_by_basename_glob() {
        let dir = fixture();
        let service = service_at(dir.path());
        let response = service
            .find(request(dir.path().to_str().unwrap(), "*.rs"), None)
            .await
            .unwrap();
        let paths: Vec<&str> = response.entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["main.rs", "src/deep/core.rs", "src/lib.rs"]);
    }

    #[tokio::test]
    async fn path_glob_scopes_to_subtree() {
        let dir = fixture();
        let service = service_at(dir.path());
        let response = service
            .find(request(dir.path().to_str().unwrap(), "src/**/*.rs"), None)
            .await
            .unwrap();
        let paths: Vec<&str> = response.entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["src/deep/core.rs", "src/lib.rs"]);
    }

    #[tokio::test]
    async fn case_insensitive_match_is_opt_in() {
        let dir = fixture();
        let service = service_at(dir.path());

        let mut req = request(dir.path().to_str().unwrap(), "MAIN.RS");
        req.case_sensitive = Some(true);
        let response = service.find(req, None).await.unwrap();
        assert!(response.entries.is_empty());

        let mut req = request(dir.path().to_str().unwrap(), "MAIN.RS");
        req.case_sensitive = Some(false);
        let response = service.find(req, None).await.unwrap();
        assert_eq!(response.entries.len(), 1);
    }

    #[tokio::test]
    async fn max_results_truncates_with_reason() {
        let dir = fixture();
        let service = service_at(dir.path());
        let mut req = request(dir.path().to_str().unwrap(), "*.rs");
        req.max_results = Some(1);
        let response = service.find(req, None).await.unwrap();
        assert_eq!(response.entries.len(), 1);
        assert_eq!(response.summary.stopped_reason, Some(StopReason::MaxResults));
    }
}
