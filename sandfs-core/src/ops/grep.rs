//! Content search across a directory or single file.
//!
//! The matcher is compiled (and safety-checked) before any file is opened.
//! Candidate files come from the traversal engine; scans run sequentially or
//! on the worker pool, and the merged matches are sorted by (file, line)
//! before the overall result cap applies.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel::OperationSignal;
use crate::config::constants::{search as search_caps, traversal};
use crate::config::limits;
use crate::error::{ServiceError, ServiceResult};
use crate::path::{relative_display, validate_existing_path};
use crate::search::{
    Matcher, MatcherOptions, ScanMatch, ScanOptions, ScanOutcome, ScanRequest, SearchPool,
    global_pool, scan_file,
};
use crate::walk::{StopReason, WalkOptions, walk};

use super::FsService;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GrepRequest {
    /// Directory to search, or a single file.
    pub path: String,
    pub pattern: String,
    #[serde(default)]
    pub literal: bool,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    /// Glob restricting which files are scanned, e.g. `**/*.rs`.
    pub file_pattern: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
    pub context_lines: Option<usize>,
    pub max_results: Option<usize>,
    /// Per-file size cap; clamped to the configured search cap.
    pub max_file_size: Option<u64>,
    #[serde(default = "default_true")]
    pub skip_binary: bool,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    pub max_files_scanned: Option<usize>,
    pub timeout_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrepSummary {
    pub files_scanned: usize,
    pub files_searched: usize,
    pub skipped_binary: usize,
    pub skipped_too_large: usize,
    pub skipped_inaccessible: usize,
    pub lines_skipped_due_to_regex_timeout: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<StopReason>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrepResponse {
    pub pattern: String,
    pub matches: Vec<ScanMatch>,
    pub summary: GrepSummary,
}

/// One candidate file: resolved location plus its display spelling.
struct Candidate {
    resolved: PathBuf,
    display: String,
}

impl FsService {
    pub async fn grep(
        &self,
        request: GrepRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<GrepResponse> {
        let started = Instant::now();
        let matcher_options = MatcherOptions {
            case_sensitive: request.case_sensitive,
            whole_word: request.whole_word,
            literal: request.literal,
        };
        // Compile first: an unsafe or malformed pattern fails before any
        // file is opened.
        let matcher = Arc::new(Matcher::build(&request.pattern, matcher_options)?);

        let max_results = request
            .max_results
            .unwrap_or(traversal::MAX_RESULTS)
            .clamp(1, traversal::MAX_ENTRIES);
        let scan_options = ScanOptions {
            context_lines: request
                .context_lines
                .unwrap_or(search_caps::DEFAULT_CONTEXT_LINES)
                .min(search_caps::MAX_CONTEXT_LINES),
            max_matches: max_results,
            max_file_size: request
                .max_file_size
                .unwrap_or(limits().max_search_size)
                .min(search_caps::MAX_MAX_FILE_SIZE),
            skip_binary: request.skip_binary,
        };

        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let resolved = validate_existing_path(self.roots(), &request.path, &signal).await?;
        let metadata = tokio::fs::metadata(&resolved.resolved)
            .await
            .map_err(|e| ServiceError::from_io(e, &resolved.requested))?;

        let mut summary = GrepSummary::default();
        let candidates = if metadata.is_file() {
            summary.files_scanned = 1;
            vec![Candidate {
                resolved: resolved.resolved.clone(),
                display: relative_display(self.roots(), &resolved.requested),
            }]
        } else {
            let options = WalkOptions {
                pattern: request.file_pattern.clone(),
                exclude: request.exclude.clone(),
                include_hidden: request.include_hidden,
                case_sensitive: !cfg!(windows),
                only_files: true,
                respect_gitignore: request.respect_gitignore,
                // The walk produces scan candidates; its result cap is the
                // file-scan budget, not the match cap.
                max_results: request
                    .max_files_scanned
                    .unwrap_or(traversal::MAX_FILES_SCANNED),
                max_files_scanned: request
                    .max_files_scanned
                    .unwrap_or(traversal::MAX_FILES_SCANNED),
                ..WalkOptions::default()
            }
            .clamped();
            let outcome = walk(&resolved.resolved, &options, &signal).await?;
            summary.files_scanned = outcome.summary.files_scanned;
            summary.skipped_inaccessible = outcome.summary.skipped_inaccessible;
            if outcome.summary.truncated {
                summary.truncated = true;
                summary.stopped_reason = Some(match outcome.summary.stopped_reason {
                    Some(StopReason::MaxResults) | Some(StopReason::MaxFiles) => {
                        StopReason::MaxFiles
                    }
                    Some(reason) => reason,
                    None => StopReason::MaxFiles,
                });
            }
            outcome
                .entries
                .into_iter()
                .map(|entry| Candidate {
                    display: relative_display(self.roots(), &entry.absolute_path),
                    resolved: entry.absolute_path,
                })
                .collect()
        };

        let mut matches = match global_pool() {
            Some(pool) if candidates.len() > 1 => {
                self.scan_pooled(
                    pool,
                    candidates,
                    &request.pattern,
                    matcher_options,
                    &scan_options,
                    max_results,
                    &signal,
                    &mut summary,
                )
                .await
            }
            _ => {
                self.scan_sequential(
                    candidates,
                    Arc::clone(&matcher),
                    &scan_options,
                    max_results,
                    &signal,
                    &mut summary,
                )
                .await
            }
        };

        if signal.is_cancelled() && summary.stopped_reason.is_none() {
            summary.truncated = true;
            summary.stopped_reason = Some(StopReason::from_cause(signal.cause()));
        }

        // Deterministic output: (file, line), then the overall cap.
        matches.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));
        if matches.len() > max_results {
            matches.truncate(max_results);
            summary.truncated = true;
            summary.stopped_reason.get_or_insert(StopReason::MaxResults);
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            pattern = %request.pattern,
            matches = matches.len(),
            files_searched = summary.files_searched,
            "content search finished"
        );

        Ok(GrepResponse {
            pattern: request.pattern,
            matches,
            summary,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_sequential(
        &self,
        candidates: Vec<Candidate>,
        matcher: Arc<Matcher>,
        scan_options: &ScanOptions,
        max_results: usize,
        signal: &OperationSignal,
        summary: &mut GrepSummary,
    ) -> Vec<ScanMatch> {
        let mut matches = Vec::new();
        for candidate in candidates {
            if signal.is_cancelled() {
                summary.truncated = true;
                summary.stopped_reason = Some(StopReason::from_cause(signal.cause()));
                break;
            }
            if matches.len() >= max_results {
                summary.truncated = true;
                summary.stopped_reason.get_or_insert(StopReason::MaxResults);
                break;
            }

            let matcher = Arc::clone(&matcher);
            let options = scan_options.clone();
            let scan_signal = signal.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                scan_file(
                    &candidate.resolved,
                    &candidate.display,
                    &matcher,
                    &options,
                    &scan_signal,
                )
            })
            .await;

            match outcome {
                Ok(Ok(result)) => merge_result(result, &mut matches, summary),
                Ok(Err(_)) if signal.is_cancelled() => {}
                Ok(Err(_)) => summary.skipped_inaccessible += 1,
                Err(error) => {
                    debug!(%error, "scan task failed");
                    summary.skipped_inaccessible += 1;
                }
            }
        }
        matches
    }

    /// Pool path: keep `min(workers, remaining)` scans in flight; as each
    /// completes, merge and feed the next candidate.
    #[allow(clippy::too_many_arguments)]
    async fn scan_pooled(
        &self,
        pool: &'static SearchPool,
        candidates: Vec<Candidate>,
        pattern: &str,
        matcher_options: MatcherOptions,
        scan_options: &ScanOptions,
        max_results: usize,
        signal: &OperationSignal,
        summary: &mut GrepSummary,
    ) -> Vec<ScanMatch> {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(u64, ScanOutcome)>();
        let mut queue = candidates.into_iter();
        let mut in_flight: Vec<u64> = Vec::new();
        let mut matches = Vec::new();
        let mut draining = false;

        let mut dispatch = |candidate: Candidate, in_flight: &mut Vec<u64>| {
            let id = pool.next_request_id();
            let receiver = pool.submit(ScanRequest {
                id,
                resolved_path: candidate.resolved,
                requested_path: candidate.display,
                pattern: pattern.to_string(),
                matcher_options,
                scan_options: scan_options.clone(),
            });
            in_flight.push(id);
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                let outcome = receiver
                    .await
                    .unwrap_or_else(|_| ScanOutcome::Cancelled);
                let _ = done_tx.send((id, outcome));
            });
        };

        let window = pool.size().max(1);
        for _ in 0..window {
            match queue.next() {
                Some(candidate) => dispatch(candidate, &mut in_flight),
                None => break,
            }
        }

        while !in_flight.is_empty() {
            tokio::select! {
                biased;
                _ = signal.cancelled(), if !draining => {
                    draining = true;
                    summary.truncated = true;
                    summary.stopped_reason = Some(StopReason::from_cause(signal.cause()));
                    for &pending in &in_flight {
                        pool.cancel(pending);
                    }
                }
                received = done_rx.recv() => {
                    let Some((id, outcome)) = received else { break };
                    in_flight.retain(|&pending| pending != id);

                    match outcome {
                        ScanOutcome::Completed(result) => {
                            if !draining {
                                merge_result(result, &mut matches, summary);
                            }
                        }
                        ScanOutcome::Cancelled => {}
                        ScanOutcome::Failed(_) => summary.skipped_inaccessible += 1,
                    }

                    if !draining && matches.len() >= max_results {
                        draining = true;
                        summary.truncated = true;
                        summary.stopped_reason.get_or_insert(StopReason::MaxResults);
                        for &pending in &in_flight {
                            pool.cancel(pending);
                        }
                    }
                    if !draining && let Some(candidate) = queue.next() {
                        dispatch(candidate, &mut in_flight);
                    }
                }
            }
        }
        matches
    }
}

fn merge_result(
    result: crate::search::ScanResult,
    matches: &mut Vec<ScanMatch>,
    summary: &mut GrepSummary,
) {
    use crate::search::SkipKind;
    match result.skipped {
        Some(SkipKind::Binary) => summary.skipped_binary += 1,
        Some(SkipKind::TooLarge) => summary.skipped_too_large += 1,
        None => summary.files_searched += 1,
    }
    summary.lines_skipped_due_to_regex_timeout += result.lines_skipped_due_to_regex_timeout;
    matches.extend(result.matches);
}
