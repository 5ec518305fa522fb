//! Multi-file reads with a pre-read byte budget.
//!
//! Before any content I/O, the facade sums each file's estimated
//! contribution (full size for full reads, `min(size, maxPerFile)` for
//! partial reads). Files that would push the total past `maxTotalSize` get a
//! budget-overflow error entry and are never opened.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::batch::parallel_map;
use crate::config::constants::read as read_caps;
use crate::config::limits;
use crate::error::{ErrorCode, ErrorEnvelope, ServiceError, ServiceResult};
use crate::path::ResolvedPath;
use crate::path::validate_existing_path;

use super::read::{Selection, selection_from};
use super::{BatchSummary, FsService, ReadResponse, ensure_file};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadManyRequest {
    pub paths: Vec<String>,
    /// Partial-read mode applied to every file; at most one may be set.
    pub head: Option<usize>,
    pub tail: Option<usize>,
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    /// Per-file byte estimate used for partial reads in the budget pass.
    pub max_per_file: Option<u64>,
    /// Aggregate byte budget across all files.
    pub max_total_size: Option<u64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadManyEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ReadResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadManyResponse {
    pub entries: Vec<ReadManyEntry>,
    pub summary: BatchSummary,
}

/// Per-path plan produced by validation + the budget pass.
enum Plan {
    Read(ResolvedPath, u64),
    Reject(ServiceError),
}

impl FsService {
    pub async fn read_many(
        &self,
        request: ReadManyRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<ReadManyResponse> {
        if request.paths.is_empty() {
            return Err(ServiceError::invalid_input("At least one path is required"));
        }
        let selection = selection_from(
            request.head,
            request.tail,
            request.line_start,
            request.line_end,
        )?;

        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let per_file_cap = request
            .max_per_file
            .unwrap_or(limits().max_file_size)
            .min(limits().max_file_size);
        let total_budget = request
            .max_total_size
            .unwrap_or(read_caps::DEFAULT_MAX_TOTAL_SIZE);

        // Budget pass: validate and stat every path before reading anything.
        let mut plans = Vec::with_capacity(request.paths.len());
        let mut spent: u64 = 0;
        for path in &request.paths {
            let plan = match validate_existing_path(self.roots(), path, &signal).await {
                Ok(resolved) => match ensure_file(&resolved).await {
                    Ok(size) => {
                        let estimate = match selection {
                            Selection::Full => size,
                            _ => size.min(per_file_cap),
                        };
                        if spent.saturating_add(estimate) > total_budget {
                            Plan::Reject(
                                ServiceError::new(
                                    ErrorCode::TooLarge,
                                    format!(
                                        "Read budget exceeded: '{path}' needs ~{estimate} bytes, {remaining} of {total_budget} remain",
                                        remaining = total_budget.saturating_sub(spent),
                                    ),
                                )
                                .with_path(&resolved.requested),
                            )
                        } else {
                            spent += estimate;
                            Plan::Read(resolved, size)
                        }
                    }
                    Err(error) => Plan::Reject(error),
                },
                Err(error) => Plan::Reject(error),
            };
            plans.push(plan);
        }

        let service = self.clone();
        let work_signal = signal.clone();
        let results = parallel_map(
            plans,
            limits().parallel_concurrency,
            &signal,
            move |_, plan| {
                let service = service.clone();
                let signal = work_signal.clone();
                async move {
                    match plan {
                        Plan::Reject(error) => Err(error),
                        Plan::Read(resolved, size) => {
                            service
                                .read_selected(&resolved, selection, size, per_file_cap, &signal)
                                .await
                        }
                    }
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
                Ok(content) => {
                    summary.succeeded += 1;
                    ReadManyEntry {
                        path,
                        content: Some(content),
                        error: None,
                    }
                }
                Err(error) => {
                    summary.failed += 1;
                    ReadManyEntry {
                        path,
                        content: None,
                        error: Some(error.to_envelope()),
                    }
                }
            })
            .collect();

        Ok(ReadManyResponse { entries, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::service_at;
    use pretty_assertions::assert_eq;

    fn request(paths: Vec<String>) -> ReadManyRequest {
        ReadManyRequest {
            paths,
            head: None,
            tail: None,
            line_start: None,
            line_end: None,
            max_per_file: None,
            max_total_size: None,
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn reads_multiple_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(dir.path().join("b.txt"), "beta").unwrap();

        let service = service_at(dir.path());
        let response = service
            .read_many(
                request(vec![
                    format!("{}/a.txt", dir.path().display()),
                    format!("{}/b.txt", dir.path().display()),
                ]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.summary.succeeded, 2);
        assert_eq!(
            response.entries[0].content.as_ref().unwrap().content,
            "alpha"
        );
        assert_eq!(response.entries[1].content.as_ref().unwrap().content, "beta");
    }

    #[tokio::test]
    async fn budget_overflow_rejects_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x".repeat(50_000)).unwrap();
        std::fs::write(dir.path().join("b.txt"), "y".repeat(50_000)).unwrap();

        let service = service_at(dir.path());
        let mut req = request(vec![
            format!("{}/a.txt", dir.path().display()),
            format!("{}/b.txt", dir.path().display()),
        ]);
        req.head = Some(1);
        req.max_total_size = Some(10);
        let response = service.read_many(req, None).await.unwrap();

        assert_eq!(response.summary.failed, 2);
        for entry in &response.entries {
            assert!(entry.content.is_none());
            let error = entry.error.as_ref().unwrap();
            assert_eq!(error.code, ErrorCode::TooLarge);
            assert!(error.message.contains("budget"));
        }
    }

    #[tokio::test]
    async fn per_entry_errors_do_not_fail_the_call() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.txt"), "fine").unwrap();

        let service = service_at(dir.path());
        let response = service
            .read_many(
                request(vec![
                    format!("{}/ok.txt", dir.path().display()),
                    format!("{}/gone.txt", dir.path().display()),
                ]),
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.summary.succeeded, 1);
        assert_eq!(response.summary.failed, 1);
        assert_eq!(
            response.entries[1].error.as_ref().unwrap().code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn shared_partial_mode_applies_to_each_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "1\n2\n3\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "x\ny\nz\n").unwrap();

        let service = service_at(dir.path());
        let mut req = request(vec![
            format!("{}/a.txt", dir.path().display()),
            format!("{}/b.txt", dir.path().display()),
        ]);
        req.head = Some(1);
        let response = service.read_many(req, None).await.unwrap();
        assert_eq!(response.entries[0].content.as_ref().unwrap().content, "1");
        assert_eq!(response.entries[1].content.as_ref().unwrap().content, "x");
    }
}
