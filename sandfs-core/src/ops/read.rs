//! Single-file reads: full, head, tail, or line range.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cancel::OperationSignal;
use crate::config::limits;
use crate::error::{ServiceError, ServiceResult};
use crate::io::{LineChunk, read_capped, read_head, read_line_range, read_tail};
use crate::mime::mime_type_for;
use crate::path::{ResolvedPath, relative_display, validate_existing_path};

use super::{FsService, ensure_file};

/// At most one of `head`, `tail`, or `lineStart`/`lineEnd` may be supplied;
/// omitting all three reads the whole file (subject to the size cap).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadRequest {
    pub path: String,
    pub head: Option<usize>,
    pub tail: Option<usize>,
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    /// Byte budget for this read; clamped to the configured cap.
    pub max_bytes: Option<u64>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadMode {
    Full,
    Head,
    Tail,
    LineRange,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse {
    pub path: String,
    pub mode: ReadMode,
    pub content: String,
    pub truncated: bool,
    pub has_more_lines: bool,
    pub bytes_read: u64,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Selection {
    Full,
    Head(usize),
    Tail(usize),
    Range(usize, usize),
}

/// Enforce the at-most-one partial-read rule shared by `read` and
/// `read_many`.
pub(crate) fn selection_from(
    head: Option<usize>,
    tail: Option<usize>,
    line_start: Option<usize>,
    line_end: Option<usize>,
) -> ServiceResult<Selection> {
    let mut modes = 0;
    if head.is_some() {
        modes += 1;
    }
    if tail.is_some() {
        modes += 1;
    }
    if line_start.is_some() || line_end.is_some() {
        modes += 1;
    }
    if modes > 1 {
        return Err(ServiceError::invalid_input(
            "At most one of 'head', 'tail', or 'lineStart'/'lineEnd' may be given",
        ));
    }

    if let Some(head) = head {
        return Ok(Selection::Head(head));
    }
    if let Some(tail) = tail {
        return Ok(Selection::Tail(tail));
    }
    match (line_start, line_end) {
        (Some(start), Some(end)) => Ok(Selection::Range(start, end)),
        (None, None) => Ok(Selection::Full),
        _ => Err(ServiceError::invalid_input(
            "'lineStart' and 'lineEnd' must be supplied together",
        )),
    }
}

impl ReadRequest {
    fn selection(&self) -> ServiceResult<Selection> {
        selection_from(self.head, self.tail, self.line_start, self.line_end)
    }
}

impl FsService {
    pub async fn read(
        &self,
        request: ReadRequest,
        cancel: Option<CancellationToken>,
    ) -> ServiceResult<ReadResponse> {
        let selection = request.selection()?;
        let (signal, _guard) = self.signal_for(request.timeout_ms, cancel);
        let resolved = validate_existing_path(self.roots(), &request.path, &signal).await?;
        let size = ensure_file(&resolved).await?;

        let cap = request
            .max_bytes
            .unwrap_or(limits().max_file_size)
            .min(limits().max_file_size);

        self.read_selected(&resolved, selection, size, cap, &signal).await
    }

    pub(crate) async fn read_selected(
        &self,
        resolved: &ResolvedPath,
        selection: Selection,
        size: u64,
        cap: u64,
        signal: &OperationSignal,
    ) -> ServiceResult<ReadResponse> {
        let path = &resolved.resolved;
        let display = relative_display(self.roots(), &resolved.requested);
        let mime_type = mime_type_for(path);

        let (mode, chunk) = match selection {
            Selection::Full => {
                let bytes = read_capped(path, cap, signal).await?;
                let content = String::from_utf8_lossy(&bytes).into_owned();
                return Ok(ReadResponse {
                    path: display,
                    mode: ReadMode::Full,
                    bytes_read: bytes.len() as u64,
                    content,
                    truncated: false,
                    has_more_lines: false,
                    size,
                    mime_type,
                });
            }
            Selection::Head(count) => (ReadMode::Head, read_head(path, count, cap, signal).await?),
            Selection::Tail(count) => (ReadMode::Tail, read_tail(path, count, cap, signal).await?),
            Selection::Range(start, end) => (
                ReadMode::LineRange,
                read_line_range(path, start, end, cap, signal).await?,
            ),
        };

        Ok(ReadResponse {
            path: display,
            mode,
            content: join_lines(&chunk),
            truncated: chunk.truncated,
            has_more_lines: chunk.has_more_lines,
            bytes_read: chunk.bytes_read,
            size,
            mime_type,
        })
    }
}

pub(crate) fn join_lines(chunk: &LineChunk) -> String {
    chunk.lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::service_at;
    use pretty_assertions::assert_eq;

    fn request(path: &str) -> ReadRequest {
        ReadRequest {
            path: path.to_string(),
            head: None,
            tail: None,
            line_start: None,
            line_end: None,
            max_bytes: None,
            timeout_ms: None,
        }
    }

    async fn fixture(lines: usize) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        let content: String = (1..=lines).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, content).unwrap();
        let path = path.to_str().unwrap().to_string();
        (dir, path)
    }

    #[tokio::test]
    async fn full_read_returns_everything() {
        let (_dir, path) = fixture(3).await;
        let service = service_at(std::path::Path::new(&path).parent().unwrap());
        let response = service.read(request(&path), None).await.unwrap();
        assert_eq!(response.mode, ReadMode::Full);
        assert_eq!(response.content, "line 1\nline 2\nline 3\n");
        assert!(!response.truncated);
    }

    #[tokio::test]
    async fn head_cap_matches_contract() {
        let (_dir, path) = fixture(100).await;
        let service = service_at(std::path::Path::new(&path).parent().unwrap());

        let mut req = request(&path);
        req.head = Some(200);
        let response = service.read(req, None).await.unwrap();
        assert_eq!(response.content.lines().count(), 100);
        assert!(!response.truncated);

        let mut req = request(&path);
        req.head = Some(5);
        let response = service.read(req, None).await.unwrap();
        assert_eq!(response.content.lines().count(), 5);
        assert!(response.truncated);
        assert!(response.has_more_lines);
    }

    #[tokio::test]
    async fn tail_and_range_modes_work() {
        let (_dir, path) = fixture(10).await;
        let service = service_at(std::path::Path::new(&path).parent().unwrap());

        let mut req = request(&path);
        req.tail = Some(2);
        let response = service.read(req, None).await.unwrap();
        assert_eq!(response.content, "line 9\nline 10");

        let mut req = request(&path);
        req.line_start = Some(4);
        req.line_end = Some(6);
        let response = service.read(req, None).await.unwrap();
        assert_eq!(response.content, "line 4\nline 5\nline 6");
    }

    #[tokio::test]
    async fn conflicting_modes_are_rejected() {
        let (_dir, path) = fixture(3).await;
        let service = service_at(std::path::Path::new(&path).parent().unwrap());

        let mut req = request(&path);
        req.head = Some(1);
        req.tail = Some(1);
        let err = service.read(req, None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);

        let mut req = request(&path);
        req.line_start = Some(1);
        let err = service.read(req, None).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn directory_read_is_not_file() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_at(dir.path());
        let err = service
            .read(request(dir.path().to_str().unwrap()), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::NotFile);
    }
}
