//! Unified-diff parsing into hunks.

use super::error::PatchError;
use super::{DiffLine, Hunk};

const OLD_FILE_MARKER: &str = "--- ";
const NEW_FILE_MARKER: &str = "+++ ";
const HUNK_MARKER: &str = "@@ ";
const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

pub(crate) struct ParsedPatch {
    pub hunks: Vec<Hunk>,
    /// The patched result should not end with a newline.
    pub new_no_newline: bool,
}

pub(crate) fn parse(input: &str) -> Result<ParsedPatch, PatchError> {
    if input.trim().is_empty() {
        return Err(PatchError::EmptyInput);
    }

    let lines: Vec<&str> = input.lines().collect();
    let mut hunks = Vec::new();
    let mut new_no_newline = false;
    let mut index = 0usize;

    // Leading garbage (git headers, `diff --git`, `index` lines) is skipped
    // up to the first file marker or hunk header.
    while index < lines.len() {
        let line = lines[index];
        if line.starts_with(OLD_FILE_MARKER) || line.starts_with(HUNK_MARKER) {
            break;
        }
        index += 1;
    }

    if index < lines.len() && lines[index].starts_with(OLD_FILE_MARKER) {
        index += 1;
        if index >= lines.len() || !lines[index].starts_with(NEW_FILE_MARKER) {
            return Err(PatchError::InvalidFormat {
                line: index + 1,
                message: format!("expected '{NEW_FILE_MARKER}' after '{OLD_FILE_MARKER}'"),
            });
        }
        index += 1;
    }

    while index < lines.len() {
        let line = lines[index];
        if line.starts_with(HUNK_MARKER) || line == "@@" {
            let (hunk, consumed, saw_no_newline) = parse_hunk(&lines[index..], index + 1)?;
            hunks.push(hunk);
            new_no_newline = new_no_newline || saw_no_newline;
            index += consumed;
        } else if line.trim().is_empty() {
            index += 1;
        } else if line.starts_with(OLD_FILE_MARKER) {
            return Err(PatchError::InvalidFormat {
                line: index + 1,
                message: "multiple file headers; the patch operation targets one file".to_string(),
            });
        } else {
            return Err(PatchError::InvalidFormat {
                line: index + 1,
                message: format!("unexpected line '{line}'"),
            });
        }
    }

    if hunks.is_empty() {
        return Err(PatchError::NoHunks);
    }
    Ok(ParsedPatch {
        hunks,
        new_no_newline,
    })
}

/// Parse `@@ -l[,c] +l[,c] @@` plus the hunk body.
fn parse_hunk(lines: &[&str], line_number: usize) -> Result<(Hunk, usize, bool), PatchError> {
    let header = lines[0];
    let (old_start, old_count, new_start, new_count) = parse_hunk_header(header, line_number)?;

    let mut hunk = Hunk {
        old_start,
        old_count,
        new_start,
        new_count,
        lines: Vec::new(),
    };
    let mut consumed = 1usize;
    let mut old_seen = 0usize;
    let mut new_seen = 0usize;
    let mut no_newline = false;

    while consumed < lines.len() && (old_seen < old_count || new_seen < new_count) {
        let raw = lines[consumed];
        if raw.starts_with(NO_NEWLINE_MARKER) || raw.starts_with('\\') {
            // Marker applies to the preceding line; only an addition or kept
            // context affects the produced content.
            no_newline = !matches!(hunk.lines.last(), Some(DiffLine::Remove(_)));
            consumed += 1;
            continue;
        }
        match raw.chars().next() {
            Some(' ') => {
                hunk.lines.push(DiffLine::Context(raw[1..].to_string()));
                old_seen += 1;
                new_seen += 1;
            }
            Some('+') => {
                hunk.lines.push(DiffLine::Add(raw[1..].to_string()));
                new_seen += 1;
            }
            Some('-') => {
                hunk.lines.push(DiffLine::Remove(raw[1..].to_string()));
                old_seen += 1;
            }
            // Some producers emit genuinely empty lines for empty context.
            None => {
                hunk.lines.push(DiffLine::Context(String::new()));
                old_seen += 1;
                new_seen += 1;
            }
            _ => {
                return Err(PatchError::InvalidFormat {
                    line: line_number + consumed,
                    message: format!("unexpected line '{raw}' inside hunk body"),
                });
            }
        }
        consumed += 1;
    }

    if old_seen != old_count || new_seen != new_count {
        return Err(PatchError::InvalidFormat {
            line: line_number,
            message: format!(
                "hunk body does not match header counts (-{old_count} +{new_count}, saw -{old_seen} +{new_seen})"
            ),
        });
    }

    // A trailing no-newline marker can follow the final body line.
    if consumed < lines.len() && lines[consumed].starts_with('\\') {
        no_newline = !matches!(hunk.lines.last(), Some(DiffLine::Remove(_)));
        consumed += 1;
    }

    Ok((hunk, consumed, no_newline))
}

fn parse_hunk_header(
    header: &str,
    line_number: usize,
) -> Result<(usize, usize, usize, usize), PatchError> {
    let invalid = |message: String| PatchError::InvalidFormat {
        line: line_number,
        message,
    };

    let body = header
        .strip_prefix("@@")
        .ok_or_else(|| invalid(format!("expected hunk header, found '{header}'")))?;
    let end = body
        .find("@@")
        .ok_or_else(|| invalid("hunk header is missing the closing '@@'".to_string()))?;
    let ranges = body[..end].trim();

    let mut old = None;
    let mut new = None;
    for part in ranges.split_whitespace() {
        if let Some(range) = part.strip_prefix('-') {
            old = Some(parse_range(range).ok_or_else(|| invalid(format!("bad old range '{part}'")))?);
        } else if let Some(range) = part.strip_prefix('+') {
            new = Some(parse_range(range).ok_or_else(|| invalid(format!("bad new range '{part}'")))?);
        }
    }

    let (old_start, old_count) =
        old.ok_or_else(|| invalid("hunk header is missing the old range".to_string()))?;
    let (new_start, new_count) =
        new.ok_or_else(|| invalid("hunk header is missing the new range".to_string()))?;
    Ok((old_start, old_count, new_start, new_count))
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}
