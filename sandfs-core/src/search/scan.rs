//! Per-file line scan: binary sniffing, context windows, and match caps.
//!
//! The scanner is synchronous; it runs on search worker threads or inside
//! `spawn_blocking` on the sequential path. The cancellation signal is
//! observed on every line.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::Serialize;

use crate::cancel::OperationSignal;
use crate::config::constants::search;
use crate::error::{ServiceError, ServiceResult};

use super::matcher::Matcher;

/// Per-scan configuration, already normalized by the facade.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub context_lines: usize,
    /// Per-file match cap; the facade applies the overall cap on merge.
    pub max_matches: usize,
    pub max_file_size: u64,
    pub skip_binary: bool,
}

/// One matching line with its context windows.
#[derive(Debug, Clone, Serialize)]
pub struct ScanMatch {
    pub file: String,
    pub line: usize,
    pub content: String,
    pub match_count: usize,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

/// Why a file was skipped without being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    TooLarge,
    Binary,
}

/// Outcome of scanning one file.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub matches: Vec<ScanMatch>,
    pub skipped: Option<SkipKind>,
    pub lines_scanned: usize,
    pub lines_skipped_due_to_regex_timeout: usize,
    pub hit_match_cap: bool,
}

/// Clamp stored line content: trim trailing whitespace, cap at 200 bytes on a
/// character boundary.
fn clamp_line(line: &str) -> String {
    let trimmed = line.trim_end();
    if trimmed.len() <= search::MAX_LINE_CONTENT_BYTES {
        return trimmed.to_string();
    }
    let mut cut = search::MAX_LINE_CONTENT_BYTES;
    while cut > 0 && !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    trimmed[..cut].to_string()
}

/// Binary sniff over the first 512 bytes: NUL byte, or too dense in invalid
/// UTF-8, classifies the file as binary.
fn looks_binary(prefix: &[u8]) -> bool {
    if prefix.is_empty() {
        return false;
    }
    if prefix.contains(&0) {
        return true;
    }
    let mut invalid = 0usize;
    let mut rest = prefix;
    loop {
        match std::str::from_utf8(rest) {
            Ok(_) => break,
            Err(error) => {
                let valid = error.valid_up_to();
                match error.error_len() {
                    Some(len) => {
                        invalid += len;
                        rest = &rest[valid + len..];
                    }
                    // Truncated trailing sequence, not corruption.
                    None => break,
                }
            }
        }
    }
    (invalid as f64) / (prefix.len() as f64) > search::BINARY_INVALID_DENSITY
}

/// Scan a single file line by line, collecting matches with context.
///
/// `display` is the path spelling recorded on matches (root-relative).
pub fn scan_file(
    path: &Path,
    display: &str,
    matcher: &Matcher,
    options: &ScanOptions,
    signal: &OperationSignal,
) -> ServiceResult<ScanResult> {
    let mut result = ScanResult::default();

    let metadata = std::fs::metadata(path).map_err(|e| ServiceError::from_io(e, path))?;
    if metadata.len() > options.max_file_size {
        result.skipped = Some(SkipKind::TooLarge);
        return Ok(result);
    }

    let file = File::open(path).map_err(|e| ServiceError::from_io(e, path))?;
    let mut reader = BufReader::new(file);

    if options.skip_binary {
        let mut sniff = [0u8; search::BINARY_SNIFF_BYTES];
        let mut filled = 0usize;
        loop {
            let n = reader
                .read(&mut sniff[filled..])
                .map_err(|e| ServiceError::from_io(e, path))?;
            if n == 0 {
                break;
            }
            filled += n;
            if filled == sniff.len() {
                break;
            }
        }
        if looks_binary(&sniff[..filled]) {
            result.skipped = Some(SkipKind::Binary);
            return Ok(result);
        }
        // Restart from the top with the sniffed bytes consumed.
        let file = File::open(path).map_err(|e| ServiceError::from_io(e, path))?;
        reader = BufReader::new(file);
    }

    let is_regex = matches!(matcher, Matcher::Regex(_));
    let mut before: Vec<String> = Vec::new();
    // Matches still owed `context_after` lines, by index into `result.matches`.
    let mut pending_after: Vec<(usize, usize)> = Vec::new();
    let mut raw = Vec::new();
    let mut line_number = 0usize;

    loop {
        signal.ensure_live()?;
        raw.clear();
        let n = reader
            .read_until(b'\n', &mut raw)
            .map_err(|e| ServiceError::from_io(e, path))?;
        if n == 0 {
            break;
        }
        line_number += 1;
        result.lines_scanned += 1;

        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        // Very long lines are skipped rather than handed to the regex engine.
        if is_regex && raw.len() > search::MAX_SCAN_LINE_BYTES {
            result.lines_skipped_due_to_regex_timeout += 1;
            continue;
        }

        let line = String::from_utf8_lossy(&raw);
        let match_count = matcher.count(&line);

        let clamped = clamp_line(&line);
        if options.context_lines > 0 {
            pending_after.retain_mut(|(index, remaining)| {
                result.matches[*index].context_after.push(clamped.clone());
                *remaining -= 1;
                *remaining > 0
            });
        }

        if match_count > 0 {
            result.matches.push(ScanMatch {
                file: display.to_string(),
                line: line_number,
                content: clamped,
                match_count,
                context_before: before.clone(),
                context_after: Vec::new(),
            });
            if options.context_lines > 0 {
                pending_after.push((result.matches.len() - 1, options.context_lines));
            }
            if result.matches.len() >= options.max_matches {
                result.hit_match_cap = true;
                break;
            }
        } else if options.context_lines > 0 {
            before.push(clamped);
            if before.len() > options.context_lines {
                before.remove(0);
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::matcher::{Matcher, MatcherOptions};
    use pretty_assertions::assert_eq;

    fn scan_str(content: &str, pattern: &str, options: ScanOptions) -> ScanResult {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.txt");
        std::fs::write(&path, content).unwrap();
        let matcher = Matcher::build(pattern, MatcherOptions::default()).unwrap();
        let signal = OperationSignal::never();
        scan_file(&path, "scan.txt", &matcher, &options, &signal).unwrap()
    }

    fn default_options() -> ScanOptions {
        ScanOptions {
            context_lines: 2,
            max_matches: 100,
            max_file_size: u64::MAX,
            skip_binary: true,
        }
    }

    #[test]
    fn matches_carry_line_numbers_and_counts() {
        let result = scan_str("alpha\nbeta beta\ngamma\n", "beta", default_options());
        assert_eq!(result.matches.len(), 1);
        let hit = &result.matches[0];
        assert_eq!(hit.line, 2);
        assert_eq!(hit.match_count, 2);
        assert_eq!(hit.content, "beta beta");
        assert_eq!(hit.context_before, vec!["alpha"]);
        assert_eq!(hit.context_after, vec!["gamma"]);
    }

    #[test]
    fn context_windows_are_bounded() {
        let content = "1\n2\n3\n4\nhit\n6\n7\n8\n";
        let result = scan_str(content, "hit", default_options());
        let hit = &result.matches[0];
        assert_eq!(hit.context_before, vec!["3", "4"]);
        assert_eq!(hit.context_after, vec!["6", "7"]);
        assert!(hit.context_before.len() + hit.context_after.len() <= 4);
    }

    #[test]
    fn match_cap_stops_the_scan() {
        let content = "x\nx\nx\nx\nx\n";
        let mut options = default_options();
        options.max_matches = 2;
        let result = scan_str(content, "x", options);
        assert_eq!(result.matches.len(), 2);
        assert!(result.hit_match_cap);
        assert_eq!(result.lines_scanned, 2);
    }

    #[test]
    fn oversized_file_is_skipped() {
        let mut options = default_options();
        options.max_file_size = 4;
        let result = scan_str("longer than four bytes\n", "four", options);
        assert_eq!(result.skipped, Some(SkipKind::TooLarge));
        assert!(result.matches.is_empty());
    }

    #[test]
    fn binary_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"PK\x03\x04\x00\x00binary\x00payload").unwrap();
        let matcher = Matcher::build("payload", MatcherOptions::default()).unwrap();
        let signal = OperationSignal::never();
        let result = scan_file(&path, "blob.bin", &matcher, &default_options(), &signal).unwrap();
        assert_eq!(result.skipped, Some(SkipKind::Binary));
    }

    #[test]
    fn long_line_content_is_clamped_and_trimmed() {
        let long = format!("needle {}   \n", "x".repeat(400));
        let result = scan_str(&long, "needle", default_options());
        let hit = &result.matches[0];
        assert!(hit.content.len() <= 200);
        assert!(!hit.content.ends_with(' '));
        assert_eq!(hit.match_count, 1);
    }

    #[test]
    fn crlf_lines_are_normalized() {
        let result = scan_str("one\r\ntwo hit\r\n", "hit", default_options());
        assert_eq!(result.matches[0].content, "two hit");
        assert_eq!(result.matches[0].context_before, vec!["one"]);
    }

    #[test]
    fn consecutive_matches_appear_in_each_others_context() {
        let result = scan_str("a hit\nb hit\nc\n", "hit", default_options());
        assert_eq!(result.matches.len(), 2);
        // The second match's line is appended to the first match's after-context.
        assert_eq!(result.matches[0].context_after, vec!["b hit", "c"]);
        // Matching lines never enter the before-context ring.
        assert!(result.matches[1].context_before.is_empty());
    }

    #[test]
    fn binary_sniff_math() {
        assert!(looks_binary(b"abc\x00def"));
        assert!(!looks_binary(b"plain text"));
        assert!(!looks_binary("héllo wörld".as_bytes()));
        let mostly_invalid: Vec<u8> = (0..100).map(|i| if i % 2 == 0 { 0xFF } else { b'a' }).collect();
        assert!(looks_binary(&mostly_invalid));
    }
}
