//! Bounded, cancellable directory traversal with glob and gitignore filters.
//!
//! The walker is breadth-first and deterministic per directory (entries are
//! visited in name order). It never follows symlinks unless asked; symlinks
//! still surface as entries of their own kind. Facades apply final sorting.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use glob::{MatchOptions, Pattern};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::Serialize;
use tracing::debug;

use crate::cancel::{CancelCause, OperationSignal};
use crate::config::constants::{DEFAULT_EXCLUDED_DIRS, traversal};
use crate::error::{ServiceError, ServiceResult};
use crate::path::to_posix;

/// What a directory entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// A single traversal result. `absolute_path` is canonical-by-construction:
/// the walk starts from a validated root and appends plain names only.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub absolute_path: PathBuf,
    /// POSIX-separated path relative to the walk root.
    pub relative_path: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<PathBuf>,
    #[serde(skip)]
    pub depth: usize,
}

/// Why a stream stopped before exhausting its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    #[serde(rename = "maxResults")]
    MaxResults,
    #[serde(rename = "maxFiles")]
    MaxFiles,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl StopReason {
    pub fn from_cause(cause: Option<CancelCause>) -> Self {
        match cause {
            Some(CancelCause::Timeout) => Self::Timeout,
            _ => Self::Cancelled,
        }
    }
}

/// Counters accumulated over one traversal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WalkSummary {
    pub files_scanned: usize,
    pub skipped_inaccessible: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<StopReason>,
}

/// Traversal configuration. Callers may lower the caps, never raise them.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Positive glob; `None` matches everything.
    pub pattern: Option<String>,
    /// Exclude globs, matched against basenames and root-relative paths.
    pub exclude: Vec<String>,
    pub include_hidden: bool,
    /// Match the pattern against basenames when it contains no `/`.
    pub base_name_match: bool,
    pub case_sensitive: bool,
    pub max_depth: usize,
    pub follow_symlinks: bool,
    pub only_files: bool,
    /// Populate `size`/`mtime` on every emitted entry.
    pub with_stats: bool,
    /// Honor a `.gitignore` at the walk root.
    pub respect_gitignore: bool,
    /// Apply the built-in junk-directory exclude list.
    pub default_excludes: bool,
    pub max_results: usize,
    pub max_files_scanned: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            pattern: None,
            exclude: Vec::new(),
            include_hidden: false,
            base_name_match: true,
            case_sensitive: !cfg!(windows),
            max_depth: traversal::MAX_DEPTH,
            follow_symlinks: false,
            only_files: false,
            with_stats: false,
            respect_gitignore: false,
            default_excludes: true,
            max_results: traversal::MAX_RESULTS,
            max_files_scanned: traversal::MAX_FILES_SCANNED,
        }
    }
}

impl WalkOptions {
    /// Clamp caller-supplied bounds to the hard caps.
    pub fn clamped(mut self) -> Self {
        self.max_depth = self.max_depth.min(traversal::MAX_DEPTH);
        self.max_results = self.max_results.clamp(1, traversal::MAX_ENTRIES);
        self.max_files_scanned = self.max_files_scanned.clamp(1, traversal::MAX_FILES_SCANNED);
        self
    }
}

/// Entries plus the traversal summary.
#[derive(Debug)]
pub struct WalkOutcome {
    pub entries: Vec<FileEntry>,
    pub summary: WalkSummary,
}

/// Compiled positive glob. Patterns with a leading `**/` also try the bare
/// remainder so top-level entries match the way callers expect.
struct GlobMatcher {
    primary: Pattern,
    stripped: Option<Pattern>,
    basename_only: bool,
    options: MatchOptions,
}

impl GlobMatcher {
    fn compile(raw: &str, base_name_match: bool, case_sensitive: bool) -> ServiceResult<Self> {
        let primary = Pattern::new(raw)
            .map_err(|e| ServiceError::invalid_input(format!("Invalid glob pattern '{raw}': {e}")))?;
        let stripped = raw
            .strip_prefix("**/")
            .map(Pattern::new)
            .transpose()
            .map_err(|e| ServiceError::invalid_input(format!("Invalid glob pattern '{raw}': {e}")))?;
        Ok(Self {
            primary,
            stripped,
            basename_only: base_name_match && !raw.contains('/'),
            options: MatchOptions {
                case_sensitive,
                require_literal_separator: true,
                require_literal_leading_dot: false,
            },
        })
    }

    fn matches(&self, name: &str, relative: &str) -> bool {
        let target = if self.basename_only { name } else { relative };
        if self.primary.matches_with(target, self.options) {
            return true;
        }
        self.stripped
            .as_ref()
            .is_some_and(|p| p.matches_with(relative, self.options))
    }
}

/// Compiled exclude set: each glob tests basenames and relative paths.
struct ExcludeSet {
    patterns: Vec<Pattern>,
    options: MatchOptions,
}

impl ExcludeSet {
    fn compile(globs: &[String], case_sensitive: bool) -> ServiceResult<Self> {
        let patterns = globs
            .iter()
            .map(|g| {
                Pattern::new(g).map_err(|e| {
                    ServiceError::invalid_input(format!("Invalid exclude pattern '{g}': {e}"))
                })
            })
            .collect::<ServiceResult<Vec<_>>>()?;
        Ok(Self {
            patterns,
            options: MatchOptions {
                case_sensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    fn excluded(&self, name: &str, relative: &str) -> bool {
        self.patterns.iter().any(|p| {
            p.matches_with(name, self.options) || p.matches_with(relative, self.options)
        })
    }
}

fn load_root_gitignore(root: &Path) -> Option<Gitignore> {
    let file = root.join(".gitignore");
    if !file.is_file() {
        return None;
    }
    let mut builder = GitignoreBuilder::new(root);
    builder.add(&file);
    match builder.build() {
        Ok(matcher) => Some(matcher),
        Err(error) => {
            debug!(path = %file.display(), %error, "ignoring unparseable .gitignore");
            None
        }
    }
}

/// Walk `root` breadth-first, emitting entries that pass every filter.
///
/// `root` must be a validated directory. Per-entry failures (unreadable
/// directories, races with deletion) increment `skipped_inaccessible` and the
/// walk continues.
pub async fn walk(
    root: &Path,
    options: &WalkOptions,
    signal: &OperationSignal,
) -> ServiceResult<WalkOutcome> {
    let matcher = options
        .pattern
        .as_deref()
        .map(|p| GlobMatcher::compile(p, options.base_name_match, options.case_sensitive))
        .transpose()?;
    let exclude = ExcludeSet::compile(&options.exclude, options.case_sensitive)?;
    let gitignore = if options.respect_gitignore {
        load_root_gitignore(root)
    } else {
        None
    };

    let mut entries: Vec<FileEntry> = Vec::new();
    let mut summary = WalkSummary::default();
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::from([(root.to_path_buf(), 0)]);

    'walk: while let Some((dir, depth)) = queue.pop_front() {
        if signal.is_cancelled() {
            summary.truncated = true;
            summary.stopped_reason = Some(StopReason::from_cause(signal.cause()));
            break;
        }

        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(error) => {
                debug!(path = %dir.display(), %error, "skipping unreadable directory");
                summary.skipped_inaccessible += 1;
                continue;
            }
        };

        // Deterministic visit order within a directory.
        let mut children = Vec::new();
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => children.push(entry),
                Ok(None) => break,
                Err(_) => {
                    summary.skipped_inaccessible += 1;
                    break;
                }
            }
        }
        children.sort_by_key(|e| e.file_name());

        for child in children {
            if signal.is_cancelled() {
                summary.truncated = true;
                summary.stopped_reason = Some(StopReason::from_cause(signal.cause()));
                break 'walk;
            }
            if summary.files_scanned >= options.max_files_scanned {
                summary.truncated = true;
                summary.stopped_reason = Some(StopReason::MaxFiles);
                break 'walk;
            }
            summary.files_scanned += 1;

            let name = child.file_name().to_string_lossy().into_owned();
            let absolute = child.path();
            let relative = absolute
                .strip_prefix(root)
                .map(to_posix)
                .unwrap_or_else(|_| name.clone());

            if !options.include_hidden && name.starts_with('.') {
                continue;
            }

            let file_type = match child.file_type().await {
                Ok(ft) => ft,
                Err(_) => {
                    summary.skipped_inaccessible += 1;
                    continue;
                }
            };
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            let is_dir = kind == EntryKind::Directory;

            if options.default_excludes
                && is_dir
                && DEFAULT_EXCLUDED_DIRS.contains(&name.as_str())
            {
                continue;
            }
            if exclude.excluded(&name, &relative) {
                continue;
            }
            if let Some(gitignore) = &gitignore
                && gitignore.matched(&relative, is_dir).is_ignore()
            {
                continue;
            }

            let traverse_into = is_dir
                || (kind == EntryKind::Symlink
                    && options.follow_symlinks
                    && tokio::fs::metadata(&absolute)
                        .await
                        .map(|m| m.is_dir())
                        .unwrap_or(false));

            let pattern_ok = matcher
                .as_ref()
                .map(|m| m.matches(&name, &relative))
                .unwrap_or(true);
            let kind_ok = !options.only_files || kind == EntryKind::File;

            if pattern_ok && kind_ok {
                let mut entry = FileEntry {
                    name,
                    absolute_path: absolute.clone(),
                    relative_path: relative,
                    kind,
                    size: None,
                    mtime: None,
                    symlink_target: None,
                    depth: depth + 1,
                };
                if options.with_stats || kind == EntryKind::Symlink {
                    populate_stats(&mut entry, kind).await;
                }
                entries.push(entry);
                if entries.len() >= options.max_results {
                    summary.truncated = true;
                    summary.stopped_reason = Some(StopReason::MaxResults);
                    break 'walk;
                }
            }

            if traverse_into && depth + 1 < options.max_depth {
                queue.push_back((absolute, depth + 1));
            }
        }
    }

    Ok(WalkOutcome { entries, summary })
}

async fn populate_stats(entry: &mut FileEntry, kind: EntryKind) {
    if kind == EntryKind::Symlink {
        entry.symlink_target = tokio::fs::read_link(&entry.absolute_path).await.ok();
    }
    if let Ok(metadata) = tokio::fs::symlink_metadata(&entry.absolute_path).await {
        entry.size = Some(metadata.len());
        entry.mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
    }
}
