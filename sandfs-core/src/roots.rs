//! The allowed-root set: every directory the service is permitted to touch.
//!
//! A [`RootSet`] is immutable once built. The process-wide snapshot is
//! installed exactly once via [`init_allowed_roots`]; afterwards reads are
//! lock-free.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::path::normalize_path;

/// One configured root: the supplied path and its realpath when different.
#[derive(Debug, Clone)]
pub struct RootEntry {
    pub path: PathBuf,
    pub real: PathBuf,
}

/// Immutable set of allowed roots.
#[derive(Debug, Clone, Default)]
pub struct RootSet {
    entries: Vec<RootEntry>,
}

impl RootSet {
    /// Validate and resolve the supplied directories into a root set.
    ///
    /// Each path must be absolute and name an existing directory. The
    /// effective set is the union of each path and its realpath.
    pub fn resolve(paths: &[PathBuf], allow_cwd: bool) -> ServiceResult<Self> {
        let mut candidates: Vec<PathBuf> = paths.to_vec();
        if allow_cwd {
            let cwd = std::env::current_dir().map_err(|e| {
                ServiceError::unknown(format!("Cannot resolve working directory: {e}"))
            })?;
            candidates.push(cwd);
        }

        if candidates.is_empty() {
            return Err(ServiceError::invalid_input(
                "No allowed roots configured; supply at least one directory",
            ));
        }

        let mut entries = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !candidate.is_absolute() {
                return Err(ServiceError::invalid_input(format!(
                    "Allowed root must be absolute: '{}'",
                    candidate.display()
                )));
            }
            let normalized = normalize_path(&candidate);
            let real = std::fs::canonicalize(&normalized)
                .map_err(|error| ServiceError::from_io(error, &normalized))?;
            if !real.is_dir() {
                return Err(ServiceError::not_directory(&normalized));
            }
            if real != normalized {
                info!(
                    path = %normalized.display(),
                    real = %real.display(),
                    "allowed root resolves through a symlink; accepting both spellings"
                );
            }
            entries.push(RootEntry {
                path: normalized,
                real,
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RootEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when `path` lies under some allowed root at a segment boundary.
    ///
    /// Both the supplied root path and its realpath count as containers, so a
    /// caller-supplied symlinked root works with either spelling.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries
            .iter()
            .any(|entry| path_starts_with(path, &entry.path) || path_starts_with(path, &entry.real))
    }

    /// The single root, when exactly one is configured. Relative request
    /// paths are only resolvable against an unambiguous base.
    pub fn sole_root(&self) -> Option<&RootEntry> {
        match self.entries.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Segment-boundary prefix check, case-insensitive on Windows.
fn path_starts_with(path: &Path, prefix: &Path) -> bool {
    if cfg!(windows) {
        let mut path_parts = path.components();
        for prefix_part in prefix.components() {
            match path_parts.next() {
                Some(part)
                    if part
                        .as_os_str()
                        .eq_ignore_ascii_case(prefix_part.as_os_str()) => {}
                _ => return false,
            }
        }
        true
    } else {
        path.starts_with(prefix)
    }
}

static ROOTS: OnceCell<RootSet> = OnceCell::new();

/// Install the process-wide root set. Callable once; later calls fail.
pub fn init_allowed_roots(paths: &[PathBuf], allow_cwd: bool) -> ServiceResult<()> {
    let set = RootSet::resolve(paths, allow_cwd)?;
    ROOTS
        .set(set)
        .map_err(|_| ServiceError::invalid_input("Allowed roots already initialized"))
}

/// The installed snapshot. Errors when initialization never ran.
pub fn allowed_roots() -> ServiceResult<&'static RootSet> {
    ROOTS.get().ok_or_else(|| {
        warn!("operation attempted before allowed roots were configured");
        ServiceError::invalid_input("No allowed roots configured")
    })
}
