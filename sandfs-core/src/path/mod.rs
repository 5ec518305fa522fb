//! Path safety: normalization, symlink resolution, and containment checks.
//!
//! Every request path passes through [`validate_existing_path`] or
//! [`validate_path_for_write`] before any I/O touches it. Both defeat
//! traversal (`..`), symlink escapes, and create-a-link-then-write attacks by
//! checking containment against the allowed roots *after* resolution.

use std::path::{Component, Path, PathBuf};

use crate::cancel::OperationSignal;
use crate::config::constants::symlink;
use crate::error::{ServiceError, ServiceResult};
use crate::roots::RootSet;

/// A validated path pair: the canonical form of what the caller asked for and
/// the fully resolved (post-symlink) target. Both are contained; callers pick
/// whichever form the operation needs.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub requested: PathBuf,
    pub resolved: PathBuf,
}

/// Collapse `.` and `..` lexically, never touching the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Reserved device basenames (`CON`, `NUL`, `COM1`, ...), extension ignored.
///
/// Refused on every platform so request handling stays portable.
pub fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    let upper = stem.to_ascii_uppercase();
    match upper.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => {
            if let Some(digit) = upper.strip_prefix("COM").or_else(|| upper.strip_prefix("LPT")) {
                matches!(digit, "1" | "2" | "3" | "4" | "5" | "6" | "7" | "8" | "9")
            } else {
                false
            }
        }
    }
}

/// Drive-relative Windows paths (`C:foo`) are ambiguous and always rejected.
pub fn is_drive_relative(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && bytes[2] != b'\\'
        && bytes[2] != b'/'
}

fn reject_reserved_segments(path: &Path) -> ServiceResult<()> {
    for component in path.components() {
        if let Component::Normal(part) = component {
            let name = part.to_string_lossy();
            if is_reserved_device_name(&name) {
                return Err(ServiceError::invalid_input(format!(
                    "Reserved device name in path: '{name}'"
                ))
                .with_path(path));
            }
        }
    }
    Ok(())
}

/// Turn the raw request string into a normalized absolute path.
///
/// Relative inputs resolve against the sole allowed root; with several roots
/// configured a relative path is ambiguous and rejected.
fn absolutize(roots: &RootSet, input: &str) -> ServiceResult<PathBuf> {
    if input.trim().is_empty() {
        return Err(ServiceError::invalid_input("Path must not be empty"));
    }
    if is_drive_relative(input) {
        return Err(ServiceError::invalid_input(format!(
            "Drive-relative path is not allowed: '{input}'"
        )));
    }

    let raw = Path::new(input);
    let absolute = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        match roots.sole_root() {
            Some(root) => root.real.join(raw),
            None => {
                return Err(ServiceError::invalid_input(format!(
                    "Relative path '{input}' is ambiguous with {} allowed roots; pass an absolute path",
                    roots.len()
                )));
            }
        }
    };

    let normalized = normalize_path(&absolute);
    reject_reserved_segments(&normalized)?;
    Ok(normalized)
}

/// Follow a symlink chain by hand, one hop at a time, with a depth cap.
async fn resolve_symlink_chain(start: &Path, signal: &OperationSignal) -> ServiceResult<PathBuf> {
    let mut current = start.to_path_buf();
    for _ in 0..symlink::MAX_RESOLVE_DEPTH {
        signal.ensure_live()?;
        let metadata = tokio::fs::symlink_metadata(&current)
            .await
            .map_err(|e| ServiceError::from_io(e, &current))?;
        if !metadata.file_type().is_symlink() {
            return Ok(current);
        }
        let target = tokio::fs::read_link(&current)
            .await
            .map_err(|e| ServiceError::from_io(e, &current))?;
        current = if target.is_absolute() {
            normalize_path(&target)
        } else {
            let base = current.parent().unwrap_or_else(|| Path::new("/"));
            normalize_path(&base.join(target))
        };
    }
    Err(ServiceError::invalid_input(format!(
        "Too many levels of symbolic links: '{}'",
        start.display()
    ))
    .with_path(start))
}

/// Validate a path that must already exist.
///
/// Returns both the canonical requested path and the post-symlink resolution;
/// each must independently lie inside an allowed root.
pub async fn validate_existing_path(
    roots: &RootSet,
    input: &str,
    signal: &OperationSignal,
) -> ServiceResult<ResolvedPath> {
    let requested = absolutize(roots, input)?;
    if !roots.contains(&requested) {
        return Err(ServiceError::access_denied(&requested));
    }

    signal.ensure_live()?;
    let metadata = tokio::fs::symlink_metadata(&requested)
        .await
        .map_err(|e| ServiceError::from_io(e, &requested))?;

    let target = if metadata.file_type().is_symlink() {
        resolve_symlink_chain(&requested, signal).await?
    } else {
        requested.clone()
    };

    // Canonicalize to collapse symlinked ancestors as well.
    signal.ensure_live()?;
    let resolved = tokio::fs::canonicalize(&target)
        .await
        .map_err(|e| ServiceError::from_io(e, &target))?;

    if !roots.contains(&resolved) {
        return Err(ServiceError::access_denied(&requested));
    }

    Ok(ResolvedPath {
        requested,
        resolved,
    })
}

/// Validate a path that is about to be created or replaced.
///
/// Walks up to the nearest existing ancestor, canonicalizes it, and re-applies
/// the remaining segments before the containment check. A symlink planted at
/// any ancestor therefore cannot redirect the write outside the sandbox.
pub async fn validate_path_for_write(
    roots: &RootSet,
    input: &str,
    signal: &OperationSignal,
) -> ServiceResult<PathBuf> {
    let requested = absolutize(roots, input)?;
    if !roots.contains(&requested) {
        return Err(ServiceError::access_denied(&requested));
    }

    signal.ensure_live()?;

    // If the target itself exists as a symlink, resolve it; replacing a link
    // that points outside the sandbox is refused outright.
    if let Ok(metadata) = tokio::fs::symlink_metadata(&requested).await
        && metadata.file_type().is_symlink()
    {
        let resolved = resolve_symlink_chain(&requested, signal).await;
        match resolved {
            Ok(resolved) if roots.contains(&resolved) => {}
            // Broken link inside the sandbox is fine to replace.
            Err(err) if err.code == crate::error::ErrorCode::NotFound => {}
            _ => return Err(ServiceError::access_denied(&requested)),
        }
    }

    let canonical = canonicalize_allow_missing(&requested, signal).await?;
    if !roots.contains(&canonical) {
        return Err(ServiceError::access_denied(&requested));
    }

    Ok(canonical)
}

/// Canonicalize a path whose tail may not exist yet: find the nearest
/// existing ancestor, canonicalize that, and append the remaining segments.
async fn canonicalize_allow_missing(
    normalized: &Path,
    signal: &OperationSignal,
) -> ServiceResult<PathBuf> {
    if matches!(tokio::fs::try_exists(normalized).await, Ok(true)) {
        return tokio::fs::canonicalize(normalized)
            .await
            .map_err(|e| ServiceError::from_io(e, normalized));
    }

    let mut current = normalized.to_path_buf();
    while let Some(parent) = current.parent() {
        signal.ensure_live()?;
        if matches!(tokio::fs::try_exists(parent).await, Ok(true)) {
            let canonical_parent = tokio::fs::canonicalize(parent)
                .await
                .map_err(|e| ServiceError::from_io(e, parent))?;
            let remainder = normalized.strip_prefix(parent).unwrap_or_else(|_| Path::new(""));
            return if remainder.as_os_str().is_empty() {
                Ok(canonical_parent)
            } else {
                Ok(canonical_parent.join(remainder))
            };
        }
        current = parent.to_path_buf();
    }

    Ok(normalized.to_path_buf())
}

/// Root-relative display form with forward slashes, used in results.
pub fn relative_display(roots: &RootSet, path: &Path) -> String {
    for entry in roots.entries() {
        for base in [&entry.real, &entry.path] {
            if let Ok(relative) = path.strip_prefix(base) {
                if relative.as_os_str().is_empty() {
                    return ".".to_string();
                }
                return to_posix(relative);
            }
        }
    }
    path.display().to_string()
}

/// POSIX-separator rendering of a relative path, used by glob matching.
pub fn to_posix(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}
