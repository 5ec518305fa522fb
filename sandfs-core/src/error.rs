//! Stable error codes and the structured error envelope returned to callers.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable error codes surfaced across the RPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "E_ACCESS_DENIED")]
    AccessDenied,
    #[serde(rename = "E_NOT_FOUND")]
    NotFound,
    #[serde(rename = "E_NOT_FILE")]
    NotFile,
    #[serde(rename = "E_NOT_DIRECTORY")]
    NotDirectory,
    #[serde(rename = "E_TOO_LARGE")]
    TooLarge,
    #[serde(rename = "E_INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "E_UNKNOWN")]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "E_ACCESS_DENIED",
            Self::NotFound => "E_NOT_FOUND",
            Self::NotFile => "E_NOT_FILE",
            Self::NotDirectory => "E_NOT_DIRECTORY",
            Self::TooLarge => "E_TOO_LARGE",
            Self::InvalidInput => "E_INVALID_INPUT",
            Self::Unknown => "E_UNKNOWN",
        }
    }

    /// Fixed remediation hint surfaced with every error of this code.
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::AccessDenied => {
                "The path resolves outside the allowed roots. List the allowed roots and retry with a contained path."
            }
            Self::NotFound => {
                "The path does not exist. Check spelling and case, or list the parent directory first."
            }
            Self::NotFile => "The operation requires a regular file, but the path is not one.",
            Self::NotDirectory => "The operation requires a directory, but the path is not one.",
            Self::TooLarge => {
                "The content exceeds the configured size cap. Use a partial read (head, tail, or line range) instead."
            }
            Self::InvalidInput => "One of the supplied arguments is malformed. Check the request against the tool schema.",
            Self::Unknown => "An unexpected error occurred. Retry, and report the issue if it persists.",
        }
    }
}

/// Error type shared by every core operation.
///
/// Carries a stable [`ErrorCode`], a human-readable message, and the path the
/// failure concerns when one exists.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub path: Option<PathBuf>,
    #[source]
    source: Option<io::Error>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn access_denied(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(
            ErrorCode::AccessDenied,
            format!("Access denied: '{}' is outside the allowed roots", path.display()),
        )
        .with_path(path)
    }

    pub fn not_found(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(ErrorCode::NotFound, format!("Path not found: '{}'", path.display())).with_path(path)
    }

    pub fn not_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(ErrorCode::NotFile, format!("Not a regular file: '{}'", path.display())).with_path(path)
    }

    pub fn not_directory(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::new(
            ErrorCode::NotDirectory,
            format!("Not a directory: '{}'", path.display()),
        )
        .with_path(path)
    }

    pub fn too_large(path: impl AsRef<Path>, size: u64, cap: u64) -> Self {
        let path = path.as_ref();
        Self::new(
            ErrorCode::TooLarge,
            format!(
                "File too large: '{}' is {size} bytes, cap is {cap} bytes",
                path.display()
            ),
        )
        .with_path(path)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    /// Map a platform error onto the taxonomy, keeping the original as source.
    pub fn from_io(error: io::Error, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let code = match error.kind() {
            io::ErrorKind::NotFound => ErrorCode::NotFound,
            io::ErrorKind::PermissionDenied => ErrorCode::AccessDenied,
            io::ErrorKind::IsADirectory => ErrorCode::NotFile,
            io::ErrorKind::NotADirectory => ErrorCode::NotDirectory,
            _ => ErrorCode::Unknown,
        };
        let message = match code {
            ErrorCode::NotFound => format!("Path not found: '{}'", path.display()),
            ErrorCode::AccessDenied => format!("Permission denied: '{}'", path.display()),
            ErrorCode::NotFile => format!("Not a regular file: '{}'", path.display()),
            ErrorCode::NotDirectory => format!("Not a directory: '{}'", path.display()),
            _ => format!("I/O error on '{}': {error}", path.display()),
        };
        Self {
            code,
            message,
            path: Some(path.to_path_buf()),
            source: Some(error),
        }
    }

    /// Serializable envelope for the RPC layer.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            code: self.code,
            message: self.message.clone(),
            path: self.path.as_ref().map(|p| p.display().to_string()),
            suggestion: self.code.suggestion().to_string(),
        }
    }
}

/// The user-visible error payload: `{ code, message, path?, suggestion }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub suggestion: String,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_kinds_map_to_stable_codes() {
        let err = ServiceError::from_io(io::Error::from(io::ErrorKind::NotFound), "/tmp/missing");
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = ServiceError::from_io(
            io::Error::from(io::ErrorKind::PermissionDenied),
            "/tmp/forbidden",
        );
        assert_eq!(err.code, ErrorCode::AccessDenied);

        let err = ServiceError::from_io(io::Error::other("disk on fire"), "/tmp/x");
        assert_eq!(err.code, ErrorCode::Unknown);
    }

    #[test]
    fn envelope_carries_code_and_suggestion() {
        let err = ServiceError::access_denied("/outside");
        let envelope = err.to_envelope();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["code"], "E_ACCESS_DENIED");
        assert_eq!(json["path"], "/outside");
        assert!(json["suggestion"].as_str().unwrap().contains("allowed roots"));
    }
}
