use thiserror::Error;

/// Errors produced while parsing or applying unified diffs.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("cannot parse empty patch input")]
    EmptyInput,

    #[error("patch does not contain any hunks")]
    NoHunks,

    #[error("invalid patch format on line {line}: {message}")]
    InvalidFormat { line: usize, message: String },

    #[error(
        "hunk #{hunk} does not apply: expected near line {expected}:\n{snippet}\n\nThe context lines must match the file content. Re-read the file and regenerate the diff."
    )]
    HunkMismatch {
        hunk: usize,
        expected: usize,
        snippet: String,
    },

    #[error("hunk #{hunk} targets line {line}, beyond the {total}-line file")]
    OutOfBounds { hunk: usize, line: usize, total: usize },
}

impl From<PatchError> for crate::error::ServiceError {
    fn from(error: PatchError) -> Self {
        crate::error::ServiceError::invalid_input(error.to_string())
    }
}
