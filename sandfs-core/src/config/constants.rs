//! Centralized defaults and hard caps for the service.
//!
//! Callers may lower any of the request-level bounds; none may be raised past
//! the caps in this module.

/// Traversal defaults and caps.
pub mod traversal {
    /// Default and maximum recursion depth for tree/find operations.
    pub const MAX_DEPTH: usize = 10;
    /// Default and maximum number of results returned by a search.
    pub const MAX_RESULTS: usize = 100;
    /// Default and maximum number of directory entries examined per call.
    pub const MAX_FILES_SCANNED: usize = 20_000;
    /// Default and maximum number of entries returned by a directory listing.
    pub const MAX_ENTRIES: usize = 10_000;
}

/// Content search defaults and caps.
pub mod search {
    /// Per-file size cap for content search, overridable via `MAX_SEARCH_SIZE`.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;
    pub const MIN_MAX_FILE_SIZE: u64 = 100 * 1024;
    pub const MAX_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

    /// Default number of context lines captured around a match.
    pub const DEFAULT_CONTEXT_LINES: usize = 2;
    /// Maximum number of context lines a caller may request.
    pub const MAX_CONTEXT_LINES: usize = 10;

    /// Stored line content is clamped to this many bytes.
    pub const MAX_LINE_CONTENT_BYTES: usize = 200;

    /// Bytes sniffed from the head of a file for binary classification.
    pub const BINARY_SNIFF_BYTES: usize = 512;
    /// Invalid UTF-8 density above which a sniffed prefix is treated as binary.
    pub const BINARY_INVALID_DENSITY: f64 = 0.30;

    /// Lines longer than this are skipped rather than fed to the matcher.
    pub const MAX_SCAN_LINE_BYTES: usize = 64 * 1024;

    /// Repetition bound at or above which a regex is rejected as unsafe.
    pub const MAX_REGEX_REPETITION: u32 = 25;
    /// Compiled-regex size budget handed to the engine.
    pub const REGEX_SIZE_LIMIT: usize = 1 << 20;
}

/// Single- and multi-file read defaults and caps.
pub mod read {
    /// Per-file size cap for reads, overridable via `MAX_FILE_SIZE`.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
    pub const MIN_MAX_FILE_SIZE: u64 = 1024 * 1024;
    pub const MAX_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

    /// Forward readers pull the file in chunks of this size.
    pub const HEAD_CHUNK_BYTES: usize = 64 * 1024;
    /// Backward (tail) readers pull the file in chunks of this size.
    pub const TAIL_CHUNK_BYTES: usize = 256 * 1024;

    /// Default aggregate budget for multi-file reads.
    pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 50 * 1024 * 1024;
}

/// Timeouts.
pub mod timeout {
    use std::time::Duration;

    /// Default operation deadline, overridable via `DEFAULT_SEARCH_TIMEOUT`.
    pub const DEFAULT: Duration = Duration::from_secs(30);
    pub const MIN: Duration = Duration::from_millis(100);
    pub const MAX: Duration = Duration::from_secs(3600);
}

/// Symlink handling.
pub mod symlink {
    /// Maximum chain length followed while resolving a symlink by hand.
    pub const MAX_RESOLVE_DEPTH: usize = 40;
}

/// Worker pool and batch concurrency.
pub mod concurrency {
    /// Matcher cache entries retained per search worker.
    pub const MATCHER_CACHE_CAPACITY: usize = 100;

    /// Shared sizing rule for the worker pool and batch scheduler.
    pub fn default_parallelism() -> usize {
        num_cpus::get().max(4).min(32)
    }
}

/// Directory names excluded from traversal unless the caller opts out.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    ".cache",
];
