//! Content search: matcher compilation, per-file scanning, and the worker
//! pool that parallelizes scans across threads.

mod matcher;
mod pool;
mod scan;

pub use matcher::{Matcher, MatcherOptions, check_pattern_safety};
pub use pool::{ScanOutcome, ScanRequest, SearchPool, global_pool};
pub use scan::{ScanMatch, ScanOptions, ScanResult, SkipKind, scan_file};
