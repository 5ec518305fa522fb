//! Environment-variable overrides with bounds enforcement.
//!
//! Out-of-range or unparseable values log a warning and fall back to the
//! default rather than failing startup.

use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::warn;

use super::constants::{read, search, timeout};

/// Effective process-wide limits, resolved once from the environment.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Per-file byte cap applied by the content search engine.
    pub max_search_size: u64,
    /// Per-file byte cap applied by read operations.
    pub max_file_size: u64,
    /// Default deadline applied when a request does not carry one.
    pub default_timeout: Duration,
    /// Search worker pool size; zero disables the pool.
    pub search_workers: usize,
    /// Concurrency bound for batch (per-path) operations.
    pub parallel_concurrency: usize,
}

static LIMITS: Lazy<Limits> = Lazy::new(Limits::from_env);

/// The process-wide limits snapshot.
pub fn limits() -> &'static Limits {
    &LIMITS
}

impl Limits {
    fn from_env() -> Self {
        let default_workers = super::constants::concurrency::default_parallelism();
        Self {
            max_search_size: bounded_u64(
                "MAX_SEARCH_SIZE",
                search::DEFAULT_MAX_FILE_SIZE,
                search::MIN_MAX_FILE_SIZE,
                search::MAX_MAX_FILE_SIZE,
            ),
            max_file_size: bounded_u64(
                "MAX_FILE_SIZE",
                read::DEFAULT_MAX_FILE_SIZE,
                read::MIN_MAX_FILE_SIZE,
                read::MAX_MAX_FILE_SIZE,
            ),
            default_timeout: bounded_millis("DEFAULT_SEARCH_TIMEOUT", timeout::DEFAULT, timeout::MIN, timeout::MAX),
            search_workers: workers_from_env("SEARCH_WORKERS", default_workers),
            parallel_concurrency: default_workers,
        }
    }
}

fn bounded_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    let Some(raw) = read_env(name) else {
        return default;
    };
    match raw.parse::<u64>() {
        Ok(value) if (min..=max).contains(&value) => value,
        Ok(value) => {
            warn!(
                var = name,
                value,
                min,
                max,
                "environment override out of bounds; using default"
            );
            default
        }
        Err(error) => {
            warn!(var = name, %error, "environment override unparseable; using default");
            default
        }
    }
}

fn bounded_millis(name: &str, default: Duration, min: Duration, max: Duration) -> Duration {
    let Some(raw) = read_env(name) else {
        return default;
    };
    match raw.parse::<u64>() {
        Ok(ms) => {
            let value = Duration::from_millis(ms);
            if (min..=max).contains(&value) {
                value
            } else {
                warn!(
                    var = name,
                    millis = ms,
                    "environment override out of bounds; using default"
                );
                default
            }
        }
        Err(error) => {
            warn!(var = name, %error, "environment override unparseable; using default");
            default
        }
    }
}

fn workers_from_env(name: &str, default: usize) -> usize {
    let Some(raw) = read_env(name) else {
        return default;
    };
    match raw.parse::<usize>() {
        Ok(value) => value,
        Err(error) => {
            warn!(var = name, %error, "environment override unparseable; using default");
            default
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
