//! Long-lived scan workers: pre-warmed OS threads consuming scan requests
//! from per-worker queues.
//!
//! Matchers cross the thread boundary by reconstruction: the request carries
//! pattern + options, and each worker compiles lazily into its own LRU cache.
//! Cancellation is O(1) per request through a shared token registry, so an
//! in-flight scan stops at its next line boundary.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cancel::OperationSignal;
use crate::config::constants::concurrency;
use crate::error::ServiceError;

use super::matcher::{Matcher, MatcherOptions};
use super::scan::{ScanOptions, ScanResult, scan_file};

/// A unit of work handed to a worker.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub id: u64,
    pub resolved_path: PathBuf,
    /// Root-relative spelling recorded on matches.
    pub requested_path: String,
    pub pattern: String,
    pub matcher_options: MatcherOptions,
    pub scan_options: ScanOptions,
}

/// Scan outcome delivered back to the facade. A cancelled scan is not an
/// error; the facade treats it as an empty result.
#[derive(Debug)]
pub enum ScanOutcome {
    Completed(ScanResult),
    Cancelled,
    Failed(ServiceError),
}

enum WorkerMessage {
    Scan {
        request: ScanRequest,
        reply: oneshot::Sender<ScanOutcome>,
    },
    Shutdown,
}

type MatcherKey = (String, MatcherOptions);
type CancelRegistry = Arc<Mutex<HashMap<u64, CancellationToken>>>;

struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    thread: Option<std::thread::JoinHandle<()>>,
}

/// Fixed pool of scan workers, created on first use and kept warm.
pub struct SearchPool {
    workers: Vec<WorkerHandle>,
    next_worker: AtomicUsize,
    next_id: AtomicU64,
    cancellations: CancelRegistry,
}

impl SearchPool {
    /// Spawn `size` workers. `size` must be non-zero; a zero configuration
    /// disables the pool at the facade level instead.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let cancellations: CancelRegistry = Arc::new(Mutex::new(HashMap::new()));
        let workers = (0..size)
            .map(|index| {
                let (sender, receiver) = mpsc::unbounded_channel();
                let registry = Arc::clone(&cancellations);
                let thread = std::thread::Builder::new()
                    .name(format!("scan-worker-{index}"))
                    .spawn(move || worker_loop(index, receiver, registry))
                    .expect("failed to spawn scan worker");
                WorkerHandle {
                    sender,
                    thread: Some(thread),
                }
            })
            .collect();
        debug!(size, "search worker pool started");
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            cancellations,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Allocate a request id for submission and later cancellation.
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue a scan on the next worker round-robin. The returned receiver
    /// resolves when the scan completes, fails, or is cancelled.
    pub fn submit(&self, request: ScanRequest) -> oneshot::Receiver<ScanOutcome> {
        let (reply, receiver) = oneshot::channel();
        let token = CancellationToken::new();
        self.cancellations.lock().insert(request.id, token);

        let slot = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        if self.workers[slot]
            .sender
            .send(WorkerMessage::Scan { request, reply })
            .is_err()
        {
            warn!(worker = slot, "scan worker queue closed; dropping request");
        }
        receiver
    }

    /// Cancel a queued or in-flight scan by id. O(1); idempotent.
    pub fn cancel(&self, id: u64) {
        if let Some(token) = self.cancellations.lock().get(&id) {
            token.cancel();
        }
    }

    /// Drain all workers: outstanding scans resolve as cancellations, then
    /// each worker's queue closes and its thread joins.
    pub fn shutdown(&mut self) {
        for token in self.cancellations.lock().values() {
            token.cancel();
        }
        for worker in &self.workers {
            let _ = worker.sender.send(WorkerMessage::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
            }
        }
        debug!("search worker pool shut down");
    }
}

impl Drop for SearchPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The process-wide pool, sized by `SEARCH_WORKERS`. `None` disables workers
/// and searches run sequentially on the facade.
pub fn global_pool() -> Option<&'static SearchPool> {
    use once_cell::sync::Lazy;
    static POOL: Lazy<Option<SearchPool>> = Lazy::new(|| {
        let size = crate::config::limits().search_workers;
        if size == 0 {
            return None;
        }
        Some(SearchPool::new(size))
    });
    POOL.as_ref()
}

fn worker_loop(
    index: usize,
    mut receiver: mpsc::UnboundedReceiver<WorkerMessage>,
    registry: CancelRegistry,
) {
    let capacity =
        NonZeroUsize::new(concurrency::MATCHER_CACHE_CAPACITY).expect("non-zero cache capacity");
    let mut matchers: LruCache<MatcherKey, Arc<Matcher>> = LruCache::new(capacity);

    while let Some(message) = receiver.blocking_recv() {
        match message {
            WorkerMessage::Scan { request, reply } => {
                let token = registry
                    .lock()
                    .get(&request.id)
                    .cloned()
                    .unwrap_or_default();
                let outcome = run_scan(&request, &token, &mut matchers);
                registry.lock().remove(&request.id);
                let _ = reply.send(outcome);
            }
            WorkerMessage::Shutdown => {
                debug!(worker = index, "scan worker draining");
                // Remaining queued scans resolve as cancellations.
                while let Ok(message) = receiver.try_recv() {
                    if let WorkerMessage::Scan { request, reply } = message {
                        registry.lock().remove(&request.id);
                        let _ = reply.send(ScanOutcome::Cancelled);
                    }
                }
                break;
            }
        }
    }
}

fn run_scan(
    request: &ScanRequest,
    token: &CancellationToken,
    matchers: &mut LruCache<MatcherKey, Arc<Matcher>>,
) -> ScanOutcome {
    if token.is_cancelled() {
        return ScanOutcome::Cancelled;
    }

    let key = (request.pattern.clone(), request.matcher_options);
    let matcher = match matchers.get(&key) {
        Some(matcher) => Arc::clone(matcher),
        None => match Matcher::build(&request.pattern, request.matcher_options) {
            Ok(built) => {
                let matcher = Arc::new(built);
                matchers.put(key, Arc::clone(&matcher));
                matcher
            }
            Err(error) => return ScanOutcome::Failed(error),
        },
    };

    let signal = OperationSignal::from_token(token.clone());
    match scan_file(
        &request.resolved_path,
        &request.requested_path,
        &matcher,
        &request.scan_options,
        &signal,
    ) {
        Ok(result) => ScanOutcome::Completed(result),
        Err(_) if token.is_cancelled() => ScanOutcome::Cancelled,
        Err(error) => ScanOutcome::Failed(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_options() -> ScanOptions {
        ScanOptions {
            context_lines: 0,
            max_matches: 100,
            max_file_size: u64::MAX,
            skip_binary: true,
        }
    }

    fn request(pool: &SearchPool, path: PathBuf, pattern: &str) -> ScanRequest {
        ScanRequest {
            id: pool.next_request_id(),
            resolved_path: path,
            requested_path: "file.txt".to_string(),
            pattern: pattern.to_string(),
            matcher_options: MatcherOptions::default(),
            scan_options: scan_options(),
        }
    }

    #[tokio::test]
    async fn pool_scans_and_returns_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "alpha\nbeta\nalpha beta\n").unwrap();

        let pool = SearchPool::new(2);
        let outcome = pool
            .submit(request(&pool, path, "alpha"))
            .await
            .expect("worker replied");
        match outcome {
            ScanOutcome::Completed(result) => {
                assert_eq!(result.matches.len(), 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_request_resolves_as_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "data\n".repeat(1000)).unwrap();

        let pool = SearchPool::new(1);
        let req = request(&pool, path, "data");
        let id = req.id;
        pool.cancel(id); // cancel can land before the worker picks it up
        let receiver = pool.submit(req);
        pool.cancel(id);
        let outcome = receiver.await.expect("worker replied");
        // Either the cancel landed first (Cancelled) or the scan won the race.
        match outcome {
            ScanOutcome::Cancelled | ScanOutcome::Completed(_) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_and_direct_scan_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "one fish\ntwo fish\nred fish\nblue fish\n").unwrap();

        let matcher = Matcher::build("fish", MatcherOptions::default()).unwrap();
        let signal = OperationSignal::never();
        let direct = scan_file(&path, "file.txt", &matcher, &scan_options(), &signal).unwrap();

        let pool = SearchPool::new(3);
        let outcome = pool
            .submit(request(&pool, path, "fish"))
            .await
            .expect("worker replied");
        let pooled = match outcome {
            ScanOutcome::Completed(result) => result,
            other => panic!("unexpected outcome: {other:?}"),
        };

        assert_eq!(direct.matches.len(), pooled.matches.len());
        for (a, b) in direct.matches.iter().zip(pooled.matches.iter()) {
            assert_eq!(a.line, b.line);
            assert_eq!(a.content, b.content);
            assert_eq!(a.match_count, b.match_count);
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queued_scans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "x\n").unwrap();

        let mut pool = SearchPool::new(1);
        let receiver = pool.submit(request(&pool, path, "x"));
        pool.shutdown();
        // The scan either completed before the shutdown or was drained.
        match receiver.await {
            Ok(ScanOutcome::Completed(_)) | Ok(ScanOutcome::Cancelled) => {}
            Ok(other) => panic!("unexpected outcome: {other:?}"),
            Err(_) => {} // reply dropped during drain is acceptable
        }
    }
}
