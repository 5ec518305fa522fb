//! Composed cancellation: caller abort and deadline folded into one signal.
//!
//! An [`OperationSignal`] wraps a [`CancellationToken`] plus a first-wins
//! cancellation cause. Stream operations translate the cause into a
//! `stopped_reason` on partial results; single-file operations surface it as
//! an error.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};

const CAUSE_LIVE: u8 = 0;
const CAUSE_CALLER: u8 = 1;
const CAUSE_TIMEOUT: u8 = 2;

/// Why a signal fired. Transitions are one-way; the first cause observed wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    Caller,
    Timeout,
}

/// A cancellable handle threaded through every operation.
#[derive(Debug, Clone)]
pub struct OperationSignal {
    token: CancellationToken,
    cause: Arc<AtomicU8>,
}

impl OperationSignal {
    /// A signal that never fires. Useful for tests and internal callers.
    pub fn never() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: Arc::new(AtomicU8::new(CAUSE_LIVE)),
        }
    }

    /// Wrap an existing token. Fired tokens report a caller cancellation.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            cause: Arc::new(AtomicU8::new(CAUSE_LIVE)),
        }
    }

    /// Fire the signal with the given cause. Later calls are no-ops.
    pub fn fire(&self, cause: CancelCause) {
        let value = match cause {
            CancelCause::Caller => CAUSE_CALLER,
            CancelCause::Timeout => CAUSE_TIMEOUT,
        };
        let _ = self
            .cause
            .compare_exchange(CAUSE_LIVE, value, Ordering::AcqRel, Ordering::Acquire);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cause(&self) -> Option<CancelCause> {
        match self.cause.load(Ordering::Acquire) {
            CAUSE_CALLER => Some(CancelCause::Caller),
            CAUSE_TIMEOUT => Some(CancelCause::Timeout),
            _ => None,
        }
    }

    /// Error out if the signal already fired.
    pub fn ensure_live(&self) -> ServiceResult<()> {
        if !self.is_cancelled() {
            return Ok(());
        }
        Err(self.as_error())
    }

    /// The error a fired signal maps to for single-file operations.
    pub fn as_error(&self) -> ServiceError {
        match self.cause() {
            Some(CancelCause::Timeout) => ServiceError::unknown("Operation timed out"),
            _ => ServiceError::unknown("Operation aborted"),
        }
    }

    /// Race a future against the signal. On cancellation the future is
    /// dropped and the abort reason is returned without waiting for it.
    pub async fn race<F, T>(&self, fut: F) -> ServiceResult<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.as_error()),
            result = fut => result,
        }
    }

    /// Resolves when the signal fires.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Keeps the deadline watcher alive; dropping it detaches the deadline.
/// Dropping is idempotent cleanup and must happen on every facade exit path.
#[derive(Debug)]
pub struct SignalGuard {
    watcher: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.take() {
            handle.abort();
        }
    }
}

/// Compose an optional caller token and an optional deadline into one signal.
///
/// The signal fires when either input fires; the cause records which one won.
pub fn compose(base: Option<CancellationToken>, deadline: Option<Duration>) -> (OperationSignal, SignalGuard) {
    let signal = OperationSignal::never();

    let watcher = match (base, deadline) {
        (None, None) => None,
        (base, deadline) => {
            let observed = signal.clone();
            Some(tokio::spawn(async move {
                let caller = async {
                    match base {
                        Some(token) => token.cancelled().await,
                        None => std::future::pending().await,
                    }
                };
                let timer = async {
                    match deadline {
                        Some(duration) => tokio::time::sleep(duration).await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    _ = caller => observed.fire(CancelCause::Caller),
                    _ = timer => observed.fire(CancelCause::Timeout),
                }
            }))
        }
    };

    (signal, SignalGuard { watcher })
}
