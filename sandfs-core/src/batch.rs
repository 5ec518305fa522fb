//! Bounded-parallelism scheduler for per-path batch operations.
//!
//! Used by multi-file read, stat, and checksum: every input yields exactly
//! one slot in the output, in input order, so callers can zip results back to
//! their requests.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cancel::OperationSignal;
use crate::error::{ServiceError, ServiceResult};

/// Apply `work` to every input with at most `concurrency` in flight.
///
/// Output order matches input order. Once the signal fires, inputs that have
/// not started resolve to the abort reason instead of running.
pub async fn parallel_map<I, T, F, Fut>(
    inputs: Vec<I>,
    concurrency: usize,
    signal: &OperationSignal,
    work: F,
) -> Vec<ServiceResult<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(usize, I) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = ServiceResult<T>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let signal = signal.clone();
        let work = work.clone();
        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return Err(ServiceError::unknown("Scheduler closed")),
            };
            signal.ensure_live()?;
            signal.race(work(index, input)).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(error) => Err(ServiceError::unknown(format!("Batch task failed: {error}"))),
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order() {
        let signal = OperationSignal::never();
        let results = parallel_map(vec![3u64, 1, 2], 8, &signal, |_, n| async move {
            tokio::time::sleep(Duration::from_millis(n * 5)).await;
            Ok(n * 10)
        })
        .await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn bounds_in_flight_work() {
        static ACTIVE: AtomicUsize = AtomicUsize::new(0);
        static PEAK: AtomicUsize = AtomicUsize::new(0);

        let signal = OperationSignal::never();
        let results = parallel_map(vec![(); 16], 2, &signal, |_, ()| async {
            let now = ACTIVE.fetch_add(1, Ordering::SeqCst) + 1;
            PEAK.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            ACTIVE.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
        assert_eq!(results.len(), 16);
        assert!(PEAK.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn per_input_errors_do_not_poison_the_batch() {
        let signal = OperationSignal::never();
        let results = parallel_map(vec![1u32, 2, 3], 4, &signal, |_, n| async move {
            if n == 2 {
                Err(ServiceError::invalid_input("two is right out"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn abort_resolves_unstarted_inputs_with_reason() {
        let signal = OperationSignal::never();
        signal.fire(crate::cancel::CancelCause::Caller);
        let results = parallel_map(vec![(), ()], 1, &signal, |_, ()| async { Ok(()) }).await;
        for result in results {
            let err = result.unwrap_err();
            assert!(err.message.contains("aborted"));
        }
    }
}
