//! Bounded-concurrency batch orchestration.
//!
//! [`run_pool`] is the scheduling core: a fixed set of workers share an
//! atomic cursor and each claims the next unprocessed index until the list is
//! exhausted. Compared to chunked fan-out, a shared cursor keeps every worker
//! busy even when item durations vary wildly (a cache-warm model call versus
//! a cold load), and it guarantees at most `concurrency` items are in flight
//! at any instant.
//!
//! [`run_batch`] layers the analysis pipeline on top: shared client and
//! session snapshot, per-item outcome counting, progress callbacks, and the
//! aggregate [`BatchResult`].

use crate::analyze::process_item;
use crate::config::AnalysisConfig;
use crate::error::ScribeError;
use crate::pipeline::client::InferenceClient;
use crate::record::{AnalysisRequest, BatchResult, ItemFailure};
use crate::session::SessionContext;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Run `f(index)` for every `index in 0..total` with at most `concurrency`
/// invocations in flight, returning every outcome tagged with its index.
///
/// Workers claim indexes from a shared cursor, so ordering of the returned
/// vector follows completion, not submission. Exactly `total` outcomes are
/// returned; cancellation is the item function's concern, not the pool's,
/// which keeps the accounting exhaustive.
pub async fn run_pool<F, Fut, R>(total: usize, concurrency: usize, f: F) -> Vec<(usize, R)>
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    if total == 0 {
        return Vec::new();
    }
    let workers = concurrency.clamp(1, total);
    let f = Arc::new(f);
    let cursor = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let f = Arc::clone(&f);
        let cursor = Arc::clone(&cursor);
        handles.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                if index >= total {
                    break;
                }
                outcomes.push((index, f(index).await));
            }
            outcomes
        }));
    }

    let mut all = Vec::with_capacity(total);
    for joined in futures::future::join_all(handles).await {
        match joined {
            Ok(outcomes) => all.extend(outcomes),
            // A panicking worker loses its claimed items but the cursor has
            // already moved on; surfacing the panic beats silent undercount.
            Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
        }
    }
    all
}

/// Analyze every request with bounded concurrency and report the aggregate.
///
/// The HTTP client and the session snapshot are built once and shared across
/// workers, so every item in the batch sees identical capture-time facts.
pub async fn run_batch(
    requests: Vec<AnalysisRequest>,
    config: &AnalysisConfig,
) -> Result<BatchResult, ScribeError> {
    let total = requests.len();
    if total == 0 {
        return Ok(BatchResult::default());
    }

    let client = InferenceClient::new(config)?;
    let session = Arc::new(SessionContext::from_env());
    let requests = Arc::new(requests);
    let config = Arc::new(config.clone());

    info!(
        items = total,
        concurrency = config.concurrency.min(total),
        model = %config.model,
        "starting batch"
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_batch_start(total);
    }

    let success = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(Mutex::new(Vec::<ItemFailure>::new()));

    let outcomes = {
        let requests = Arc::clone(&requests);
        let config = Arc::clone(&config);
        let session = Arc::clone(&session);
        let success = Arc::clone(&success);
        let failures = Arc::clone(&failures);

        run_pool(total, config.concurrency, move |index| {
            let request = requests[index].clone();
            let client = client.clone();
            let config = Arc::clone(&config);
            let session = Arc::clone(&session);
            let success = Arc::clone(&success);
            let failures = Arc::clone(&failures);

            async move {
                if let Some(cb) = &config.progress_callback {
                    cb.on_item_start(index, total, &request.image_path);
                }
                let path = request.image_path.clone();
                match process_item(&client, &session, request, &config).await {
                    Ok(_) => {
                        success.fetch_add(1, Ordering::SeqCst);
                        if let Some(cb) = &config.progress_callback {
                            cb.on_item_complete(index, total, &path);
                        }
                        true
                    }
                    Err(error) => {
                        warn!(path = %path.display(), %error, "item failed");
                        if let Some(cb) = &config.progress_callback {
                            cb.on_item_error(index, total, &path, &error.to_string());
                        }
                        failures
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(ItemFailure { path, error });
                        false
                    }
                }
            }
        })
        .await
    };
    debug_assert_eq!(outcomes.len(), total);

    let success = success.load(Ordering::SeqCst);
    let errors = std::mem::take(
        &mut *failures.lock().unwrap_or_else(|e| e.into_inner()),
    );
    let result = BatchResult {
        success,
        failed: errors.len(),
        errors,
    };

    info!(
        success = result.success,
        failed = result.failed,
        "batch finished"
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_batch_complete(total, result.success);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicIsize;
    use std::time::Duration;

    #[tokio::test]
    async fn pool_produces_every_outcome_exactly_once() {
        let outcomes = run_pool(10, 3, |i| async move { i * 2 }).await;
        assert_eq!(outcomes.len(), 10);
        let mut indexes: Vec<usize> = outcomes.iter().map(|(i, _)| *i).collect();
        indexes.sort_unstable();
        assert_eq!(indexes, (0..10).collect::<Vec<_>>());
        for (i, v) in outcomes {
            assert_eq!(v, i * 2);
        }
    }

    #[tokio::test]
    async fn pool_never_exceeds_concurrency() {
        let in_flight = Arc::new(AtomicIsize::new(0));
        let high_water = Arc::new(AtomicIsize::new(0));

        let outcomes = {
            let in_flight = Arc::clone(&in_flight);
            let high_water = Arc::clone(&high_water);
            run_pool(10, 3, move |_| {
                let in_flight = Arc::clone(&in_flight);
                let high_water = Arc::clone(&high_water);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    high_water.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await
        };

        assert_eq!(outcomes.len(), 10);
        let peak = high_water.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 2, "workers never overlapped");
    }

    #[tokio::test]
    async fn pool_clamps_concurrency_to_item_count() {
        // more workers than items is fine; all items still run once
        let outcomes = run_pool(2, 64, |i| async move { i }).await;
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn empty_pool_is_a_noop() {
        let outcomes: Vec<(usize, ())> = run_pool(0, 4, |_| async {}).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_reports_zero() {
        let result = run_batch(Vec::new(), &AnalysisConfig::default())
            .await
            .unwrap();
        assert_eq!(result.total(), 0);
        assert!(result.errors.is_empty());
    }
}
