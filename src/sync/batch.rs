//! Batch-synchronous fan-out.
//!
//! AO3 throttles clients that keep a steady stream of requests open, so work
//! is admitted in fixed-size groups: every unit of a group starts at once and
//! the next group is only admitted after the whole group has finished.

use std::future::Future;
use std::ops::Range;
use std::time::Duration;

use futures_util::future::join_all;
use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;

use super::error::SyncError;

pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub batch_size: usize,
    /// Upper bound on a single unit, retries and back-off included.
    pub unit_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            unit_timeout: Duration::from_secs(300),
        }
    }
}

/// Consecutive index ranges covering `0..len`, each at most `batch_size`
/// long. A `batch_size` of 0 is treated as 1.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let size = batch_size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Apply `operation` to every item, one batch at a time.
///
/// Returns exactly one result per item, in input order. A failed or timed-out
/// unit only affects its own slot. Once `shutdown_token` is cancelled no
/// further batch is admitted and the remaining items yield
/// [`SyncError::Interrupted`]; a batch already admitted runs to completion.
pub async fn run_batches<'a, T, O, F, Fut>(
    items: &'a [T],
    options: &BatchOptions,
    shutdown_token: &CancellationToken,
    progress: &ProgressBar,
    operation: F,
) -> Vec<Result<O, SyncError>>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<O, SyncError>>,
{
    let batches = partition(items.len(), options.batch_size);
    let batch_count = batches.len();
    let mut results = Vec::with_capacity(items.len());

    for (index, range) in batches.into_iter().enumerate() {
        if shutdown_token.is_cancelled() {
            let skipped = items.len() - range.start;
            progress.suspend(|| {
                tracing::info!("Shutdown requested, skipping {} remaining items", skipped);
            });
            results.extend((0..skipped).map(|_| Err(SyncError::Interrupted)));
            progress.inc(skipped as u64);
            break;
        }

        tracing::debug!(
            batch = index + 1,
            of = batch_count,
            size = range.len(),
            "Admitting batch"
        );
        let units = items[range].iter().map(|item| {
            let unit = with_timeout(operation(item), options.unit_timeout);
            async move {
                let result = unit.await;
                progress.inc(1);
                result
            }
        });
        results.extend(join_all(units).await);
    }

    results
}

async fn with_timeout<O>(
    unit: impl Future<Output = Result<O, SyncError>>,
    limit: Duration,
) -> Result<O, SyncError> {
    tokio::time::timeout(limit, unit)
        .await
        .unwrap_or(Err(SyncError::TimedOut(limit)))
}
