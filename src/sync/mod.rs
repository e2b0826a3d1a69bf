//! Incremental sync engine: list subscriptions, refresh each work's metadata,
//! classify the local archive against it, and re-download only what is
//! missing, stale or corrupt.
//!
//! Remote calls go through [`batch::run_batches`] so AO3 only ever sees one
//! bounded burst of requests at a time.

pub mod batch;
pub mod error;
pub mod paths;
pub mod report;
pub mod staleness;

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::remote::{ArchiveFormat, RemoteEntity, RemoteItem, RemoteSource, WorkId};
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};

pub use batch::BatchOptions;
pub use error::SyncError;
pub use report::{Disposition, ItemReport, Stage, SyncReport};
use staleness::Classification;

/// Subset of application config consumed by the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub output_directory: PathBuf,
    pub batch: BatchOptions,
    pub retry: RetryConfig,
    pub no_progress_bar: bool,
}

/// A work that CLASSIFY decided to fetch.
struct DownloadTask {
    report: usize,
    item: RemoteItem,
    path: PathBuf,
    classification: Classification,
}

/// Run one full sync pass against `remote`.
///
/// Only a failure to list subscriptions is returned as an error. Everything
/// that goes wrong for an individual work ends up in that work's
/// [`Disposition`].
pub async fn run_sync<S>(
    remote: &S,
    config: &SyncConfig,
    shutdown_token: &CancellationToken,
) -> Result<SyncReport>
where
    S: RemoteSource + ?Sized,
{
    let started = Instant::now();

    // LIST
    let entities = remote
        .list_subscriptions()
        .await
        .context("Failed to list subscriptions")?;
    let (works, others): (Vec<RemoteEntity>, Vec<RemoteEntity>) = entities
        .into_iter()
        .partition(|e| matches!(e, RemoteEntity::Work(_)));
    for entity in &others {
        tracing::debug!("Skipping {}", entity.describe());
    }
    let works: Vec<RemoteItem> = works
        .into_iter()
        .filter_map(RemoteEntity::into_work)
        .collect();
    tracing::info!(
        works = works.len(),
        skipped = others.len(),
        "Found {} subscribed works",
        works.len()
    );

    // REFRESH
    let pb = create_progress_bar(config.no_progress_bar, works.len() as u64, "refreshing");
    let refreshed = batch::run_batches(&works, &config.batch, shutdown_token, &pb, |item| {
        refresh(remote, item, &config.retry, &pb)
    })
    .await;
    pb.finish_and_clear();

    let mut reports = Vec::with_capacity(works.len());
    let mut candidates = Vec::new();
    for (listed, result) in works.iter().zip(refreshed) {
        match result {
            Ok(item) => {
                candidates.push((reports.len(), item.clone()));
                reports.push(ItemReport {
                    id: item.id,
                    title: item.title,
                    path: None,
                    disposition: Disposition::UpToDate,
                });
            }
            Err(e) => {
                tracing::error!("Could not refresh work {} ({}): {}", listed.id, listed.title, e);
                reports.push(ItemReport {
                    id: listed.id,
                    title: listed.title.clone(),
                    path: None,
                    disposition: Disposition::failed(Stage::Refresh, e),
                });
            }
        }
    }

    // CLASSIFY
    let mut claimed: HashMap<PathBuf, WorkId> = HashMap::new();
    let mut worklist = Vec::new();
    for (index, item) in candidates {
        let path = paths::resolve(&config.output_directory, &item);
        reports[index].path = Some(path.clone());

        if shutdown_token.is_cancelled() {
            reports[index].disposition = Disposition::failed(Stage::Classify, SyncError::Interrupted);
            continue;
        }
        if let Some(owner) = claimed.get(&path) {
            let err = SyncError::PathCollision {
                path,
                owner: *owner,
            };
            tracing::error!("Work {} ({}): {}", item.id, item.title, err);
            reports[index].disposition = Disposition::failed(Stage::Classify, err);
            continue;
        }
        claimed.insert(path.clone(), item.id);

        match staleness::classify(&item, &path) {
            Ok(classification) if classification.needs_download() => {
                worklist.push(DownloadTask {
                    report: index,
                    item,
                    path,
                    classification,
                })
            }
            Ok(_) => reports[index].disposition = Disposition::UpToDate,
            Err(e) => {
                tracing::error!("Could not check {}: {}", path.display(), e);
                reports[index].disposition =
                    Disposition::failed(Stage::Classify, SyncError::Disk(e));
            }
        }
    }

    // DOWNLOAD
    if !shutdown_token.is_cancelled() {
        match archive::remove_stale_parts(&config.output_directory) {
            Ok(0) => {}
            Ok(n) => tracing::info!("Removed {} unfinished downloads from an earlier run", n),
            Err(e) => tracing::warn!("Could not clear unfinished downloads: {}", e),
        }
    }
    if worklist.is_empty() {
        tracing::info!("No works need downloading");
    } else {
        tracing::info!("Downloading {} works", worklist.len());
        let pb = create_progress_bar(config.no_progress_bar, worklist.len() as u64, "downloading");
        let downloaded = batch::run_batches(&worklist, &config.batch, shutdown_token, &pb, |task| {
            download(remote, task, &config.retry, &pb)
        })
        .await;
        pb.finish_and_clear();

        for (task, result) in worklist.iter().zip(downloaded) {
            reports[task.report].disposition = match result {
                Ok(()) => Disposition::downloaded(task.classification),
                Err(e) => {
                    tracing::error!("Download failed: {}: {}", task.path.display(), e);
                    Disposition::failed(Stage::Download, e)
                }
            };
        }
    }

    Ok(SyncReport {
        items: reports,
        skipped_entities: others.len(),
        elapsed: started.elapsed(),
    })
}

fn retry_action(e: &SyncError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

async fn refresh<S>(
    remote: &S,
    item: &RemoteItem,
    retry: &RetryConfig,
    pb: &ProgressBar,
) -> Result<RemoteItem, SyncError>
where
    S: RemoteSource + ?Sized,
{
    let label = format!("work {}", item.id);
    retry_with_backoff(retry, &label, pb, retry_action, || async move {
        Ok::<_, SyncError>(remote.refresh_metadata(item).await?)
    })
    .await
}

async fn download<S>(
    remote: &S,
    task: &DownloadTask,
    retry: &RetryConfig,
    pb: &ProgressBar,
) -> Result<(), SyncError>
where
    S: RemoteSource + ?Sized,
{
    if let Some(parent) = task.path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let label = format!("work {}", task.item.id);
    let written = retry_with_backoff(retry, &label, pb, retry_action, || async move {
        let bytes = remote.fetch_content(&task.item, ArchiveFormat::Epub).await?;
        Ok::<_, SyncError>(archive::write_archive(&task.path, &bytes).await?)
    })
    .await?;

    tracing::debug!(
        words = task.item.word_count,
        "Downloaded {}",
        written.path().display()
    );
    Ok(())
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64, phase: &'static str) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb.set_message(phase);
    pb
}
