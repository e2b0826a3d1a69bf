use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::WorkId;

use super::staleness::Classification;

/// Pipeline stage an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Refresh,
    Classify,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Refresh => "refresh",
            Stage::Classify => "classify",
            Stage::Download => "download",
        })
    }
}

/// Final outcome for one work in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    UpToDate,
    DownloadedMissing,
    DownloadedStale,
    DownloadedCorrupt,
    Failed { stage: Stage, reason: String },
}

impl Disposition {
    /// Outcome of a successful download of an item classified as `classification`.
    pub(crate) fn downloaded(classification: Classification) -> Self {
        match classification {
            Classification::Missing => Disposition::DownloadedMissing,
            Classification::Stale => Disposition::DownloadedStale,
            Classification::Corrupt => Disposition::DownloadedCorrupt,
            Classification::UpToDate => Disposition::UpToDate,
        }
    }

    pub fn failed(stage: Stage, reason: impl fmt::Display) -> Self {
        Disposition::Failed {
            stage,
            reason: reason.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Disposition::Failed { .. })
    }

    pub fn is_download(&self) -> bool {
        matches!(
            self,
            Disposition::DownloadedMissing
                | Disposition::DownloadedStale
                | Disposition::DownloadedCorrupt
        )
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::UpToDate => f.write_str("up to date"),
            Disposition::DownloadedMissing => f.write_str("downloaded (new)"),
            Disposition::DownloadedStale => f.write_str("downloaded (updated)"),
            Disposition::DownloadedCorrupt => f.write_str("downloaded (replaced corrupt copy)"),
            Disposition::Failed { stage, reason } => write!(f, "failed during {}: {}", stage, reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub id: WorkId,
    pub title: String,
    /// Known once the item got past refresh.
    pub path: Option<PathBuf>,
    pub disposition: Disposition,
}

/// Everything a finished run has to say, in subscription order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub items: Vec<ItemReport>,
    pub skipped_entities: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub up_to_date: usize,
    pub downloaded_missing: usize,
    pub downloaded_stale: usize,
    pub downloaded_corrupt: usize,
    pub failed: usize,
}

impl Counts {
    pub fn downloaded(&self) -> usize {
        self.downloaded_missing + self.downloaded_stale + self.downloaded_corrupt
    }

    pub fn total(&self) -> usize {
        self.up_to_date + self.downloaded() + self.failed
    }
}

impl SyncReport {
    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for item in &self.items {
            match item.disposition {
                Disposition::UpToDate => counts.up_to_date += 1,
                Disposition::DownloadedMissing => counts.downloaded_missing += 1,
                Disposition::DownloadedStale => counts.downloaded_stale += 1,
                Disposition::DownloadedCorrupt => counts.downloaded_corrupt += 1,
                Disposition::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.disposition.is_failure())
    }

    /// One line per item, then the totals.
    pub fn log_summary(&self) {
        for item in &self.items {
            let location = item
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| format!("work {}", item.id));
            if item.disposition.is_failure() {
                tracing::error!("{} ({}): {}", item.title, location, item.disposition);
            } else if item.disposition.is_download() {
                tracing::info!("{} ({}): {}", item.title, location, item.disposition);
            } else {
                tracing::debug!("{} ({}): {}", item.title, location, item.disposition);
            }
        }

        let counts = self.counts();
        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} downloaded ({} new, {} updated, {} replaced), {} up to date, {} failed, {} total",
            counts.downloaded(),
            counts.downloaded_missing,
            counts.downloaded_stale,
            counts.downloaded_corrupt,
            counts.up_to_date,
            counts.failed,
            counts.total()
        );
        if self.skipped_entities > 0 {
            tracing::info!(
                "  {} subscriptions skipped (series and users are not mirrored)",
                self.skipped_entities
            );
        }
        tracing::info!("  elapsed: {}", format_duration(self.elapsed));
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
