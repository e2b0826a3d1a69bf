use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::remote::{RemoteError, WorkId};

/// Item-scoped failures of a sync run. None of these abort the run; each is
/// attached to the item it happened to and reported at the end.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("Timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Interrupted by shutdown before it was started")]
    Interrupted,

    #[error("Path collision: {} is already used by work {owner}", path.display())]
    PathCollision { path: PathBuf, owner: WorkId },
}

impl SyncError {
    /// Whether another attempt of the same unit might succeed.
    ///
    /// A download that does not parse as an EPUB is usually an error page
    /// served under load, so content errors from the archive writer count as
    /// transient. Local disk trouble does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Archive(e) => e.is_content_error(),
            SyncError::Disk(_)
            | SyncError::TimedOut(_)
            | SyncError::Interrupted
            | SyncError::PathCollision { .. } => false,
        }
    }
}
