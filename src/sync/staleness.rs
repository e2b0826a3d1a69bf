use std::io;
use std::path::Path;

use crate::archive::{ArchiveError, EpubArchive};
use crate::remote::RemoteItem;

/// State of the local archive relative to the remote item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    UpToDate,
    Missing,
    Stale,
    Corrupt,
}

impl Classification {
    pub fn needs_download(&self) -> bool {
        !matches!(self, Classification::UpToDate)
    }
}

/// Compare the archive at `path` against `item` using the embedded word count.
///
/// Anything other than `UpToDate` leaves no file at `path`: stale and corrupt
/// archives are deleted here so the download step starts from a clean slot.
/// An archive whose word count cannot be read is treated as corrupt, never as
/// current. Only filesystem failures (opening, deleting) come back as `Err`.
pub fn classify(item: &RemoteItem, path: &Path) -> io::Result<Classification> {
    let archive = match EpubArchive::open(path) {
        Ok(archive) => archive,
        Err(ArchiveError::Disk(e)) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Classification::Missing);
        }
        Err(ArchiveError::Disk(e)) => return Err(e),
        Err(e) => {
            tracing::warn!("{}: {}, replacing", path.display(), e);
            remove(path)?;
            return Ok(Classification::Corrupt);
        }
    };

    let local = match archive.word_count() {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("{}: {}, replacing", path.display(), e);
            remove(path)?;
            return Ok(Classification::Corrupt);
        }
    };

    if local == item.word_count {
        tracing::debug!(words = local, "{} is up to date", path.display());
        return Ok(Classification::UpToDate);
    }

    tracing::info!(
        local,
        remote = item.word_count,
        "{} changed remotely, replacing",
        path.display()
    );
    remove(path)?;
    Ok(Classification::Stale)
}

fn remove(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
