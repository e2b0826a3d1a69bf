use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::epub::EpubArchive;
use super::error::ArchiveError;

const PART_EXTENSION: &str = "part";

/// Sibling temp path the archive is staged at before it replaces `path`.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PART_EXTENSION);
    path.with_file_name(name)
}

/// Staged file that is removed when dropped, unless [`PartFile::keep`] was
/// called. A unit dropped by its timeout mid-write leaves nothing behind.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Persist downloaded archive bytes at `path`, replacing whatever is there.
///
/// The bytes are staged in a `.part` file and only renamed over `path` once
/// they parse as an EPUB, so an error page served in place of the download
/// never lands at the final path. The parent directory must already exist.
pub async fn write_archive(path: &Path, bytes: &[u8]) -> Result<EpubArchive, ArchiveError> {
    let part = PartFile::new(part_path(path));

    let mut file = fs::File::create(&part.path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    let staged = part.path.clone();
    let archive = tokio::task::spawn_blocking(move || EpubArchive::open(&staged))
        .await
        .map_err(|e| ArchiveError::Disk(io::Error::other(e)))??;

    fs::rename(&part.path, path).await?;
    part.keep();
    Ok(archive.relocate(path))
}

/// Delete `.part` files under `root` left by writes that never finished, for
/// example when a blocking file operation outlived its cancelled unit.
///
/// Returns how many were removed. A missing `root` is not an error.
pub fn remove_stale_parts(root: &Path) -> io::Result<usize> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            removed += remove_stale_parts(&path)?;
        } else if path.extension().is_some_and(|ext| ext == PART_EXTENSION) {
            tracing::debug!("Removing unfinished download {}", path.display());
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{epub_bytes, preface_with_words};

    #[test]
    fn test_part_path_keeps_full_name() {
        assert_eq!(
            part_path(Path::new("/out/F/My.Fic.epub")),
            PathBuf::from("/out/F/My.Fic.epub.part")
        );
    }

    #[tokio::test]
    async fn test_write_archive_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My_Fic.epub");

        let archive = write_archive(&path, &epub_bytes(&preface_with_words(500)))
            .await
            .unwrap();

        assert_eq!(archive.path(), path.as_path());
        assert_eq!(archive.word_count().unwrap(), 500);
        assert!(path.exists());
        assert!(!part_path(&path).exists());
    }

    #[tokio::test]
    async fn test_write_archive_overwrites_remnant() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My_Fic.epub");
        std::fs::write(&path, b"old partial garbage").unwrap();

        write_archive(&path, &epub_bytes(&preface_with_words(480)))
            .await
            .unwrap();

        assert_eq!(EpubArchive::open(&path).unwrap().word_count().unwrap(), 480);
    }

    #[tokio::test]
    async fn test_write_archive_rejects_error_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My_Fic.epub");

        let err = write_archive(&path, b"<html>Retry later</html>")
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::Malformed { .. }));
        assert!(!path.exists());
        assert!(!part_path(&path).exists());
    }

    #[test]
    fn test_part_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My_Fic.epub.part");
        std::fs::write(&path, b"half a download").unwrap();

        drop(PartFile::new(path.clone()));
        assert!(!path.exists());
    }

    #[test]
    fn test_part_file_kept_after_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My_Fic.epub");
        std::fs::write(&path, b"renamed").unwrap();

        PartFile::new(path.clone()).keep();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_abandoned_write_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("My_Fic.epub");
        let bytes = epub_bytes(&preface_with_words(500));

        let mut write = Box::pin(write_archive(&path, &bytes));
        // Drive the write until it is parked on a blocking file operation,
        // then drop it the way a unit timeout would.
        let polled = futures_util::poll!(&mut write);
        assert!(polled.is_pending());
        drop(write);

        // Blocking file operations already handed off finish on their own.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        remove_stale_parts(dir.path()).unwrap();
        assert!(!part_path(&path).exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_stale_parts_walks_tree() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Fandom_X/Series");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("Fandom_X/A.epub.part"), b"x").unwrap();
        std::fs::write(nested.join("B.epub.part"), b"x").unwrap();
        std::fs::write(nested.join("C.epub"), b"x").unwrap();

        assert_eq!(remove_stale_parts(dir.path()).unwrap(), 2);
        assert!(nested.join("C.epub").exists());
        assert!(!nested.join("B.epub.part").exists());
    }

    #[test]
    fn test_remove_stale_parts_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(remove_stale_parts(&dir.path().join("absent")).unwrap(), 0);
    }
}
