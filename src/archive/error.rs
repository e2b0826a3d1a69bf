use thiserror::Error;

/// Errors raised while reading or writing a local EPUB archive.
///
/// Everything except [`ArchiveError::Disk`] describes the *contents* of the
/// file, so the staleness check treats those as a corrupt archive that must be
/// replaced rather than as a failure of the run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Malformed archive {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("No metadata section in {0}")]
    MissingMetadata(String),

    #[error("Metadata section has no word count")]
    MissingWordCount,

    #[error("Unparseable word count '{0}'")]
    InvalidWordCount(String),

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),
}

impl ArchiveError {
    pub(crate) fn malformed(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        ArchiveError::Malformed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is about what the file contains, as opposed to the
    /// filesystem failing to hand it over.
    pub fn is_content_error(&self) -> bool {
        !matches!(self, ArchiveError::Disk(_))
    }
}
