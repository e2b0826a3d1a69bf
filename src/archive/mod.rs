//! Local EPUB archives: reading the one metadata field the sync engine
//! compares, and writing freshly downloaded archives into place.

mod epub;
pub mod error;
pub mod metadata;
mod write;

#[cfg(test)]
pub(crate) mod test_support;

pub use epub::EpubArchive;
pub use error::ArchiveError;
pub use write::{remove_stale_parts, write_archive};

/// File extension of every archive in the output tree.
pub const ARCHIVE_EXTENSION: &str = "epub";
