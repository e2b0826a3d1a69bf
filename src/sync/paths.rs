use std::path::{Path, PathBuf};

use crate::archive::ARCHIVE_EXTENSION;
use crate::remote::RemoteItem;

/// Directory used for works that carry no fandom.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Local path of the archive mirroring `item`:
/// `<output_dir>/<fandom>/[<series>/]<title>.epub`.
///
/// Pure: the same item always maps to the same path. Works whose names only
/// differ in characters that `ascii_only` strips map to the same path, which
/// the orchestrator detects and reports.
pub fn resolve(output_dir: &Path, item: &RemoteItem) -> PathBuf {
    let category = item
        .categories
        .first()
        .map(|c| ascii_only(c))
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

    let mut path = output_dir.join(directory_segment(category));
    if let Some(collection) = &item.collection {
        path.push(directory_segment(ascii_only(collection)));
    }
    path.push(format!("{}.{}", ascii_only(&item.title), ARCHIVE_EXTENSION));
    path
}

/// Filesystem-safe form of a display name: spaces become underscores, then
/// everything outside ASCII alphanumerics and `-_()`~.<>[]{}` is dropped.
pub fn ascii_only(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| {
            c.is_ascii_alphanumeric()
                || matches!(
                    c,
                    '-' | '_' | '(' | ')' | '`' | '~' | '.' | '<' | '>' | '[' | ']' | '{' | '}'
                )
        })
        .collect()
}

/// A sanitized name that would resolve to the current or parent directory
/// (or to nothing) is replaced so it stays a real subdirectory.
fn directory_segment(name: String) -> String {
    if name.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        name
    }
}
