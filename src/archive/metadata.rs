//! Word-count extraction from the descriptive front-matter AO3 embeds in the
//! first section of every EPUB it generates.
//!
//! The preface ends with a `<dd>` stats block of the form
//! `Published: 2021-03-04 Updated: 2022-01-01 Words: 12,345 Chapters: 7/?`.
//! Only the `Words:` figure is read; everything else in the blob is ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ArchiveError;

static WORDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Words:\s*([\d,]+)").expect("valid word count regex"));

/// Extract the word count from a metadata blob, stripping thousands separators.
pub fn extract_word_count(blob: &str) -> Result<u64, ArchiveError> {
    let caps = WORDS_RE
        .captures(blob)
        .ok_or(ArchiveError::MissingWordCount)?;
    let raw = &caps[1];
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    digits
        .parse::<u64>()
        .map_err(|_| ArchiveError::InvalidWordCount(raw.to_string()))
}
