use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipArchive;

use super::error::ArchiveError;
use super::metadata;
use crate::markup::attribute;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Largest container entry read into memory. AO3 prefaces are a few KiB;
/// the header-declared size is never trusted.
const MAX_ENTRY_BYTES: u64 = 16 * 1024 * 1024;

static ROOTFILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?rootfile\b[^>]*>").expect("valid rootfile regex"));
static MANIFEST_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?item\b[^>]*>").expect("valid manifest item regex"));
static DD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<dd\b[^>]*>(.*?)</dd>").expect("valid dd regex"));

/// A parsed EPUB, reduced to the part the sync engine cares about: the markup
/// of its first content document (the preface AO3 writes before chapter one).
///
/// Parsing is eager so the file handle is released before [`EpubArchive::open`]
/// returns, leaving the caller free to delete or replace the file.
#[derive(Debug, Clone)]
pub struct EpubArchive {
    path: PathBuf,
    first_section: String,
}

impl EpubArchive {
    /// Open and parse an EPUB container.
    ///
    /// Fails with [`ArchiveError::Disk`] if the file cannot be read at all and
    /// with [`ArchiveError::Malformed`] if it is not a usable EPUB.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        Self::from_reader(file, path)
    }

    fn from_reader<R: Read + Seek>(reader: R, path: &Path) -> Result<Self, ArchiveError> {
        let mut zip = ZipArchive::new(reader).map_err(|e| ArchiveError::malformed(path, e))?;

        let container = read_entry(&mut zip, CONTAINER_PATH)
            .map_err(|reason| ArchiveError::malformed(path, reason))?;
        let package_path = ROOTFILE_RE
            .find_iter(&container)
            .find_map(|tag| attribute(tag.as_str(), "full-path"))
            .ok_or_else(|| ArchiveError::malformed(path, "container.xml names no rootfile"))?;

        let package = read_entry(&mut zip, &package_path)
            .map_err(|reason| ArchiveError::malformed(path, reason))?;
        let first_href = first_document_href(&package)
            .ok_or_else(|| ArchiveError::malformed(path, "package has no XHTML documents"))?;

        let entry_name = resolve_href(&package_path, &first_href);
        let first_section = read_entry(&mut zip, &entry_name)
            .map_err(|reason| ArchiveError::malformed(path, reason))?;

        Ok(Self {
            path: path.to_path_buf(),
            first_section,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn relocate(mut self, path: &Path) -> Self {
        self.path = path.to_path_buf();
        self
    }

    /// The descriptive front-matter of the first section: the inner markup of
    /// its last `<dd>` element, which AO3 uses for the stats line.
    pub fn first_section_metadata(&self) -> Result<String, ArchiveError> {
        DD_RE
            .captures_iter(&self.first_section)
            .last()
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ArchiveError::MissingMetadata(self.path.display().to_string()))
    }

    /// Word count embedded in the front-matter.
    pub fn word_count(&self) -> Result<u64, ArchiveError> {
        metadata::extract_word_count(&self.first_section_metadata()?)
    }
}

fn read_entry<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<String, String> {
    read_entry_bounded(zip, name, MAX_ENTRY_BYTES)
}

fn read_entry_bounded<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<String, String> {
    let entry = zip
        .by_name(name)
        .map_err(|e| format!("missing entry {}: {}", name, e))?;
    let mut buf = Vec::new();
    entry
        .take(limit + 1)
        .read_to_end(&mut buf)
        .map_err(|e| format!("unreadable entry {}: {}", name, e))?;
    if buf.len() as u64 > limit {
        return Err(format!("entry {} is larger than {} bytes", name, limit));
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Href of the first XHTML document in manifest order.
fn first_document_href(package: &str) -> Option<String> {
    MANIFEST_ITEM_RE.find_iter(package).find_map(|tag| {
        let tag = tag.as_str();
        if attribute(tag, "media-type").as_deref() != Some(XHTML_MEDIA_TYPE) {
            return None;
        }
        attribute(tag, "href")
    })
}

/// Resolve a manifest href against the directory holding the package file,
/// yielding the ZIP entry name.
fn resolve_href(package_path: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut parts: Vec<&str> = match package_path.rfind('/') {
        Some(idx) => package_path[..idx].split('/').collect(),
        None => Vec::new(),
    };
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::{
        declare_huge_entry_size, epub_bytes, preface_with_words, write_epub, CONTAINER_XML,
    };
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    #[test]
    fn test_resolve_href_relative_to_package_dir() {
        assert_eq!(resolve_href("OEBPS/content.opf", "preface.xhtml"), "OEBPS/preface.xhtml");
        assert_eq!(resolve_href("content.opf", "text/ch1.xhtml"), "text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS/pkg/content.opf", "../text/a.xhtml#top"), "OEBPS/text/a.xhtml");
    }

    #[test]
    fn test_first_document_skips_non_xhtml_items() {
        let package = r#"<manifest>
            <item id="css" href="style.css" media-type="text/css"/>
            <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
            <item id="pre" href="preface.xhtml" media-type="application/xhtml+xml"/>
            <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
        </manifest>"#;
        assert_eq!(first_document_href(package).as_deref(), Some("preface.xhtml"));
    }

    #[test]
    fn test_open_reads_word_count_from_preface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fic.epub");
        write_epub(&path, 12_345);

        let archive = EpubArchive::open(&path).unwrap();
        assert_eq!(archive.word_count().unwrap(), 12_345);
        assert!(archive.first_section_metadata().unwrap().contains("Words: 12,345"));
    }

    #[test]
    fn test_metadata_uses_last_dd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fic.epub");
        let body = r#"<dl><dt>Fandom:</dt><dd>Words: 7 Fandom</dd>
            <dt>Stats:</dt><dd>Words: 900</dd></dl>"#;
        std::fs::write(&path, epub_bytes(body)).unwrap();

        let archive = EpubArchive::open(&path).unwrap();
        assert_eq!(archive.word_count().unwrap(), 900);
    }

    #[test]
    fn test_open_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fic.epub");
        std::fs::write(&path, b"<html>Retry later</html>").unwrap();

        let err = EpubArchive::open(&path).unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed { .. }));
    }

    #[test]
    fn test_open_rejects_zip_without_container() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fic.epub");
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file("readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"not an epub").unwrap();
        std::fs::write(&path, zip.finish().unwrap().into_inner()).unwrap();

        assert!(matches!(
            EpubArchive::open(&path),
            Err(ArchiveError::Malformed { .. })
        ));
    }

    #[test]
    fn test_open_missing_file_is_disk_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EpubArchive::open(&dir.path().join("absent.epub")).unwrap_err();
        assert!(matches!(err, ArchiveError::Disk(_)));
    }

    #[test]
    fn test_preface_without_dd_is_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fic.epub");
        std::fs::write(&path, epub_bytes("<p>No stats here</p>")).unwrap();

        let archive = EpubArchive::open(&path).unwrap();
        assert!(matches!(
            archive.word_count(),
            Err(ArchiveError::MissingMetadata(_))
        ));
    }

    #[test]
    fn test_preface_helper_formats_thousands() {
        assert!(preface_with_words(1_500).contains("Words: 1,500"));
    }

    #[test]
    fn test_oversized_entry_is_malformed_not_read() {
        let bytes = epub_bytes(&preface_with_words(10));
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let err = read_entry_bounded(&mut zip, CONTAINER_PATH, 16).unwrap_err();
        assert!(err.contains("larger than 16 bytes"));
        assert!(read_entry_bounded(&mut zip, CONTAINER_PATH, MAX_ENTRY_BYTES).is_ok());
    }

    #[test]
    fn test_open_ignores_huge_declared_entry_size() {
        // Container whose header claims a 64 TiB entry and whose package is absent.
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        zip.start_file(CONTAINER_PATH, options).unwrap();
        zip.write_all(CONTAINER_XML.as_bytes()).unwrap();
        let mut bytes = zip.finish().unwrap().into_inner();
        declare_huge_entry_size(&mut bytes, CONTAINER_PATH);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fic.epub");
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            EpubArchive::open(&path),
            Err(ArchiveError::Malformed { .. })
        ));
    }
}
