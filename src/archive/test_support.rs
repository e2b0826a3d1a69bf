//! In-memory EPUB fixtures shaped like the files AO3 generates.

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const CONTENT_OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <manifest>
    <item id="css" href="stylesheet.css" media-type="text/css"/>
    <item id="preface" href="preface.xhtml" media-type="application/xhtml+xml"/>
    <item id="chapter1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="preface"/>
    <itemref idref="chapter1"/>
  </spine>
</package>"#;

/// Render `n` with comma thousands separators, as AO3 does.
pub(crate) fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Preface body carrying the AO3 tag list and stats block.
pub(crate) fn preface_with_words(words: u64) -> String {
    format!(
        r#"<div class="meta"><dl class="tags">
<dt>Rating:</dt><dd>General Audiences</dd>
<dt>Fandom:</dt><dd>Fandom X</dd>
<dt>Stats:</dt><dd>Published: 2021-03-04 Updated: 2022-01-01 Words: {} Chapters: 2/?</dd>
</dl></div>"#,
        with_thousands(words)
    )
}

/// Build a complete EPUB whose preface body is `preface_body`.
pub(crate) fn epub_bytes(preface_body: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries = [
        ("mimetype", "application/epub+zip".to_string(), stored),
        ("META-INF/container.xml", CONTAINER_XML.to_string(), deflated),
        ("OEBPS/content.opf", CONTENT_OPF.to_string(), deflated),
        ("OEBPS/stylesheet.css", "body { margin: 0; }".to_string(), deflated),
        (
            "OEBPS/preface.xhtml",
            format!(
                "<html xmlns=\"http://www.w3.org/1999/xhtml\"><body>{}</body></html>",
                preface_body
            ),
            deflated,
        ),
        (
            "OEBPS/chapter1.xhtml",
            "<html><body><p>Words: 3 are not metadata.</p></body></html>".to_string(),
            deflated,
        ),
    ];
    for (name, contents, options) in entries {
        zip.start_file(name, options).expect("start zip entry");
        zip.write_all(contents.as_bytes()).expect("write zip entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

/// Write an AO3-shaped EPUB with the given embedded word count.
pub(crate) fn write_epub(path: &Path, words: u64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(path, epub_bytes(&preface_with_words(words))).expect("write fixture");
}

/// Rewrite the central-directory record of `name` so it claims a 64 TiB
/// uncompressed size, through the zip64 extra field when one is present.
pub(crate) fn declare_huge_entry_size(bytes: &mut [u8], name: &str) {
    const CENTRAL_HEADER: &[u8] = b"PK\x01\x02";
    const ZIP64_EXTRA_ID: u16 = 0x0001;
    fn u16_at(b: &[u8], at: usize) -> usize {
        u16::from_le_bytes([b[at], b[at + 1]]) as usize
    }

    let mut at = 0;
    while at + 46 <= bytes.len() {
        if &bytes[at..at + 4] != CENTRAL_HEADER {
            at += 1;
            continue;
        }
        let name_len = u16_at(bytes, at + 28);
        let extra_len = u16_at(bytes, at + 30);
        let name_start = at + 46;
        if &bytes[name_start..name_start + name_len] != name.as_bytes() {
            at = name_start;
            continue;
        }

        bytes[at + 24..at + 28].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut field = name_start + name_len;
        let extra_end = field + extra_len;
        while field + 4 <= extra_end {
            let id = u16_at(bytes, field) as u16;
            let len = u16_at(bytes, field + 2);
            if id == ZIP64_EXTRA_ID && len >= 8 {
                bytes[field + 4..field + 12].copy_from_slice(&(1u64 << 46).to_le_bytes());
            }
            field += 4 + len;
        }
        return;
    }
    panic!("no central directory record for {}", name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_thousands() {
        assert_eq!(with_thousands(0), "0");
        assert_eq!(with_thousands(999), "999");
        assert_eq!(with_thousands(1000), "1,000");
        assert_eq!(with_thousands(1_234_567), "1,234,567");
    }
}
