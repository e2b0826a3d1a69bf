//! Scraping the handful of AO3 pages the client reads.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{RemoteEntity, RemoteItem, WorkId};
use crate::markup::{attribute, decode_entities, text_content};

static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<input\b[^>]*>").expect("valid input regex"));
static META_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<meta\b[^>]*>").expect("valid meta regex"));
static BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<body\b[^>]*>").expect("valid body regex"));
static SUBSCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<dt[^>]*>\s*<a href="/(works|series|users)/([^"/?#]+)"[^>]*>(.*?)</a>"#)
        .expect("valid subscription regex")
});
static NEXT_PAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<a\b[^>]*\brel="next""#).expect("valid next page regex"));
static TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<h2 class="title heading">(.*?)</h2>"#).expect("valid title regex")
});
static FANDOMS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<dd class="fandom tags">(.*?)</dd>"#).expect("valid fandom regex")
});
static TAG_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)<a class="tag"[^>]*>(.*?)</a>"#).expect("valid tag regex"));
static SERIES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<dd class="series">.*?<a href="/series/\d+"[^>]*>(.*?)</a>"#)
        .expect("valid series regex")
});
static WORDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<dd class="words">\s*([\d,]+)\s*</dd>"#).expect("valid words regex")
});
static EPUB_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="(/downloads/[^"]+?\.epub[^"]*)""#).expect("valid download link regex")
});

/// CSRF token of the login form, falling back to the page's `csrf-token` meta.
pub(crate) fn authenticity_token(html: &str) -> Option<String> {
    INPUT_RE
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| attribute(tag, "name").as_deref() == Some("authenticity_token"))
        .and_then(|tag| attribute(tag, "value"))
        .or_else(|| {
            META_RE
                .find_iter(html)
                .map(|m| m.as_str())
                .find(|tag| attribute(tag, "name").as_deref() == Some("csrf-token"))
                .and_then(|tag| attribute(tag, "content"))
        })
        .map(|token| decode_entities(&token))
}

/// AO3 tags `<body>` with `logged-in` or `logged-out`.
pub(crate) fn is_logged_in(html: &str) -> bool {
    BODY_RE
        .find(html)
        .and_then(|body| attribute(body.as_str(), "class"))
        .is_some_and(|class| class.split_whitespace().any(|c| c == "logged-in"))
}

/// Entries of one subscriptions page, in page order.
pub(crate) fn subscription_entries(html: &str) -> Vec<RemoteEntity> {
    SUBSCRIPTION_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let name = text_content(&caps[3]);
            match &caps[1] {
                "works" => caps[2]
                    .parse()
                    .ok()
                    .map(|id| RemoteEntity::Work(RemoteItem::new(WorkId(id), name))),
                "series" => caps[2]
                    .parse()
                    .ok()
                    .map(|id| RemoteEntity::Series { id, name }),
                _ => Some(RemoteEntity::User {
                    name: caps[2].to_string(),
                }),
            }
        })
        .collect()
}

pub(crate) fn has_next_page(html: &str) -> bool {
    NEXT_PAGE_RE.is_match(html)
}

/// Metadata of a work page. Fails if the page has no title or word count,
/// which is what AO3 serves for deleted, hidden or adult-gated works.
pub(crate) fn work_metadata(html: &str, id: WorkId) -> Result<RemoteItem, String> {
    let title = TITLE_RE
        .captures(html)
        .map(|caps| text_content(&caps[1]))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| format!("no title on page for work {}", id))?;

    let raw_words = WORDS_RE
        .captures(html)
        .map(|caps| caps[1].replace(',', ""))
        .ok_or_else(|| format!("no word count on page for work {}", id))?;
    let word_count = raw_words
        .parse::<u64>()
        .map_err(|e| format!("bad word count '{}' for work {}: {}", raw_words, id, e))?;

    let categories = FANDOMS_RE
        .captures(html)
        .map(|caps| {
            TAG_LINK_RE
                .captures_iter(&caps[1])
                .map(|tag| text_content(&tag[1]))
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let collection = SERIES_RE
        .captures(html)
        .map(|caps| text_content(&caps[1]))
        .filter(|name| !name.is_empty());

    let download_path = EPUB_LINK_RE
        .captures(html)
        .map(|caps| decode_entities(&caps[1]));

    Ok(RemoteItem {
        id,
        title,
        categories,
        collection,
        word_count,
        download_path,
    })
}
