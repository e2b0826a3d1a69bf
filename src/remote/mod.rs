//! The remote side of the mirror: AO3 subscriptions and the works they point to.

pub mod ao3;
pub mod error;
mod parse;

pub use ao3::{Ao3Session, Credentials};
pub use error::RemoteError;

/// AO3's numeric work identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(pub u64);

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote document tracked by the mirror.
///
/// Listing only yields `id` and `title`; the rest is filled in by
/// [`RemoteSource::refresh_metadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub id: WorkId,
    pub title: String,
    /// Fandoms. Only the first one decides where the archive lives.
    pub categories: Vec<String>,
    /// Name of the first series the work belongs to.
    pub collection: Option<String>,
    pub word_count: u64,
    /// Site-relative download link for the EPUB, when the work page exposed one.
    pub download_path: Option<String>,
}

impl RemoteItem {
    pub fn new(id: WorkId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            categories: Vec::new(),
            collection: None,
            word_count: 0,
            download_path: None,
        }
    }
}

/// One entry of the subscription list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEntity {
    Work(RemoteItem),
    Series { id: u64, name: String },
    User { name: String },
}

impl RemoteEntity {
    pub fn into_work(self) -> Option<RemoteItem> {
        match self {
            RemoteEntity::Work(item) => Some(item),
            RemoteEntity::Series { .. } | RemoteEntity::User { .. } => None,
        }
    }

    /// Short human-readable label, used when logging skipped entries.
    pub fn describe(&self) -> String {
        match self {
            RemoteEntity::Work(item) => format!("work {} \"{}\"", item.id, item.title),
            RemoteEntity::Series { id, name } => format!("series {} \"{}\"", id, name),
            RemoteEntity::User { name } => format!("user {}", name),
        }
    }
}

/// Download formats offered by the remote. Only EPUB carries the metadata
/// the staleness check reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Epub,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Epub => "epub",
        }
    }
}

/// Authenticated access to the remote source.
///
/// A single session is shared by every concurrent unit of a batch, so
/// implementations must tolerate overlapping calls through `&self`.
#[async_trait::async_trait]
pub trait RemoteSource: Send + Sync {
    /// Every subscription of the logged-in user, works and otherwise.
    async fn list_subscriptions(&self) -> Result<Vec<RemoteEntity>, RemoteError>;

    /// Current metadata for `item`, without its content.
    async fn refresh_metadata(&self, item: &RemoteItem) -> Result<RemoteItem, RemoteError>;

    /// Full content of `item` rendered as `format`.
    async fn fetch_content(
        &self,
        item: &RemoteItem,
        format: ArchiveFormat,
    ) -> Result<Vec<u8>, RemoteError>;
}
