//! AO3 client: form login with a cookie-backed session, subscription
//! listing, work metadata and downloads.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::Client;

use super::error::RemoteError;
use super::{parse, ArchiveFormat, RemoteEntity, RemoteItem, RemoteSource};

pub const DEFAULT_BASE_URL: &str = "https://archiveofourown.org";

const DEFAULT_USER_AGENT: &str = concat!("ao3sync-rs/", env!("CARGO_PKG_VERSION"));

/// AO3 paginates subscriptions 20 to a page; this bounds a runaway loop if
/// the pagination markup ever stops changing between pages.
const MAX_SUBSCRIPTION_PAGES: u32 = 500;

/// Login credentials for the remote account.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated AO3 session.
///
/// `reqwest::Client` is internally reference counted and its cookie jar is
/// shared behind an `Arc`, so one session serves all concurrent units of a
/// batch through `&self`.
pub struct Ao3Session {
    client: Client,
    base_url: String,
    username: String,
    max_pages: u32,
}

impl std::fmt::Debug for Ao3Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ao3Session")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Ao3Session {
    /// Log in and return a session whose cookies carry the authentication.
    ///
    /// Rejected credentials yield [`RemoteError::Auth`]; network trouble is
    /// reported as-is so the caller can tell the two apart.
    pub async fn authenticate(
        base_url: &str,
        credentials: &Credentials,
        request_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .cookie_provider(Arc::new(Jar::default()))
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| RemoteError::http(&base_url, e))?;
        Self::log_in(client, base_url, credentials).await
    }

    /// Run the login form flow on `client`, which must keep cookies.
    async fn log_in(
        client: Client,
        base_url: String,
        credentials: &Credentials,
    ) -> Result<Self, RemoteError> {
        let session = Self {
            client,
            base_url,
            username: credentials.username.clone(),
            max_pages: MAX_SUBSCRIPTION_PAGES,
        };

        let login_url = session.url("/users/login");
        let login_page = session.get_text(&login_url).await?;
        let token = parse::authenticity_token(&login_page)
            .ok_or_else(|| RemoteError::parse(&login_url, "login form has no authenticity token"))?;

        tracing::debug!("Authenticating as {}", credentials.username);
        let response = session
            .client
            .post(&login_url)
            .form(&[
                ("authenticity_token", token.as_str()),
                ("user[login]", credentials.username.as_str()),
                ("user[password]", credentials.password.as_str()),
                ("user[remember_me]", "1"),
                ("commit", "Log In"),
            ])
            .send()
            .await
            .map_err(|e| RemoteError::http(&login_url, e))?;

        let status = response.status();
        if status.is_client_error() && status.as_u16() != 429 {
            return Err(RemoteError::Auth(format!(
                "AO3 refused the login for {} (HTTP {})",
                credentials.username, status
            )));
        }
        if !status.is_success() {
            return Err(RemoteError::HttpStatus {
                status: status.as_u16(),
                url: login_url,
            });
        }

        let landing = response
            .text()
            .await
            .map_err(|e| RemoteError::http(&login_url, e))?;
        if !parse::is_logged_in(&landing) {
            return Err(RemoteError::Auth(format!(
                "AO3 rejected the username or password for {}",
                credentials.username
            )));
        }

        tracing::info!(user = %credentials.username, "Logged in");
        Ok(session)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, RemoteError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RemoteError::http(url, e))?;
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_text(&self, url: &str) -> Result<String, RemoteError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| RemoteError::http(url, e))
    }
}

#[async_trait::async_trait]
impl RemoteSource for Ao3Session {
    async fn list_subscriptions(&self) -> Result<Vec<RemoteEntity>, RemoteError> {
        let mut entities = Vec::new();
        let mut page = 1;
        loop {
            let url = self.url(&format!(
                "/users/{}/subscriptions?page={}",
                self.username, page
            ));
            let html = self.get_text(&url).await?;
            if page == 1 && !parse::is_logged_in(&html) {
                return Err(RemoteError::Auth(
                    "session is no longer logged in".to_string(),
                ));
            }
            let found = parse::subscription_entries(&html);
            tracing::debug!(page, entries = found.len(), "Read subscriptions page");
            entities.extend(found);
            if !parse::has_next_page(&html) {
                break;
            }
            if page >= self.max_pages {
                tracing::warn!(
                    "Stopped listing subscriptions at page {}; works on later pages are not synced this run",
                    page
                );
                break;
            }
            page += 1;
        }
        Ok(entities)
    }

    async fn refresh_metadata(&self, item: &RemoteItem) -> Result<RemoteItem, RemoteError> {
        let url = self.url(&format!("/works/{}?view_adult=true", item.id));
        let html = self.get_text(&url).await?;
        parse::work_metadata(&html, item.id).map_err(|reason| RemoteError::parse(&url, reason))
    }

    async fn fetch_content(
        &self,
        item: &RemoteItem,
        format: ArchiveFormat,
    ) -> Result<Vec<u8>, RemoteError> {
        // The scraped link is always the EPUB one.
        let path = match (&item.download_path, format) {
            (Some(path), ArchiveFormat::Epub) => path.clone(),
            (None, format) => format!("/downloads/{}/{}.{}", item.id, item.id, format.extension()),
        };
        let url = self.url(&path);
        tracing::debug!(work = %item.id, url = %url, "Fetching content");
        let bytes = self
            .get(&url)
            .await?
            .bytes()
            .await
            .map_err(|e| RemoteError::http(&url, e))?;
        Ok(bytes.to_vec())
    }
}
