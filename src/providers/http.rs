use async_trait::async_trait;

use crate::error::Error;
use crate::error::Result;
use crate::reference::ResolvedReference;

use super::{FetchOptions, FetchResult, StorageProvider};

/// Claims references whose URI matches a configured base URL prefix and
/// performs a single GET with configured headers and token. No
/// authentication retries.
pub struct HttpProvider {
    client: reqwest::Client,
    priority: u32,
    base_url: String,
    token: Option<String>,
}

impl HttpProvider {
    pub fn new(priority: u32, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            priority,
            base_url: base_url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url_for(&self, resolved: &ResolvedReference) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            resolved.reference.org(),
            resolved.reference.project(),
            resolved.reference.path(),
        )
    }
}

#[async_trait]
impl StorageProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn can_handle(&self, resolved: &ResolvedReference) -> bool {
        // Matches any reference whose computed URL falls under the
        // configured base URL; `follow_redirects` is honored by the
        // client's own default redirect policy.
        self.url_for(resolved).starts_with(self.base_url.trim_end_matches('/'))
    }

    async fn fetch(&self, resolved: &ResolvedReference, opts: &FetchOptions) -> Result<FetchResult> {
        let url = self.url_for(resolved);
        let token = opts.token.clone().or_else(|| self.token.clone());

        let mut req = self.client.get(&url).timeout(opts.timeout);
        if let Some(t) = &token {
            req = req.bearer_auth(t);
        }

        let resp = req.send().await.map_err(|e| Error::Transport(e.to_string()))?;

        match resp.status() {
            reqwest::StatusCode::OK => {}
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(Error::Unauthorized(url));
            }
            reqwest::StatusCode::NOT_FOUND => return Err(Error::NotFound(url)),
            status => return Err(Error::Transport(format!("{url}: unexpected status {status}"))),
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let content = resp.bytes().await.map_err(Error::from)?.to_vec();
        if content.len() as u64 > opts.max_size {
            return Err(Error::ContentTooLarge(format!("{} bytes from {url}", content.len())));
        }

        Ok(FetchResult::new(content, content_type, self.name()).with_metadata("url", url))
    }

    async fn exists(&self, resolved: &ResolvedReference) -> Result<bool> {
        let url = self.url_for(resolved);
        let resp = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }
}
