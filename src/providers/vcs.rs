use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::reference::ResolvedReference;

use super::{content_type_for_path, FetchOptions, FetchResult, StorageProvider};

#[derive(Debug, Deserialize)]
struct MetadataApiResponse {
    content: String,
    #[serde(default)]
    sha: Option<String>,
}

/// Claims any reference whose `is_current_project` flag is false. Tries a
/// raw-content endpoint first; on HTTP failure, with a credential available,
/// falls back to a metadata API returning base64 content plus a commit id.
pub struct VersionControlProvider {
    client: reqwest::Client,
    priority: u32,
    raw_content_base_url: String,
    metadata_api_base_url: Option<String>,
    default_branch: String,
    token: Option<String>,
}

impl VersionControlProvider {
    pub fn new(priority: u32, raw_content_base_url: impl Into<String>, default_branch: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            priority,
            raw_content_base_url: raw_content_base_url.into(),
            metadata_api_base_url: None,
            default_branch: default_branch.into(),
            token: None,
        }
    }

    pub fn with_metadata_api(mut self, base_url: impl Into<String>) -> Self {
        self.metadata_api_base_url = Some(base_url.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn raw_url(&self, resolved: &ResolvedReference, branch: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_content_base_url.trim_end_matches('/'),
            resolved.reference.org(),
            resolved.reference.project(),
            branch,
            resolved.reference.path(),
        )
    }

    fn metadata_url(&self, base: &str, resolved: &ResolvedReference) -> String {
        format!(
            "{}/{}/{}/contents/{}",
            base.trim_end_matches('/'),
            resolved.reference.org(),
            resolved.reference.project(),
            resolved.reference.path(),
        )
    }
}

#[async_trait]
impl StorageProvider for VersionControlProvider {
    fn name(&self) -> &str {
        "version-control"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn can_handle(&self, resolved: &ResolvedReference) -> bool {
        !resolved.is_current_project
    }

    async fn fetch(&self, resolved: &ResolvedReference, opts: &FetchOptions) -> Result<FetchResult> {
        let branch = opts.branch.clone().unwrap_or_else(|| self.default_branch.clone());
        let token = opts.token.clone().or_else(|| self.token.clone());
        let url = self.raw_url(resolved, &branch);

        let mut req = self.client.get(&url).timeout(opts.timeout);
        if let Some(t) = &token {
            req = req.bearer_auth(t);
        }

        let raw_result = req.send().await;

        let response = match raw_result {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED || resp.status() == reqwest::StatusCode::FORBIDDEN => {
                return Err(Error::Unauthorized(format!("{url}: {}", resp.status())));
            }
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                return self.fetch_via_metadata_api(resolved, opts, &token, &url).await;
            }
            Ok(resp) => return Err(Error::Transport(format!("{url}: unexpected status {}", resp.status()))),
            Err(e) => return Err(Error::Transport(e.to_string())),
        };

        let content = response.bytes().await.map_err(Error::from)?.to_vec();
        if content.len() as u64 > opts.max_size {
            return Err(Error::ContentTooLarge(format!("{} bytes from {url}", content.len())));
        }

        let content_type = content_type_for_path(resolved.reference.path());
        Ok(FetchResult::new(content, content_type, self.name())
            .with_metadata("branch", branch)
            .with_metadata("url", url))
    }

    async fn exists(&self, resolved: &ResolvedReference) -> Result<bool> {
        let url = self.raw_url(resolved, &self.default_branch);
        let resp = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(resp.status().is_success())
    }
}

impl VersionControlProvider {
    async fn fetch_via_metadata_api(
        &self,
        resolved: &ResolvedReference,
        opts: &FetchOptions,
        token: &Option<String>,
        attempted_url: &str,
    ) -> Result<FetchResult> {
        let Some(token) = token else {
            return Err(Error::NotFound(attempted_url.to_string()));
        };
        let Some(api_base) = &self.metadata_api_base_url else {
            return Err(Error::NotFound(attempted_url.to_string()));
        };

        let url = self.metadata_url(api_base, resolved);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .timeout(opts.timeout)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        match resp.status() {
            reqwest::StatusCode::OK => {}
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                return Err(Error::Unauthorized(url));
            }
            reqwest::StatusCode::NOT_FOUND => return Err(Error::NotFound(url)),
            status => return Err(Error::Transport(format!("{url}: unexpected status {status}"))),
        }

        let body: MetadataApiResponse = resp.json().await.map_err(Error::from)?;
        let cleaned: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
        let content = BASE64
            .decode(cleaned)
            .map_err(|e| Error::Transport(format!("invalid base64 content: {e}")))?;

        if content.len() as u64 > opts.max_size {
            return Err(Error::ContentTooLarge(format!("{} bytes from {url}", content.len())));
        }

        let content_type = content_type_for_path(resolved.reference.path());
        let mut result = FetchResult::new(content, content_type, self.name()).with_metadata("url", url);
        if let Some(sha) = body.sha {
            result = result.with_metadata("commit", sha);
        }
        Ok(result)
    }
}
