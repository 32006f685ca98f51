//! Source lister: the authenticated GitHub account's repositories.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reposync_core::config::SourceConfig;
use reposync_core::RepositoryRef;
use tokio_util::sync::CancellationToken;

use crate::error::ForgeError;
use crate::http::{send_cancellable, HttpRequest, HttpTransport, ReqwestTransport};
use crate::rate_limit::RateLimiter;

const PAGE_SIZE: u32 = 100;
/// Hard stop for a misbehaving `Link` chain.
const MAX_PAGES: usize = 1000;

/// Anything that can produce the full source repository list.
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// Fetch every repository visible to the source account, in API order.
    async fn fetch_all(&self, cancel: &CancellationToken)
        -> Result<Vec<RepositoryRef>, ForgeError>;
}

/// GitHub REST client for `GET /user/repos`, gated by a [`RateLimiter`].
#[derive(Clone)]
pub struct GithubSource {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    token: String,
    limiter: RateLimiter,
}

impl GithubSource {
    /// Client for `config`, with every request bounded by `timeout`.
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self, ForgeError> {
        let transport = ReqwestTransport::with_timeout(timeout)?;
        Ok(Self::with_transport(
            &config.api_url,
            &config.token,
            RateLimiter::per_hour(config.rate_limit_per_hour),
            Arc::new(transport),
        ))
    }

    pub fn with_transport(
        api_url: &str,
        token: &str,
        limiter: RateLimiter,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            limiter,
        }
    }

    /// URL of the first listing page.
    pub fn first_page_url(&self) -> String {
        format!("{}/user/repos?per_page={PAGE_SIZE}&page=1", self.api_url)
    }

    fn request(&self, url: &str) -> HttpRequest {
        HttpRequest::get(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github+json")
    }
}

#[async_trait]
impl SourceLister for GithubSource {
    async fn fetch_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<RepositoryRef>, ForgeError> {
        let mut repos = Vec::new();
        let mut next = Some(self.first_page_url());
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if pages == MAX_PAGES {
                tracing::warn!(pages, "source listing exceeded page limit; truncating");
                break;
            }
            pages += 1;

            self.limiter.acquire(cancel).await?;

            let resp = match send_cancellable(self.transport.as_ref(), cancel, self.request(&url))
                .await
            {
                Ok(resp) => resp,
                Err(ForgeError::Transport(err)) => {
                    return Err(ForgeError::SourceFetch {
                        status: None,
                        detail: err.to_string(),
                    })
                }
                Err(err) => return Err(err),
            };

            if !resp.is_success() {
                return Err(ForgeError::SourceFetch {
                    status: Some(resp.status),
                    detail: resp.text(),
                });
            }

            let page: Vec<RepositoryRef> =
                resp.json().map_err(|err| ForgeError::SourceFetch {
                    status: Some(resp.status),
                    detail: format!("malformed repository list: {err}"),
                })?;
            tracing::debug!(page = pages, count = page.len(), "fetched source page");
            repos.extend(page);

            next = resp.header("link").and_then(next_link);
        }

        Ok(repos)
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
