//! Fetching visited pages
//!
//! This module provides:
//! - Per-domain concurrency ceilings with delay and jitter between requests
//! - Manual redirect following, so results stay keyed by the requested URL
//! - One [`FetchedPage`] per requested URL, failures included

mod rate_limit;

pub use rate_limit::*;

use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// The outcome of fetching one URL
#[derive(Debug)]
pub struct FetchedPage {
    /// URL as it was requested
    pub requested_url: String,
    /// URL the body was finally served from
    pub final_url: String,
    pub body: String,
    /// HTTP status, 0 when no response was received
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Every redirect hop, in order
    pub redirects: Vec<String>,
    pub error: Option<Error>,
}

impl FetchedPage {
    fn failed(requested_url: &str, status_code: u16, error: Error) -> Self {
        Self {
            requested_url: requested_url.to_string(),
            final_url: requested_url.to_string(),
            body: String::new(),
            status_code,
            content_type: None,
            redirects: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Anything that can turn a batch of URLs into fetched pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch every URL. Returns once all requests have completed, with exactly
    /// one entry per distinct requested URL.
    async fn fetch_all(&self, urls: &[String]) -> HashMap<String, FetchedPage>;
}

/// HTTP fetcher with per-domain politeness
pub struct Crawler {
    client: Client,
    config: CrawlConfig,
    /// One limiter per host, shared by every request and redirect hop to it
    rate_limiters: RwLock<HashMap<String, Arc<DomainRateLimiter>>>,
}

impl Crawler {
    /// Create a new crawler
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            rate_limiters: RwLock::new(HashMap::new()),
        })
    }

    async fn limiter_for(&self, url: &Url) -> Arc<DomainRateLimiter> {
        let host = url.host_str().unwrap_or_default().to_string();

        if let Some(limiter) = self.rate_limiters.read().await.get(&host) {
            return limiter.clone();
        }

        self.rate_limiters
            .write()
            .await
            .entry(host)
            .or_insert_with(|| {
                Arc::new(DomainRateLimiter::new(
                    self.config.delay(),
                    self.config.jitter(),
                ))
            })
            .clone()
    }

    /// Fetch one URL, following redirects by hand
    async fn fetch_one(&self, requested: &str) -> FetchedPage {
        let mut current = match Url::parse(requested) {
            Ok(url) => url,
            Err(e) => return FetchedPage::failed(requested, 0, Error::UrlParse(e)),
        };

        let mut redirects = Vec::new();

        loop {
            // Every hop counts against its host's politeness budget
            self.limiter_for(&current).await.wait().await;
            debug!("Fetching: {}", current);

            let response = match self.client.get(current.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    let mut page = FetchedPage::failed(requested, 0, Error::Http(e));
                    page.final_url = current.to_string();
                    page.redirects = redirects;
                    return page;
                }
            };

            let status = response.status();
            let location = status
                .is_redirection()
                .then(|| response.headers().get(reqwest::header::LOCATION))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            if let Some(location) = location {
                if redirects.len() >= self.config.max_redirects {
                    warn!(url = %requested, hops = redirects.len(), "Too many redirects");
                    let mut page = FetchedPage::failed(
                        requested,
                        status.as_u16(),
                        Error::RedirectLoop(requested.to_string()),
                    );
                    page.final_url = current.to_string();
                    page.redirects = redirects;
                    return page;
                }

                match current.join(&location) {
                    Ok(next) => {
                        debug!(hop = %next, original = %requested, "Following redirect");
                        redirects.push(next.to_string());
                        current = next;
                        continue;
                    }
                    Err(e) => {
                        let mut page =
                            FetchedPage::failed(requested, status.as_u16(), Error::UrlParse(e));
                        page.final_url = current.to_string();
                        page.redirects = redirects;
                        return page;
                    }
                }
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let final_url = response.url().to_string();

            let (body, body_error) = match response.text().await {
                Ok(body) => (body, None),
                Err(e) => (String::new(), Some(Error::Http(e))),
            };

            let error = body_error.or_else(|| {
                (!status.is_success()).then(|| Error::Fetch(format!("HTTP {}: {}", status, final_url)))
            });

            return FetchedPage {
                requested_url: requested.to_string(),
                final_url,
                body,
                status_code: status.as_u16(),
                content_type,
                redirects,
                error,
            };
        }
    }

    /// Fetch all URLs for one domain under its concurrency ceiling
    async fn fetch_domain(&self, domain: String, urls: Vec<String>) -> Vec<FetchedPage> {
        debug!(domain = %domain, count = urls.len(), "Fetching domain");

        stream::iter(urls)
            .map(|url| async move { self.fetch_one(&url).await })
            .buffer_unordered(self.config.concurrency_per_domain.max(1))
            .collect()
            .await
    }
}

/// Group URLs by host. URLs that cannot be fetched at all come back as
/// already-failed pages.
fn group_by_domain(urls: &[String]) -> (HashMap<String, Vec<String>>, Vec<FetchedPage>) {
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    let mut rejected = Vec::new();

    for raw in urls {
        let parsed = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                rejected.push(FetchedPage::failed(raw, 0, Error::UrlParse(e)));
                continue;
            }
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            rejected.push(FetchedPage::failed(
                raw,
                0,
                Error::Fetch(format!("Unsupported scheme: {}", parsed.scheme())),
            ));
            continue;
        }

        let Some(host) = parsed.host_str() else {
            rejected.push(FetchedPage::failed(
                raw,
                0,
                Error::Fetch("URL has no host".to_string()),
            ));
            continue;
        };

        let group = groups.entry(host.to_string()).or_default();
        if !group.contains(raw) {
            group.push(raw.clone());
        }
    }

    (groups, rejected)
}

#[async_trait]
impl PageFetcher for Crawler {
    async fn fetch_all(&self, urls: &[String]) -> HashMap<String, FetchedPage> {
        let (groups, rejected) = group_by_domain(urls);
        info!(
            "Fetching {} URLs across {} domains",
            urls.len(),
            groups.len()
        );

        let per_domain = join_all(
            groups
                .into_iter()
                .map(|(domain, urls)| self.fetch_domain(domain, urls)),
        )
        .await;

        let mut pages: HashMap<String, FetchedPage> = rejected
            .into_iter()
            .map(|page| (page.requested_url.clone(), page))
            .collect();

        for page in per_domain.into_iter().flatten() {
            if let Some(e) = &page.error {
                debug!(url = %page.requested_url, status = page.status_code, "Fetch failed: {}", e);
            }
            pages.insert(page.requested_url.clone(), page);
        }

        pages
    }
}
