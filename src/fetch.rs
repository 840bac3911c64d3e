// src/fetch.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// A fetched document. Non-success statuses are returned, not raised, so the
/// caller decides whether they are fatal.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`. Errors only on transport failure.
    async fn fetch(&self, url: &Url) -> Result<Page>;
}

/// `reqwest`-backed fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client with the identifying User-Agent Wikipedia asks scrapers to send.
    pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
        Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building HTTP client")
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page> {
        debug!("Fetching text from {}", url);
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body from {}", url))?;
        Ok(Page { status, body })
    }
}

/// Fetch the page the record table lives on. Anything but a success is fatal.
#[instrument(level = "info", skip(fetcher), fields(url = %url))]
pub async fn fetch_source<F: Fetcher + ?Sized>(fetcher: &F, url: &Url) -> Result<String> {
    let page = fetcher
        .fetch(url)
        .await
        .with_context(|| format!("fetching source page {}", url))?;
    if !page.is_success() {
        anyhow::bail!("Non-success status {} for {}", page.status, url);
    }
    Ok(page.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeFetcher;

    #[tokio::test]
    async fn source_fetch_fails_on_bad_status() {
        let url = Url::parse("https://example.org/list").unwrap();
        let fetcher = FakeFetcher::default().with_page(url.as_str(), 503, "down");
        let err = fetch_source(&fetcher, &url).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn source_fetch_returns_body() {
        let url = Url::parse("https://example.org/list").unwrap();
        let fetcher = FakeFetcher::default().with_page(url.as_str(), 200, "<table></table>");
        assert_eq!(fetch_source(&fetcher, &url).await.unwrap(), "<table></table>");
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let url = Url::parse("https://example.org/missing").unwrap();
        let fetcher = FakeFetcher::default();
        assert!(fetch_source(&fetcher, &url).await.is_err());
    }

    #[test]
    fn page_success_range() {
        assert!(Page { status: 200, body: String::new() }.is_success());
        assert!(!Page { status: 404, body: String::new() }.is_success());
    }
}
