//! Fetcher contract and the plain-HTTP implementation.
//!
//! The page-automation layer is a black box to the scheduler: it takes a
//! job and yields a [`PageResponse`]. Fetch-level failures are carried in
//! the response rather than returned as errors so the retry policy stays
//! with the caller. Response bodies are dropped as soon as `process`
//! returns to bound memory.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use crate::domains::gmaps::CrawlJob;

/// What a fetch produced. `meta` carries structured data the automation
/// layer extracted from the page (e.g. the place payload); plain HTTP
/// fetchers leave it empty.
#[derive(Debug, Clone, Default)]
pub struct PageResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub meta: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl PageResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, job: &CrawlJob) -> PageResponse;
}

/// Plain reqwest-based fetcher with browser-like headers.
pub struct HttpFetcher {
    client: reqwest::Client,
}

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .unwrap(),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().unwrap(),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to create fetch HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, job: &CrawlJob) -> PageResponse {
        let raw_url = job.url();
        if raw_url.is_empty() {
            // Service-call variants (bodacc) have nothing to fetch.
            return PageResponse::empty();
        }

        let mut url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(err) => return PageResponse::failed(raw_url, err.to_string()),
        };
        for (key, value) in job.url_params() {
            url.query_pairs_mut().append_pair(key, value);
        }

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => return PageResponse::failed(url.as_str(), err.to_string()),
        };

        let status = response.status();
        let final_url = response.url().to_string();

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return PageResponse::failed(&final_url, err.to_string()),
        };

        let error = if status.is_success() {
            None
        } else {
            Some(format!("unexpected status {status}"))
        };

        PageResponse {
            url: final_url,
            status: status.as_u16(),
            body,
            meta: None,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::gmaps::{BodaccJob, Entry};

    #[tokio::test]
    async fn empty_url_skips_fetch() {
        let fetcher = HttpFetcher::new().unwrap();
        let job = CrawlJob::Bodacc(BodaccJob::new(
            None,
            "Cafe",
            "1 Rue",
            "u",
            "",
            Entry::default(),
        ));

        let resp = fetcher.fetch(&job).await;
        assert!(resp.is_ok());
        assert!(resp.body.is_empty());
    }

    #[test]
    fn failed_response_carries_error() {
        let resp = PageResponse::failed("https://x", "boom");
        assert!(!resp.is_ok());
        assert_eq!(resp.error.as_deref(), Some("boom"));
    }
}
