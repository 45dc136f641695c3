//! Async HTTP client wrapping reqwest.
//!
//! Not a browser: plain GET requests with a browser-like identity, a per-request
//! timeout and a shared connection pool. Retry policy belongs to the callers:
//! every call here is exactly one request.

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use std::time::Duration;

/// User agent presented to the viewer CDN.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/131.0.0.0 Safari/537.36";

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client shared by the manifest resolver and the downloader.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the browser user agent and the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform a single GET request.
    ///
    /// Non-success statuses are returned as responses, not errors; only
    /// transport failures (connect, timeout, body read) produce `Err`.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.send(url, self.client.get(url)).await
    }

    /// Like [`HttpClient::get`], advertising image content types.
    pub async fn get_image(&self, url: &str) -> Result<HttpResponse> {
        self.send(url, self.client.get(url).header(ACCEPT, IMAGE_ACCEPT))
            .await
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<HttpResponse> {
        let r = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let body = r
            .bytes()
            .await
            .with_context(|| format!("failed to read body from {url}"))?
            .to_vec();

        Ok(HttpResponse {
            final_url,
            status,
            body,
        })
    }
}
