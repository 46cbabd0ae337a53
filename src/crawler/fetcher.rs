//! HTTP fetcher implementation
//!
//! One `reqwest::Client` is built per process and shared by every site crawl
//! and email probe; its connection pool is the only resource they all touch.
//! Every request carries its own timeout.

use crate::config::HttpConfig;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// Page body content
        body: String,
    },

    /// Page is not HTML (Content-Type mismatch)
    ContentMismatch {
        /// The actual Content-Type received
        content_type: String,
    },

    /// Server answered with something other than 200
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, TLS, body read)
    NetworkError {
        /// Error description
        error: String,
        timeout: bool,
    },
}

impl FetchResult {
    /// Short description used in debug logs
    pub fn describe(&self) -> String {
        match self {
            Self::Success { .. } => "ok".to_string(),
            Self::ContentMismatch { content_type } => format!("not HTML ({})", content_type),
            Self::HttpError { status_code } => format!("HTTP {}", status_code),
            Self::NetworkError { error, timeout } if *timeout => format!("timeout: {}", error),
            Self::NetworkError { error, .. } => error.clone(),
        }
    }
}

/// Builds the shared HTTP client
///
/// Redirects are followed (up to 10 hops). Certificate validation is disabled
/// by default because many small seller sites run with expired or self-signed
/// certificates.
///
/// # Example
///
/// ```no_run
/// use backlink_scout::config::HttpConfig;
/// use backlink_scout::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page and keeps it only if it is a 200 HTML response
///
/// # Failure mapping
///
/// | Condition | Result |
/// |-----------|--------|
/// | Status other than 200 | `HttpError` |
/// | Content-Type without `text/html` | `ContentMismatch` |
/// | Timeout | `NetworkError { timeout: true }` |
/// | Connect / TLS / body error | `NetworkError { timeout: false }` |
pub async fn fetch_page(client: &Client, url: &Url, timeout: Duration) -> FetchResult {
    let response = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return network_error(e),
    };

    let status = response.status();
    if status != StatusCode::OK {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
        };
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !content_type.to_ascii_lowercase().contains("text/html") {
        return FetchResult::ContentMismatch { content_type };
    }

    let final_url = response.url().clone();
    match response.text().await {
        Ok(body) => FetchResult::Success { final_url, body },
        Err(e) => network_error(e),
    }
}

/// Fetches any 200 response body as text, whatever its content type
///
/// Used for email probes, where contact pages are sometimes served with odd
/// content types. Every failure collapses to `None`.
pub async fn fetch_text(client: &Client, url: &Url, timeout: Duration) -> Option<String> {
    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .ok()?;

    if response.status() != StatusCode::OK {
        return None;
    }

    response.text().await.ok()
}

fn network_error(e: reqwest::Error) -> FetchResult {
    FetchResult::NetworkError {
        timeout: e.is_timeout(),
        error: e.to_string(),
    }
}
