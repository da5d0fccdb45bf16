//! Shared network session.
//!
//! One [`reqwest::Client`] is built per run and reused by every stage so
//! connections are pooled. Headers mimic a desktop browser; no cookies or
//! credentials are sent.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::FetchError;

/// Build the shared client from the `[http]` section.
///
/// The client-level timeout is the download timeout; page fetches apply the
/// shorter page timeout per request.
pub fn build_client(http: &HttpConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&http.user_agent).context("invalid http.user_agent")?,
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_str(&http.accept).context("invalid http.accept")?,
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&http.accept_language).context("invalid http.accept_language")?,
    );

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(http.download_timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// GET an HTML page and return its body text.
pub async fn fetch_page(client: &Client, url: &str, timeout: Duration) -> Result<String, FetchError> {
    debug!(url, "fetching page");
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    resp.text().await.map_err(|source| FetchError::Transport {
        url: url.to_string(),
        source,
    })
}
