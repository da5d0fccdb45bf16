//! Secondary metadata lookup against the backend's human-facing view page.
//!
//! Used by the second naming tier. Every failure here is soft: the lookup
//! returns `None` and the resolver moves on to the next strategy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use crate::http::fetch_page;

/// Suffix the backend appends to every view-page title.
pub const TITLE_SUFFIX: &str = " - Google Drive";

/// Source of a human-readable title for a stored document.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Title for `identifier`, or `None` if none could be determined.
    async fn lookup(&self, identifier: &str) -> Option<String>;

    /// Whether [`lookup`](Self::lookup) sends a request to the backend.
    fn is_remote(&self) -> bool {
        true
    }
}

/// Lookup that never finds anything. Skips the network entirely.
pub struct NoLookup;

#[async_trait]
impl MetadataLookup for NoLookup {
    async fn lookup(&self, _identifier: &str) -> Option<String> {
        None
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// Reads `{base}/file/d/{id}/view` and parses its title.
pub struct DriveViewLookup {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DriveViewLookup {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl MetadataLookup for DriveViewLookup {
    async fn lookup(&self, identifier: &str) -> Option<String> {
        let url = format!("{}/file/d/{}/view", self.base_url, identifier);
        match fetch_page(&self.client, &url, self.timeout).await {
            Ok(html) => title_from_view_page(&html),
            Err(e) => {
                debug!(identifier, error = %e, "metadata lookup failed");
                None
            }
        }
    }
}

/// Pull a document title out of a view page: `<title>` without the service
/// suffix, else the `og:title` meta tag.
pub fn title_from_view_page(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let from_title = Selector::parse("title").ok().and_then(|sel| {
        document
            .select(&sel)
            .next()
            .map(|t| t.text().collect::<String>())
            .and_then(|t| usable_title(&t))
    });
    if from_title.is_some() {
        return from_title;
    }

    Selector::parse(r#"meta[property="og:title"]"#)
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .filter_map(|m| m.value().attr("content"))
                .find_map(usable_title)
        })
}

fn usable_title(raw: &str) -> Option<String> {
    let title = raw.trim();
    let title = title.strip_suffix(TITLE_SUFFIX).unwrap_or(title).trim();
    let service = TITLE_SUFFIX.trim_start_matches(" - ");
    let lower = title.to_ascii_lowercase();
    if title.is_empty()
        || title.eq_ignore_ascii_case(service)
        || lower.contains("sign-in")
        || lower.contains("sign in")
    {
        return None;
    }
    Some(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_suffix_is_stripped() {
        let html = "<html><head><title>CS301 Module 1 -Ktunotes.in.pdf - Google Drive</title></head></html>";
        assert_eq!(
            title_from_view_page(html).as_deref(),
            Some("CS301 Module 1 -Ktunotes.in.pdf")
        );
    }

    #[test]
    fn og_title_used_when_title_is_generic() {
        let html = r#"<html><head><title>Google Drive</title>
            <meta property="og:title" content="Graph Theory.pdf"></head></html>"#;
        assert_eq!(title_from_view_page(html).as_deref(), Some("Graph Theory.pdf"));
    }

    #[test]
    fn sign_in_pages_are_rejected() {
        let html = "<html><head><title>Google Drive: Sign-in</title></head></html>";
        assert_eq!(title_from_view_page(html), None);
        assert_eq!(title_from_view_page("<html></html>"), None);
    }
}
