//! Reference extraction.
//!
//! Turns one HTML page into an ordered, deduplicated list of
//! [`DocumentReference`]s. Anchors are scanned structurally first; only when
//! that finds nothing is the raw page source searched for literal storage
//! URLs.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::HarvestConfig;
use crate::error::FetchError;
use crate::http::fetch_page;
use crate::identifier::{extract_identifier, is_storage_url};
use crate::links::{scan_raw_identifiers, HtmlLinkFinder, LinkFinder};
use crate::models::DocumentReference;

/// Options that shape extraction of a single page.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Stable case-insensitive sort by context text after dedup.
    pub sort_by_label: bool,
    /// Host of the configured backend, accepted as a storage host.
    pub backend_host: Option<String>,
}

/// A fetched page together with the references found on it.
///
/// The source is kept because module inference looks at the text around
/// each identifier.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub url: String,
    pub source: String,
    pub references: Vec<DocumentReference>,
}

pub struct ReferenceExtractor {
    client: Client,
    finder: Box<dyn LinkFinder>,
    page_timeout: Duration,
    options: ExtractOptions,
}

impl ReferenceExtractor {
    pub fn new(client: Client, config: &HarvestConfig) -> Self {
        let backend_host = Url::parse(config.backend_base())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        Self {
            client,
            finder: Box::new(HtmlLinkFinder),
            page_timeout: Duration::from_secs(config.http.page_timeout_secs),
            options: ExtractOptions {
                sort_by_label: config.discovery.sort_by_label,
                backend_host,
            },
        }
    }

    /// Fetch `page_url` and return its references.
    pub async fn extract_references(
        &self,
        page_url: &str,
    ) -> Result<Vec<DocumentReference>, FetchError> {
        Ok(self.fetch(page_url).await?.references)
    }

    /// Fetch `page_url`, keeping the page source alongside its references.
    pub async fn fetch(&self, page_url: &str) -> Result<ExtractedPage, FetchError> {
        let source = fetch_page(&self.client, page_url, self.page_timeout).await?;
        let references =
            references_from_html(page_url, &source, self.finder.as_ref(), &self.options);
        debug!(page_url, count = references.len(), "extracted references");
        Ok(ExtractedPage {
            url: page_url.to_string(),
            source,
            references,
        })
    }
}

/// Extract references from already-fetched HTML.
pub fn references_from_html(
    page_url: &str,
    html: &str,
    finder: &dyn LinkFinder,
    options: &ExtractOptions,
) -> Vec<DocumentReference> {
    let mut seen = HashSet::new();
    let mut found: Vec<(String, String)> = Vec::new();

    for link in finder.find_links(html) {
        if !is_storage_url(&link.href, options.backend_host.as_deref()) {
            continue;
        }
        let Some(id) = extract_identifier(&link.href) else {
            debug!(href = %link.href, "no identifier in storage link");
            continue;
        };
        if seen.insert(id.clone()) {
            found.push((id, link.text));
        }
    }

    if found.is_empty() {
        for id in scan_raw_identifiers(html) {
            if seen.insert(id.clone()) {
                found.push((id, String::new()));
            }
        }
    }

    if options.sort_by_label {
        found.sort_by_key(|(_, text)| text.to_lowercase());
    }

    found
        .into_iter()
        .enumerate()
        .map(|(i, (identifier, context_text))| DocumentReference {
            identifier,
            context_text,
            source_page_url: page_url.to_string(),
            position: i + 1,
        })
        .collect()
}
