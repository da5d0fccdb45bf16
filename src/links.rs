//! Link discovery in HTML documents.
//!
//! Structural scanning goes through the [`LinkFinder`] trait so the HTML
//! parser can be swapped out; [`HtmlLinkFinder`] is backed by `scraper`.
//! [`scan_raw_identifiers`] is the secondary path for pages whose links are
//! generated by client-side script and only appear as literal text.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// An anchor found in a document: its `href` and its visible text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
    /// `class` attribute, split on whitespace.
    pub classes: Vec<String>,
    /// Text of a `span.elementor-button-text` child, when present.
    pub label: Option<String>,
}

/// Capability for enumerating the links of an HTML document.
pub trait LinkFinder: Send + Sync {
    fn find_links(&self, html: &str) -> Vec<Link>;
}

/// [`LinkFinder`] backed by the `scraper` HTML parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlLinkFinder;

impl LinkFinder for HtmlLinkFinder {
    fn find_links(&self, html: &str) -> Vec<Link> {
        let document = Html::parse_document(html);
        let (Ok(anchors), Ok(label_sel)) = (
            Selector::parse("a[href]"),
            Selector::parse("span.elementor-button-text"),
        ) else {
            return Vec::new();
        };

        document
            .select(&anchors)
            .filter_map(|a| {
                let href = a.value().attr("href")?.trim().to_string();
                if href.is_empty() {
                    return None;
                }
                let label = a.select(&label_sel).next().map(element_text);
                Some(Link {
                    href,
                    text: element_text(a),
                    classes: a.value().classes().map(str::to_string).collect(),
                    label,
                })
            })
            .collect()
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn raw_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?:drive|docs)\.[A-Za-z0-9.-]+/file/d/([A-Za-z0-9_-]+)",
            r"(?:drive|docs)\.[A-Za-z0-9.-]+/open\?id=([A-Za-z0-9_-]+)",
            r#"(?:drive|docs)\.[A-Za-z0-9.-]+/uc\?[^"'<>\s]*?id=([A-Za-z0-9_-]+)"#,
            r"(?:drive|docs)\.[A-Za-z0-9.-]+/drive/folders/([A-Za-z0-9_-]+)",
            r"/d/([A-Za-z0-9_-]+)/view",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Every storage identifier that appears as literal text in `source`,
/// in order of first appearance, without duplicates.
pub fn scan_raw_identifiers(source: &str) -> Vec<String> {
    let mut hits: Vec<(usize, String)> = raw_patterns()
        .iter()
        .flat_map(|re| {
            re.captures_iter(source).filter_map(|caps| {
                let m = caps.get(1)?;
                Some((m.start(), m.as_str().to_string()))
            })
        })
        .collect();
    hits.sort_by_key(|(start, _)| *start);

    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .filter_map(|(_, id)| seen.insert(id.clone()).then_some(id))
        .collect()
}
