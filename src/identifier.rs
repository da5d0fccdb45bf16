//! Storage identifier extraction.
//!
//! Drive links come in several shapes; each one embeds the same opaque file
//! id. Matchers are tried in order and the first hit wins. A URL that
//! matches none of them is skipped by the caller rather than treated as an
//! error.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

fn matchers() -> &'static [Regex] {
    static MATCHERS: OnceLock<Vec<Regex>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        [
            r"/file/d/([A-Za-z0-9_-]+)",
            r"/d/([A-Za-z0-9_-]+)(?:/|$|\?|#)",
            r"/folders/([A-Za-z0-9_-]+)",
            r"[?&]id=([A-Za-z0-9_-]+)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Return the storage identifier embedded in `url`, or `None` when no
/// known shape matches.
pub fn extract_identifier(url: &str) -> Option<String> {
    matchers()
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when `url` is hosted by a storage backend: a `drive.*` or
/// `docs.google.*` host, or the configured backend host itself.
pub fn is_storage_url(url: &str, backend_host: Option<&str>) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    if backend_host.is_some_and(|b| b.eq_ignore_ascii_case(&host)) {
        return true;
    }
    host.starts_with("drive.") || host.starts_with("docs.google.")
}
