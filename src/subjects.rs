//! Subject discovery on an index (semester) page.
//!
//! An index page links to one page per subject, usually as Elementor
//! buttons. This is the only level of link following the harvester does.

use std::collections::HashSet;

use url::Url;

use crate::config::DiscoveryConfig;
use crate::links::{Link, LinkFinder};
use crate::models::Subject;
use crate::store::subject_dir_name;

const BUTTON_CLASS: &str = "elementor-button";
const MIN_BUTTON_LABEL: usize = 5;
const MIN_PLAIN_LABEL: usize = 10;

fn is_subject_href(href: &str, markers: &[String]) -> bool {
    !markers.is_empty() && markers.iter().all(|m| href.contains(m.as_str()))
}

fn is_excluded(name: &str, exclude: &[String]) -> bool {
    let upper = name.to_uppercase();
    exclude.iter().any(|w| upper.contains(&w.to_uppercase()))
}

fn resolve_href(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// A subject for a page given directly, named after its last path segment.
pub fn subject_from_url(page_url: &str) -> Subject {
    let segment = Url::parse(page_url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segs| segs.rfind(|s| !s.is_empty()).map(str::to_string))
    });
    Subject {
        name: subject_dir_name(&segment.unwrap_or_default()),
        url: page_url.to_string(),
    }
}

/// Subjects linked from `html`, in page order, without duplicate URLs.
pub fn subjects_from_html(
    index_url: &str,
    html: &str,
    finder: &dyn LinkFinder,
    discovery: &DiscoveryConfig,
) -> Vec<Subject> {
    let base = Url::parse(index_url).ok();
    let links = finder.find_links(html);
    let markers = &discovery.subject_href_markers;

    let buttons = links.iter().filter_map(|link: &Link| {
        if !link.classes.iter().any(|c| c == BUTTON_CLASS) || !is_subject_href(&link.href, markers) {
            return None;
        }
        let name = subject_dir_name(link.label.as_deref()?);
        (name.chars().count() > MIN_BUTTON_LABEL && !is_excluded(&name, &discovery.subject_exclude))
            .then(|| (link.href.as_str(), name))
    });
    let mut candidates: Vec<(&str, String)> = buttons.collect();

    if candidates.is_empty() {
        candidates = links
            .iter()
            .filter(|l| is_subject_href(&l.href, markers) && l.text.chars().count() > MIN_PLAIN_LABEL)
            .map(|l| (l.href.as_str(), subject_dir_name(&l.text)))
            .collect();
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|(href, name)| Subject {
            name,
            url: resolve_href(base.as_ref(), href),
        })
        .filter(|s| seen.insert(s.url.clone()))
        .collect()
}
