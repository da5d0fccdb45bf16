//! Filename resolution.
//!
//! A reference's name is chosen by a fixed chain of strategies, stopping at
//! the first one that yields a usable name:
//!
//! | Tier | Strategy | Signal |
//! |------|----------|--------|
//! | 1 | [`NameStrategy::ServerDisposition`] | `Content-Disposition` of the download |
//! | 2 | [`NameStrategy::RemoteMetadata`] | title of the backend's view page |
//! | 3 | [`NameStrategy::ModuleInference`] | "Module 3" / "Mod-IV" near the link |
//! | 4 | [`NameStrategy::LinkText`] | the link's own text |
//! | 5 | [`NameStrategy::Sequential`] | position on the page |
//!
//! Every tier's output goes through [`sanitize_filename`]. Apart from the
//! metadata lookup, which fails soft, resolution is pure.

use std::sync::OnceLock;

use regex::Regex;

use crate::links::collapse_whitespace;
use crate::metadata::MetadataLookup;
use crate::models::{DocumentReference, ModuleTag, NameStrategy, ResolvedName, DOCUMENT_EXTENSION};

/// Longest stem (name without extension) a resolved filename may have.
pub const MAX_STEM_CHARS: usize = 150;
/// Link text longer than this is truncated with an ellipsis.
pub const LINK_TEXT_CHARS: usize = 50;

/// Replace reserved characters, collapse whitespace, and ensure exactly one
/// `.pdf` suffix. Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let mut stem = collapse_whitespace(&replaced);
    loop {
        let trimmed = stem.trim_end_matches([' ', '.']).to_string();
        let lower = trimmed.to_ascii_lowercase();
        match lower.strip_suffix(DOCUMENT_EXTENSION) {
            Some(rest) => stem = trimmed[..rest.len()].to_string(),
            None => {
                stem = trimmed;
                break;
            }
        }
    }
    let stem = stem.trim_start_matches([' ', '.']);

    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    let stem = stem.trim_end_matches([' ', '.']);
    if stem.is_empty() || stem.chars().all(|c| c == '_') {
        return None;
    }
    Some(format!("{}{}", stem, DOCUMENT_EXTENSION))
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// `filename*=UTF-8''...` is preferred over a plain `filename=`. Quoted
/// values may contain `;` and backslash-escaped quotes.
pub fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for (key, value) in disposition_params(header) {
        if key == "filename*" {
            // charset'language'percent-encoded
            let encoded = value.splitn(3, '\'').nth(2).unwrap_or(&value);
            let decoded =
                String::from_utf8_lossy(&urlencoding::decode_binary(encoded.as_bytes())).into_owned();
            extended = Some(decoded);
        } else if key == "filename" {
            plain = Some(value);
        }
    }

    extended.or(plain).filter(|s| !s.trim().is_empty())
}

/// `key=value` parameters of a header, keys lowercased, quoted-strings unescaped.
fn disposition_params(header: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = header.chars().peekable();

    while chars.peek().is_some() {
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            continue;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    c => value.push(c),
                }
            }
            // Anything after the closing quote up to the next separator.
            while chars.next_if(|&c| c != ';').is_some() {}
        } else {
            while let Some(c) = chars.next_if(|&c| c != ';') {
                value.push(c);
            }
            value = value.trim().to_string();
        }
        chars.next();
        params.push((key.trim().to_ascii_lowercase(), value));
    }
    params
}

fn module_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(?:modules?|mod|units?|lectures?|lec|chapters?)\s*[:\-.]?\s*(\d{1,3}|viii|vii|iii|ix|iv|vi|ii|x|v|i)\b",
            )
            .ok()
        })
        .as_ref()
}

fn roman_value(s: &str) -> Option<u32> {
    let n = match s.to_ascii_lowercase().as_str() {
        "i" => 1,
        "ii" => 2,
        "iii" => 3,
        "iv" => 4,
        "v" => 5,
        "vi" => 6,
        "vii" => 7,
        "viii" => 8,
        "ix" => 9,
        "x" => 10,
        _ => return None,
    };
    Some(n)
}

fn tag_from_capture(raw: &str) -> Option<ModuleTag> {
    let number = match raw.parse::<u32>() {
        Ok(n) => n,
        Err(_) => roman_value(raw)?,
    };
    Some(ModuleTag { number })
}

/// First module tag in `text`.
pub fn find_module_tag(text: &str) -> Option<ModuleTag> {
    let caps = module_pattern()?.captures(text)?;
    tag_from_capture(caps.get(1)?.as_str())
}

/// Module tag closest to the end of `text`.
fn last_module_tag(text: &str) -> Option<ModuleTag> {
    module_pattern()?
        .captures_iter(text)
        .filter_map(|caps| tag_from_capture(caps.get(1)?.as_str()))
        .last()
}

fn tag_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").ok()).as_ref()
}

/// Up to `window` characters of page text preceding the first occurrence of
/// `identifier` in `source`, with markup removed.
pub fn text_before(source: &str, identifier: &str, window: usize) -> Option<String> {
    let idx = source.find(identifier)?;
    let head = &source[..idx];
    let start = head
        .char_indices()
        .rev()
        .nth(window.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let slice = &head[start..];
    // A tag cut in half by the window start leaves its tail; drop it.
    let slice = match (slice.find('>'), slice.find('<')) {
        (Some(gt), Some(lt)) if gt < lt => &slice[gt + 1..],
        (Some(gt), None) => &slice[gt + 1..],
        _ => slice,
    };
    // The anchor that holds the identifier is still open at the cut; drop it.
    let slice = match slice.rfind('<') {
        Some(lt) if !slice[lt..].contains('>') => &slice[..lt],
        _ => slice,
    };
    let text = match tag_pattern() {
        Some(re) => re.replace_all(slice, " ").into_owned(),
        None => slice.to_string(),
    };
    Some(collapse_whitespace(&text))
}

fn link_text_name(context: &str) -> Option<String> {
    let text = collapse_whitespace(context);
    if text.chars().count() <= 3 {
        return None;
    }
    let shortened = if text.chars().count() > LINK_TEXT_CHARS {
        let head: String = text.chars().take(LINK_TEXT_CHARS).collect();
        format!("{}\u{2026}", head.trim_end())
    } else {
        text
    };
    sanitize_filename(&shortened)
}

/// Everything the resolver looks at besides the reference itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameContext<'a> {
    /// Source of the page the reference was found on.
    pub page_source: &'a str,
    /// Raw `Content-Disposition` of the download, once known.
    pub disposition: Option<&'a str>,
}

/// Runs the naming chain. Holds the metadata lookup used by tier 2.
pub struct FilenameResolver {
    lookup: Box<dyn MetadataLookup>,
    context_window: usize,
}

impl FilenameResolver {
    pub fn new(lookup: Box<dyn MetadataLookup>, context_window: usize) -> Self {
        Self {
            lookup,
            context_window,
        }
    }

    /// True when resolving may send a metadata request to the backend.
    pub fn uses_network(&self) -> bool {
        self.lookup.is_remote()
    }

    pub async fn resolve(&self, reference: &DocumentReference, ctx: NameContext<'_>) -> ResolvedName {
        if let Some(resolved) = ctx.disposition.and_then(disposition_name) {
            return resolved;
        }

        if let Some(name) = self
            .lookup
            .lookup(&reference.identifier)
            .await
            .and_then(|t| sanitize_filename(&t))
        {
            return ResolvedName {
                filename: name,
                strategy: NameStrategy::RemoteMetadata,
            };
        }

        resolve_offline(reference, ctx.page_source, self.context_window)
    }
}

/// Tier 1 on its own: the name a `Content-Disposition` header declares.
pub fn disposition_name(header: &str) -> Option<ResolvedName> {
    let filename = disposition_filename(header).and_then(|n| sanitize_filename(&n))?;
    Some(ResolvedName {
        filename,
        strategy: NameStrategy::ServerDisposition,
    })
}

/// Tiers 3 to 5, which need no network at all.
pub fn resolve_offline(
    reference: &DocumentReference,
    page_source: &str,
    context_window: usize,
) -> ResolvedName {
    let tag = find_module_tag(&reference.context_text).or_else(|| {
        text_before(page_source, &reference.identifier, context_window)
            .and_then(|t| last_module_tag(&t))
    });
    if let Some(tag) = tag {
        return ResolvedName {
            filename: tag.filename(),
            strategy: NameStrategy::ModuleInference,
        };
    }

    if let Some(name) = link_text_name(&reference.context_text) {
        return ResolvedName {
            filename: name,
            strategy: NameStrategy::LinkText,
        };
    }

    ResolvedName {
        filename: format!("Document_{:02}{}", reference.position, DOCUMENT_EXTENSION),
        strategy: NameStrategy::Sequential,
    }
}
