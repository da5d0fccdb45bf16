//! Post-processing passes over files already in the content store.
//!
//! Both passes are idempotent and operate purely on filesystem state:
//!
//! - **branding strip** removes a fixed catalogue of vendor suffixes from a
//!   filename and renames the file in place (never overwriting);
//! - **hyperlink strip** deletes every link annotation from every page and
//!   atomically replaces the file. Files without links are not touched.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};
use regex::{Regex, RegexBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::FilesystemError;
use crate::store::{first_free, temp_sibling};

/// Vendor branding removed from filenames, applied in order.
pub const BRANDING_CATALOGUE: &[&str] = &[
    r" ?-Ktunotes\.in",
    r" - Ktunotes\.in",
    r"_Ktunotes\.in",
    r" - KTUnotes",
    r" ?-ktunotes",
];

/// Which passes to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    pub strip_branding: bool,
    pub strip_hyperlinks: bool,
}

impl ProcessOptions {
    pub fn any(&self) -> bool {
        self.strip_branding || self.strip_hyperlinks
    }
}

/// What the passes did to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Where the file lives now.
    pub path: PathBuf,
    pub renamed: bool,
    /// Link annotations removed.
    pub links_removed: usize,
}

/// Compiled branding catalogue plus any operator-supplied patterns.
#[derive(Debug, Clone)]
pub struct BrandingFilter {
    patterns: Vec<Regex>,
}

impl BrandingFilter {
    pub fn new(extra: &[String]) -> Result<Self, regex::Error> {
        let patterns = BRANDING_CATALOGUE
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str))
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// `filename` with every branding pattern removed and whitespace tidied.
    ///
    /// Removing one match can join the pieces of another, so the catalogue is
    /// reapplied until the name stops changing.
    pub fn strip(&self, filename: &str) -> String {
        let mut name = filename.to_string();
        loop {
            let next = self.strip_once(&name);
            if next == name {
                return name;
            }
            name = next;
        }
    }

    fn strip_once(&self, filename: &str) -> String {
        let mut name = filename.to_string();
        for re in &self.patterns {
            name = re.replace_all(&name, "").into_owned();
        }
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        // "Notes .pdf" -> "Notes.pdf"
        match name.rfind('.') {
            Some(i) if i > 0 => format!("{}{}", name[..i].trim_end(), &name[i..]),
            _ => name,
        }
    }

    /// Rename `path` to its stripped name. Returns the file's path afterwards.
    pub fn rename(&self, path: &Path) -> Result<PathBuf, FilesystemError> {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(path.to_path_buf());
        };
        let stripped = self.strip(&name);
        if stripped == name || stripped.is_empty() {
            return Ok(path.to_path_buf());
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let free = first_free(dir, &stripped, |c| dir.join(c).exists())?;
        let target = dir.join(free);
        fs::rename(path, &target).map_err(|e| FilesystemError::io(path, e))?;
        debug!(from = %path.display(), to = %target.display(), "renamed");
        Ok(target)
    }
}

/// True for link annotations (`/Subtype /Link`).
fn is_link_annotation(doc: &Document, annot: &Object) -> bool {
    let dict = match annot {
        Object::Reference(id) => match doc.get_object(*id).and_then(Object::as_dict) {
            Ok(d) => d,
            Err(_) => return false,
        },
        Object::Dictionary(d) => d,
        _ => return false,
    };
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|name| name == b"Link")
}

/// Where a page keeps its annotation array.
enum AnnotsSlot {
    Inline(Vec<Object>),
    Indirect(ObjectId, Vec<Object>),
}

fn annots_of(doc: &Document, page_id: ObjectId) -> Option<AnnotsSlot> {
    let page = doc.get_object(page_id).and_then(Object::as_dict).ok()?;
    match page.get(b"Annots").ok()? {
        Object::Array(items) => Some(AnnotsSlot::Inline(items.clone())),
        Object::Reference(id) => {
            let items = doc.get_object(*id).and_then(Object::as_array).ok()?;
            Some(AnnotsSlot::Indirect(*id, items.clone()))
        }
        _ => None,
    }
}

/// Remove every link annotation from the document in memory.
/// Returns how many were removed.
pub fn remove_link_annotations(doc: &mut Document) -> usize {
    let mut removed = 0;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for page_id in page_ids {
        let Some(slot) = annots_of(doc, page_id) else {
            continue;
        };
        let (items, indirect) = match slot {
            AnnotsSlot::Inline(items) => (items, None),
            AnnotsSlot::Indirect(id, items) => (items, Some(id)),
        };
        let before = items.len();
        let kept: Vec<Object> = items
            .into_iter()
            .filter(|a| !is_link_annotation(doc, a))
            .collect();
        if kept.len() == before {
            continue;
        }
        removed += before - kept.len();

        match indirect {
            Some(array_id) => {
                doc.objects.insert(array_id, Object::Array(kept));
            }
            None => {
                if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
                    if kept.is_empty() {
                        page.remove(b"Annots");
                    } else {
                        page.set("Annots", Object::Array(kept));
                    }
                }
            }
        }
    }

    if removed > 0 {
        doc.prune_objects();
    }
    removed
}

/// Strip hyperlinks from the PDF at `path`, replacing it atomically.
/// A file with no links is left exactly as it was.
pub fn strip_hyperlinks(path: &Path) -> Result<usize, FilesystemError> {
    let mut doc = Document::load(path).map_err(|e| FilesystemError::Pdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let removed = remove_link_annotations(&mut doc);
    if removed == 0 {
        return Ok(0);
    }

    let tmp = temp_sibling(path);
    if let Err(e) = doc.save(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(FilesystemError::Pdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        });
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(FilesystemError::io(path, e));
    }
    debug!(path = %path.display(), removed, "hyperlinks stripped");
    Ok(removed)
}

/// Run the selected passes on one file: rename first, then strip links.
pub fn postprocess(
    path: &Path,
    options: ProcessOptions,
    branding: &BrandingFilter,
) -> Result<ProcessOutcome, FilesystemError> {
    let mut current = path.to_path_buf();
    let mut renamed = false;
    if options.strip_branding {
        let next = branding.rename(&current)?;
        renamed = next != current;
        current = next;
    }

    let links_removed = if options.strip_hyperlinks {
        strip_hyperlinks(&current)?
    } else {
        0
    };

    Ok(ProcessOutcome {
        path: current,
        renamed,
        links_removed,
    })
}

/// Every `*.pdf` file in `dir` (and below it when `recursive`), sorted.
pub fn pdf_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, FilesystemError> {
    let walker = WalkDir::new(dir).min_depth(1).max_depth(if recursive { usize::MAX } else { 1 });
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            FilesystemError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_pdf = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
