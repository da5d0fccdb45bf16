//! Core data models used throughout the harvester.
//!
//! These types represent the references, names, downloads, and stored files
//! that flow through the discovery and retrieval pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Extension every resolved filename ends with.
pub const DOCUMENT_EXTENSION: &str = ".pdf";

/// A discovered pointer to one remote document plus its textual context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    /// Backend handle, e.g. the Drive file id.
    pub identifier: String,
    /// Link or button text associated with the reference. May be empty.
    pub context_text: String,
    pub source_page_url: String,
    /// 1-based order of first encounter on the page.
    pub position: usize,
}

/// Which naming tier produced a [`ResolvedName`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameStrategy {
    ServerDisposition,
    RemoteMetadata,
    ModuleInference,
    LinkText,
    Sequential,
}

impl fmt::Display for NameStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NameStrategy::ServerDisposition => "server-disposition",
            NameStrategy::RemoteMetadata => "remote-metadata",
            NameStrategy::ModuleInference => "module-inference",
            NameStrategy::LinkText => "link-text",
            NameStrategy::Sequential => "sequential",
        };
        f.write_str(s)
    }
}

/// A sanitized filename and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub filename: String,
    pub strategy: NameStrategy,
}

/// Module number pulled out of context text ("Module 3", "Mod-IV").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleTag {
    pub number: u32,
}

impl ModuleTag {
    pub fn filename(&self) -> String {
        format!("Module_{:02}{}", self.number, DOCUMENT_EXTENSION)
    }
}

/// Bytes handed back by the backend after a successful, validated download.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub bytes: Vec<u8>,
    /// Raw `Content-Disposition` header of the final response, if any.
    pub declared_name: Option<String>,
}

/// A file committed to the content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// A subject page linked from an index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Display name, already safe to use as a directory name.
    pub name: String,
    pub url: String,
}

/// Counts reported at the end of every run, including partial failures.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub subjects: u64,
    pub discovered: u64,
    pub downloaded: u64,
    /// Skipped because the guessed name was already on disk.
    pub already_present: u64,
    /// Skipped after the download's own filename turned out to be on disk.
    /// The body is never stored and, unless the warning page came back
    /// untyped, never read.
    pub verified_present: u64,
    pub renamed: u64,
    pub hyperlinks_stripped: u64,
    pub failed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn start() -> Self {
        Self {
            subjects: 0,
            discovered: 0,
            downloaded: 0,
            already_present: 0,
            verified_present: 0,
            renamed: 0,
            hyperlinks_stripped: 0,
            failed: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Fold another summary's counts into this one.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.subjects += other.subjects;
        self.discovered += other.discovered;
        self.downloaded += other.downloaded;
        self.already_present += other.already_present;
        self.verified_present += other.verified_present;
        self.renamed += other.renamed;
        self.hyperlinks_stripped += other.hyperlinks_stripped;
        self.failed += other.failed;
    }
}
