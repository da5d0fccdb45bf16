//! Error types for the discovery and retrieval engine.
//!
//! Each engine stage has its own error enum so callers can tell a page that
//! could not be fetched apart from a download that failed validation or a
//! rename that ran out of suffixes. Command-level code wraps these in
//! [`anyhow::Error`].

use std::path::PathBuf;

use thiserror::Error;

/// A page (index page, subject page) could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// The storage backend did not hand back a valid document.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("download of {identifier} failed: {source}")]
    Transport {
        identifier: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {identifier} returned HTTP {status}")]
    Status { identifier: String, status: u16 },

    #[error("warning page for {identifier} carried no confirmation token")]
    NoConfirmToken { identifier: String },

    #[error("backend returned an HTML page instead of a file for {identifier}")]
    NotBinary { identifier: String },

    #[error("content for {identifier} is not a PDF (leading bytes {found:?})")]
    BadSignature { identifier: String, found: Vec<u8> },

    #[error("content for {identifier} exceeds the {limit} byte limit")]
    TooLarge { identifier: String, limit: u64 },
}

/// Writing, renaming, or rewriting a file in the content store failed.
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free name left for {}", path.display())]
    SuffixExhausted { path: PathBuf },

    #[error("cannot rewrite PDF {}: {reason}", path.display())]
    Pdf { path: PathBuf, reason: String },
}

impl FilesystemError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FilesystemError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a single reference was skipped during a harvest.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}
