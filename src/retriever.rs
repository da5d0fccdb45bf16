//! Document retrieval from the storage backend.
//!
//! # Protocol
//!
//! 1. `GET {base}/uc?export=download&id={id}`.
//! 2. Large files get an HTML "virus scan warning" page instead of bytes.
//!    The page embeds a one-time `confirm=` token; the same URL is requested
//!    again with `&confirm={token}` appended. That second response is final.
//! 3. The body must start with `%PDF`. Anything else (an HTML error page, a
//!    quota notice) is rejected so it never reaches the content store.
//!
//! [`Retriever::open`] stops after step 2 with the final response's headers,
//! so a caller can abandon the transfer once it knows the declared filename.
//!
//! Transport errors are not retried here. They are returned to the pipeline,
//! which reports them and moves on to the next reference.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use tracing::debug;

use crate::config::HarvestConfig;
use crate::error::RetrievalError;
use crate::models::RetrievalResult;

/// Leading bytes of every PDF document.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

fn confirm_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"confirm=([A-Za-z0-9_-]+)").ok())
        .as_ref()
}

/// Extract the confirmation token from a warning page.
pub fn confirm_token(body: &str) -> Option<String> {
    confirm_pattern()?
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when `bytes` starts with the PDF signature.
pub fn has_pdf_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_SIGNATURE)
}

pub struct Retriever {
    client: Client,
    base_url: String,
    max_bytes: u64,
}

/// The response that will carry the document, with its body still unread.
///
/// Lets the caller look at the declared filename before paying for the
/// transfer. Dropping it abandons the download.
pub struct PendingDownload {
    identifier: String,
    url: String,
    response: Response,
    confirmed: bool,
    declared_name: Option<String>,
}

impl PendingDownload {
    /// Raw `Content-Disposition` of the response, if any.
    pub fn declared_name(&self) -> Option<&str> {
        self.declared_name.as_deref()
    }
}

impl Retriever {
    pub fn new(client: Client, config: &HarvestConfig) -> Self {
        Self {
            client,
            base_url: config.backend_base().to_string(),
            max_bytes: config.retrieval.max_bytes,
        }
    }

    pub fn download_url(&self, identifier: &str) -> String {
        format!("{}/uc?export=download&id={}", self.base_url, identifier)
    }

    /// Download and validate the document behind `identifier`.
    pub async fn retrieve(&self, identifier: &str) -> Result<RetrievalResult, RetrievalError> {
        let pending = self.open(identifier).await?;
        self.finish(pending).await
    }

    /// Request `identifier`, passing a typed warning page if one comes back,
    /// and stop once the final response's headers have arrived.
    pub async fn open(&self, identifier: &str) -> Result<PendingDownload, RetrievalError> {
        let url = self.download_url(identifier);
        let first = self.get(identifier, &url).await?;
        if is_html(&first) {
            let page = self.read_body(identifier, first).await?;
            return self.confirm(identifier, url, &page).await;
        }
        Ok(PendingDownload {
            identifier: identifier.to_string(),
            url,
            declared_name: disposition(&first),
            response: first,
            confirmed: false,
        })
    }

    /// Read and validate the body of an opened download.
    ///
    /// An untyped first response that turns out to be markup is treated as
    /// a warning page, so the handshake may still happen here.
    pub async fn finish(&self, pending: PendingDownload) -> Result<RetrievalResult, RetrievalError> {
        let PendingDownload {
            identifier,
            url,
            response,
            confirmed,
            mut declared_name,
        } = pending;
        let mut bytes = self.read_body(&identifier, response).await?;

        if !confirmed && looks_like_markup(&bytes) {
            let next = self.confirm(&identifier, url, &bytes).await?;
            declared_name = next.declared_name;
            bytes = self.read_body(&identifier, next.response).await?;
        }

        if !has_pdf_signature(&bytes) {
            return Err(RetrievalError::BadSignature {
                identifier,
                found: bytes.iter().take(PDF_SIGNATURE.len()).copied().collect(),
            });
        }

        debug!(identifier = %identifier, size = bytes.len(), "download validated");
        Ok(RetrievalResult {
            bytes,
            declared_name,
        })
    }

    /// Repeat the request with the token found on a warning page.
    async fn confirm(
        &self,
        identifier: &str,
        url: String,
        page: &[u8],
    ) -> Result<PendingDownload, RetrievalError> {
        let token = confirm_token(&String::from_utf8_lossy(page)).ok_or_else(|| {
            RetrievalError::NoConfirmToken {
                identifier: identifier.to_string(),
            }
        })?;
        debug!(identifier, "confirming download past warning page");
        let confirmed = self
            .get(identifier, &format!("{}&confirm={}", url, token))
            .await?;
        if is_html(&confirmed) {
            return Err(RetrievalError::NotBinary {
                identifier: identifier.to_string(),
            });
        }
        Ok(PendingDownload {
            identifier: identifier.to_string(),
            url,
            declared_name: disposition(&confirmed),
            response: confirmed,
            confirmed: true,
        })
    }

    async fn get(&self, identifier: &str, url: &str) -> Result<Response, RetrievalError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| RetrievalError::Transport {
                identifier: identifier.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                identifier: identifier.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    async fn read_body(
        &self,
        identifier: &str,
        mut resp: Response,
    ) -> Result<Vec<u8>, RetrievalError> {
        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(RetrievalError::TooLarge {
                identifier: identifier.to_string(),
                limit: self.max_bytes,
            });
        }

        let mut buf = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|source| RetrievalError::Transport {
                identifier: identifier.to_string(),
                source,
            })?
        {
            if buf.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(RetrievalError::TooLarge {
                    identifier: identifier.to_string(),
                    limit: self.max_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

fn disposition(resp: &Response) -> Option<String> {
    resp.headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Body begins with `<` after leading whitespace, i.e. an untyped HTML page.
fn looks_like_markup(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

fn is_html(resp: &Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
}
