//! TOML configuration parsing.
//!
//! Every section is optional; a file containing only `[output]` is valid.
//! Values are passed explicitly into the engine constructors so nothing
//! reads process-wide state.
//!
//! ```toml
//! [backend]
//! base_url = "https://drive.google.com"
//!
//! [pacing]
//! download_interval_ms = 1500
//! subject_interval_ms = 2000
//!
//! [processing]
//! strip_branding = true
//! extra_branding_patterns = [" - MyNotesSite"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HarvestConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept")]
    pub accept: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            page_timeout_secs: default_page_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8".to_string()
}
fn default_accept_language() -> String {
    "en-US,en;q=0.5".to_string()
}
fn default_page_timeout_secs() -> u64 {
    15
}
fn default_download_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Base URL of the storage backend, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "https://drive.google.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Stable case-insensitive sort of references by their link text.
    #[serde(default)]
    pub sort_by_label: bool,
    /// Characters of page text inspected before an identifier for a module number.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Substrings a subject link's href must all contain.
    #[serde(default = "default_subject_href_markers")]
    pub subject_href_markers: Vec<String>,
    /// Button labels containing any of these (case-insensitive) are not subjects.
    #[serde(default = "default_subject_exclude")]
    pub subject_exclude: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            sort_by_label: false,
            context_window: default_context_window(),
            subject_href_markers: default_subject_href_markers(),
            subject_exclude: default_subject_exclude(),
        }
    }
}

fn default_context_window() -> usize {
    300
}
fn default_subject_href_markers() -> Vec<String> {
    vec!["/ktu-".to_string(), "-notes-".to_string()]
}
fn default_subject_exclude() -> Vec<String> {
    vec![
        "CURRICULUM".to_string(),
        "SYLLABUS".to_string(),
        "QUESTION".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    #[serde(default = "default_download_interval_ms")]
    pub download_interval_ms: u64,
    #[serde(default = "default_subject_interval_ms")]
    pub subject_interval_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            download_interval_ms: default_download_interval_ms(),
            subject_interval_ms: default_subject_interval_ms(),
        }
    }
}

fn default_download_interval_ms() -> u64 {
    1500
}
fn default_subject_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Largest body accepted from the backend, in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_max_bytes() -> u64 {
    512 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("KTU_Notes")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_true")]
    pub strip_branding: bool,
    #[serde(default)]
    pub strip_hyperlinks: bool,
    /// Extra case-insensitive regex patterns removed from filenames.
    #[serde(default)]
    pub extra_branding_patterns: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            strip_branding: true,
            strip_hyperlinks: false,
            extra_branding_patterns: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl HarvestConfig {
    /// Built-in defaults, used when no config file exists at the default path.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Backend base URL with any trailing slash removed.
    pub fn backend_base(&self) -> &str {
        self.backend.base_url.trim_end_matches('/')
    }
}

pub fn load_config(path: &Path) -> Result<HarvestConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: HarvestConfig =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists; otherwise fall back to [`HarvestConfig::minimal`]
/// unless the caller insisted on that exact file.
pub fn load_or_default(path: &Path, explicit: bool) -> Result<HarvestConfig> {
    if !explicit && !path.exists() {
        return Ok(HarvestConfig::minimal());
    }
    load_config(path)
}

fn validate(config: &HarvestConfig) -> Result<()> {
    if config.http.page_timeout_secs == 0 || config.http.download_timeout_secs == 0 {
        anyhow::bail!("http timeouts must be > 0");
    }

    let base = &config.backend.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!("backend.base_url must be an http(s) URL, got '{}'", base);
    }

    if config.retrieval.max_bytes < 4 {
        anyhow::bail!("retrieval.max_bytes must be >= 4");
    }

    if config.discovery.context_window == 0 {
        anyhow::bail!("discovery.context_window must be > 0");
    }

    for pattern in &config.processing.extra_branding_patterns {
        regex::Regex::new(pattern).with_context(|| {
            format!("processing.extra_branding_patterns: invalid pattern '{}'", pattern)
        })?;
    }

    Ok(())
}

/// Write [`TEMPLATE`] to `path`, creating parent directories. Refuses to
/// replace an existing file.
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config file already exists: {}", path.display());
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, TEMPLATE)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Commented starter file written by `harvest init`.
pub const TEMPLATE: &str = r#"# study-harvest configuration

[http]
# user_agent = "Mozilla/5.0 ..."
page_timeout_secs = 15
download_timeout_secs = 30

[backend]
base_url = "https://drive.google.com"

[discovery]
sort_by_label = false
context_window = 300
subject_href_markers = ["/ktu-", "-notes-"]
subject_exclude = ["CURRICULUM", "SYLLABUS", "QUESTION"]

[pacing]
download_interval_ms = 1500
subject_interval_ms = 2000

[retrieval]
max_bytes = 536870912

[output]
download_dir = "KTU_Notes"

[processing]
strip_branding = true
strip_hyperlinks = false
extra_branding_patterns = []
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: HarvestConfig = toml::from_str("").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.pacing.download_interval_ms, 1500);
        assert_eq!(cfg.backend_base(), "https://drive.google.com");
        assert!(cfg.processing.strip_branding);
        assert!(!cfg.processing.strip_hyperlinks);
    }

    #[test]
    fn template_parses_and_validates() {
        let cfg: HarvestConfig = toml::from_str(TEMPLATE).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.discovery.subject_exclude.len(), 3);
    }

    #[test]
    fn rejects_bad_base_url() {
        let cfg: HarvestConfig = toml::from_str("[backend]\nbase_url = \"ftp://x\"").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_invalid_branding_pattern() {
        let cfg: HarvestConfig =
            toml::from_str("[processing]\nextra_branding_patterns = [\"(\"]").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn trailing_slash_trimmed() {
        let cfg: HarvestConfig =
            toml::from_str("[backend]\nbase_url = \"http://127.0.0.1:9/\"").unwrap();
        assert_eq!(cfg.backend_base(), "http://127.0.0.1:9");
    }

    #[test]
    fn missing_default_path_falls_back() {
        let cfg = load_or_default(Path::new("/definitely/not/here.toml"), false).unwrap();
        assert_eq!(cfg.output.download_dir, PathBuf::from("KTU_Notes"));
        assert!(load_or_default(Path::new("/definitely/not/here.toml"), true).is_err());
    }
}
