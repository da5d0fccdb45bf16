//! Harvest orchestration.
//!
//! Coordinates the full flow for each subject page: fetch → extract
//! references → name → retrieve → commit → post-process. Failures are
//! reported per reference and never abort the batch; a [`RunSummary`] is
//! always returned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use crate::config::{DiscoveryConfig, HarvestConfig};
use crate::error::{FetchError, FilesystemError, HarvestError};
use crate::extractor::ReferenceExtractor;
use crate::http::{build_client, fetch_page};
use crate::links::HtmlLinkFinder;
use crate::metadata::{DriveViewLookup, MetadataLookup};
use crate::models::{DocumentReference, RunSummary, Subject};
use crate::naming::{disposition_name, FilenameResolver, NameContext};
use crate::pacing::Pacer;
use crate::postprocess::{pdf_files, postprocess, BrandingFilter, ProcessOptions, ProcessOutcome};
use crate::progress::{HarvestEvent, ProgressReporter};
use crate::retriever::Retriever;
use crate::store::ContentStore;
use crate::subjects::subjects_from_html;

/// One harvest run. Owns the network session, the content store, and the
/// pacing state, so it is used sequentially through `&mut self`.
pub struct Harvester {
    client: Client,
    page_timeout: Duration,
    discovery: DiscoveryConfig,
    extractor: ReferenceExtractor,
    resolver: FilenameResolver,
    retriever: Retriever,
    store: ContentStore,
    branding: BrandingFilter,
    options: ProcessOptions,
    download_pacer: Pacer,
    subject_pacer: Pacer,
    reporter: Box<dyn ProgressReporter>,
}

impl Harvester {
    /// Build a harvester writing below `config.output.download_dir`.
    pub fn new(
        config: &HarvestConfig,
        options: ProcessOptions,
        reporter: Box<dyn ProgressReporter>,
    ) -> Result<Self> {
        let client = build_client(&config.http)?;
        let page_timeout = Duration::from_secs(config.http.page_timeout_secs);
        let lookup = DriveViewLookup::new(client.clone(), config.backend_base(), page_timeout);
        let branding = BrandingFilter::new(&config.processing.extra_branding_patterns)
            .context("invalid processing.extra_branding_patterns")?;

        Ok(Self {
            extractor: ReferenceExtractor::new(client.clone(), config),
            resolver: FilenameResolver::new(Box::new(lookup), config.discovery.context_window),
            retriever: Retriever::new(client.clone(), config),
            store: ContentStore::new(config.output.download_dir.clone()),
            client,
            page_timeout,
            discovery: config.discovery.clone(),
            branding,
            options,
            download_pacer: Pacer::from_millis(config.pacing.download_interval_ms),
            subject_pacer: Pacer::from_millis(config.pacing.subject_interval_ms),
            reporter,
        })
    }

    /// Replace the metadata lookup used by the second naming tier.
    pub fn with_lookup(mut self, lookup: Box<dyn MetadataLookup>, context_window: usize) -> Self {
        self.resolver = FilenameResolver::new(lookup, context_window);
        self
    }

    pub fn download_root(&self) -> &Path {
        self.store.root()
    }

    /// Subject pages linked from an index page.
    pub async fn discover_subjects(&self, index_url: &str) -> Result<Vec<Subject>, FetchError> {
        let html = fetch_page(&self.client, index_url, self.page_timeout).await?;
        let subjects = subjects_from_html(index_url, &html, &HtmlLinkFinder, &self.discovery);
        info!(index_url, count = subjects.len(), "discovered subjects");
        Ok(subjects)
    }

    /// Harvest every subject in order, pausing between subjects.
    pub async fn harvest_subjects(&mut self, subjects: &[Subject]) -> RunSummary {
        let mut total = RunSummary::start();
        for (i, subject) in subjects.iter().enumerate() {
            self.subject_pacer.wait().await;
            self.reporter.report(HarvestEvent::Subject {
                n: i as u64 + 1,
                total: subjects.len() as u64,
                name: subject.name.clone(),
            });
            let page = self.harvest_page(&subject.name, &subject.url).await;
            total.absorb(&page);
        }
        total.finish();
        total
    }

    /// Harvest the documents referenced from one subject page into
    /// `{download_dir}/{subject}/`.
    pub async fn harvest_page(&mut self, subject: &str, page_url: &str) -> RunSummary {
        let mut summary = RunSummary::start();
        summary.subjects = 1;

        let page = match self.extractor.fetch(page_url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(page_url, error = %e, "subject page unavailable");
                self.fail(&mut summary, page_url, &e);
                summary.finish();
                return summary;
            }
        };

        let total = page.references.len() as u64;
        summary.discovered = total;
        self.reporter.report(HarvestEvent::Discovered {
            page: page_url.to_string(),
            count: total,
        });
        if page.references.is_empty() {
            summary.finish();
            return summary;
        }

        let dir = match self.store.subject_dir(subject) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(subject, error = %e, "cannot create subject directory");
                self.fail(&mut summary, subject, &e);
                summary.finish();
                return summary;
            }
        };

        for (i, reference) in page.references.iter().enumerate() {
            let n = i as u64 + 1;
            if let Err(e) = self
                .harvest_reference(&dir, &page.source, reference, (n, total), &mut summary)
                .await
            {
                warn!(identifier = %reference.identifier, error = %e, "reference skipped");
                self.fail(&mut summary, &reference.identifier, &e);
            }
        }

        summary.finish();
        summary
    }

    async fn harvest_reference(
        &mut self,
        dir: &Path,
        page_source: &str,
        reference: &DocumentReference,
        (n, total): (u64, u64),
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        let ctx = NameContext {
            page_source,
            disposition: None,
        };
        if self.resolver.uses_network() {
            self.download_pacer.wait().await;
        }
        let named = self.resolver.resolve(reference, ctx).await;
        info!(identifier = %reference.identifier, filename = %named.filename, strategy = %named.strategy, "resolved name");

        let mut claimed = Claimed {
            path: self.store.claim(dir, &named.filename)?,
            name: named.filename,
        };
        if let Some(existing) = self.existing(&claimed.path) {
            self.present(&existing, Presence::Guessed, summary)?;
            return Ok(());
        }

        self.download_pacer.wait().await;
        let pending = match self.retriever.open(&reference.identifier).await {
            Ok(pending) => pending,
            Err(e) => {
                self.store.release(&claimed.path);
                return Err(e.into());
            }
        };
        if let Some(existing) = self.adopt_server_name(dir, &mut claimed, pending.declared_name())? {
            self.present(&existing, Presence::Verified, summary)?;
            return Ok(());
        }

        self.reporter.report(HarvestEvent::Downloading {
            n,
            total,
            filename: file_name(&claimed.path),
        });
        let result = match self.retriever.finish(pending).await {
            Ok(result) => result,
            Err(e) => {
                self.store.release(&claimed.path);
                return Err(e.into());
            }
        };
        if let Some(existing) =
            self.adopt_server_name(dir, &mut claimed, result.declared_name.as_deref())?
        {
            self.present(&existing, Presence::Verified, summary)?;
            return Ok(());
        }

        let stored = self.store.write_claimed(&claimed.path, &result.bytes)?;
        summary.downloaded += 1;
        self.reporter.report(HarvestEvent::Downloaded {
            filename: file_name(&stored.path),
            bytes: stored.size_bytes,
        });
        self.process_stored(&stored.path, summary)?;
        Ok(())
    }

    /// Move the claim to the name a `Content-Disposition` declares, when it
    /// differs from the current one. Returns the on-disk file if that name
    /// is already present, with the claim given back.
    fn adopt_server_name(
        &mut self,
        dir: &Path,
        claimed: &mut Claimed,
        header: Option<&str>,
    ) -> Result<Option<PathBuf>, FilesystemError> {
        let Some(declared) = header.and_then(disposition_name) else {
            return Ok(None);
        };
        if declared.filename == claimed.name {
            return Ok(None);
        }
        self.store.release(&claimed.path);
        claimed.path = self.store.claim(dir, &declared.filename)?;
        claimed.name = declared.filename;
        match self.existing(&claimed.path) {
            Some(existing) => {
                self.store.release(&claimed.path);
                Ok(Some(existing))
            }
            None => Ok(None),
        }
    }

    /// The on-disk file that makes `path` redundant, if any: the path itself
    /// or, with branding stripping on, its unbranded twin.
    fn existing(&self, path: &Path) -> Option<PathBuf> {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        if !self.options.strip_branding {
            return None;
        }
        let name = path.file_name()?.to_str()?;
        let plain = path.with_file_name(self.branding.strip(name));
        (plain != path && plain.exists()).then_some(plain)
    }

    /// Count a file that was already on disk, then give it the same
    /// post-processing a fresh download gets.
    fn present(
        &mut self,
        path: &Path,
        presence: Presence,
        summary: &mut RunSummary,
    ) -> Result<(), FilesystemError> {
        info!(path = %path.display(), ?presence, "already present");
        self.store.record(path);
        let filename = file_name(path);
        match presence {
            Presence::Guessed => {
                summary.already_present += 1;
                self.reporter.report(HarvestEvent::AlreadyPresent { filename });
            }
            Presence::Verified => {
                summary.verified_present += 1;
                self.reporter.report(HarvestEvent::VerifiedPresent { filename });
            }
        }
        self.process_stored(path, summary)
    }

    fn process_stored(&mut self, path: &Path, summary: &mut RunSummary) -> Result<(), FilesystemError> {
        if !self.options.any() {
            return Ok(());
        }
        let outcome = postprocess(path, self.options, &self.branding)?;
        if outcome.renamed {
            self.store.record(&outcome.path);
        }
        tally(self.reporter.as_ref(), path, &outcome, summary);
        Ok(())
    }

    fn fail(&self, summary: &mut RunSummary, target: &str, error: &dyn std::fmt::Display) {
        summary.failed += 1;
        self.reporter.report(HarvestEvent::Failed {
            target: target.to_string(),
            reason: error.to_string(),
        });
    }
}

/// A path reserved in the store, and the resolved name it was claimed for.
struct Claimed {
    path: PathBuf,
    name: String,
}

/// How an existing file was matched.
#[derive(Debug, Clone, Copy)]
enum Presence {
    /// The name chosen before any request was already on disk.
    Guessed,
    /// The server's declared name was on disk.
    Verified,
}

fn tally(
    reporter: &dyn ProgressReporter,
    original: &Path,
    outcome: &ProcessOutcome,
    summary: &mut RunSummary,
) {
    if outcome.renamed {
        summary.renamed += 1;
        reporter.report(HarvestEvent::Renamed {
            from: file_name(original),
            to: file_name(&outcome.path),
        });
    }
    if outcome.links_removed > 0 {
        summary.hyperlinks_stripped += 1;
        reporter.report(HarvestEvent::HyperlinksStripped {
            filename: file_name(&outcome.path),
            count: outcome.links_removed as u64,
        });
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Run the post-processing passes over every PDF already in `dir`.
///
/// `discovered` counts the files found; a file that cannot be processed is
/// reported and counted as failed without stopping the rest.
pub fn process_directory(
    dir: &Path,
    options: ProcessOptions,
    branding: &BrandingFilter,
    recursive: bool,
    reporter: &dyn ProgressReporter,
) -> Result<RunSummary, FilesystemError> {
    let mut summary = RunSummary::start();
    let files = pdf_files(dir, recursive)?;
    summary.discovered = files.len() as u64;

    for path in &files {
        match postprocess(path, options, branding) {
            Ok(outcome) => tally(reporter, path, &outcome, &mut summary),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "post-processing failed");
                summary.failed += 1;
                reporter.report(HarvestEvent::Failed {
                    target: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    summary.finish();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn process_directory_strips_branding_and_counts() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("Module 1 -Ktunotes.in.pdf"), b"%PDF-1.4").unwrap();
        fs::write(tmp.path().join("Clean.pdf"), b"%PDF-1.4").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"ignored").unwrap();

        let options = ProcessOptions {
            strip_branding: true,
            strip_hyperlinks: false,
        };
        let branding = BrandingFilter::new(&[]).unwrap();
        let summary = process_directory(tmp.path(), options, &branding, false, &NoProgress).unwrap();

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.renamed, 1);
        assert_eq!(summary.failed, 0);
        assert!(tmp.path().join("Module 1.pdf").exists());
        assert!(summary.finished_at.is_some());
    }

    #[test]
    fn process_directory_reports_unreadable_pdf() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.pdf"), b"not a pdf at all").unwrap();

        let options = ProcessOptions {
            strip_branding: false,
            strip_hyperlinks: true,
        };
        let branding = BrandingFilter::new(&[]).unwrap();
        let summary = process_directory(tmp.path(), options, &branding, false, &NoProgress).unwrap();

        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.failed, 1);
    }
}
