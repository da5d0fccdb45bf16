//! End-to-end harvest runs against a local fake backend.

mod common;

use std::fs;

use common::{FakeBackend, SUBJECT_DIR};
use study_harvest::error::RetrievalError;
use study_harvest::extractor::ReferenceExtractor;
use study_harvest::metadata::NoLookup;
use study_harvest::models::Subject;
use study_harvest::pipeline::Harvester;
use study_harvest::postprocess::{strip_hyperlinks, ProcessOptions};
use study_harvest::progress::NoProgress;
use study_harvest::retriever::Retriever;
use tempfile::TempDir;

fn branding_only() -> ProcessOptions {
    ProcessOptions {
        strip_branding: true,
        strip_hyperlinks: false,
    }
}

async fn harvester(backend: &FakeBackend, tmp: &TempDir, options: ProcessOptions) -> Harvester {
    Harvester::new(&backend.config(tmp.path()), options, Box::new(NoProgress)).unwrap()
}

#[tokio::test]
async fn discovers_subjects_without_excluded_buttons() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let h = harvester(&backend, &tmp, branding_only()).await;

    let subjects = h.discover_subjects(&backend.index_url()).await.unwrap();
    let names: Vec<&str> = subjects.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["CST201 Data Structures", "CST203 Logic System Design"]);
    assert!(subjects[0].url.starts_with(&backend.base));
}

#[tokio::test]
async fn full_run_names_downloads_and_reports_failures() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let mut h = harvester(&backend, &tmp, branding_only()).await;

    let subjects = h.discover_subjects(&backend.index_url()).await.unwrap();
    let summary = h.harvest_subjects(&subjects).await;

    let dir = tmp.path().join(SUBJECT_DIR);
    assert!(dir.join("Module_02.pdf").exists(), "module tag names the arrays notes");
    assert!(dir.join("Linked Lists.pdf").exists(), "branding stripped after download");
    assert!(!dir.join("Linked Lists -Ktunotes.in.pdf").exists());
    assert!(!dir.join("Module_03.pdf").exists(), "HTML body must never be stored");
    assert!(!dir.join("Module_04.pdf").exists());

    assert_eq!(summary.subjects, 2);
    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.renamed, 1);
    // trees03, graphs04, and the missing subject page
    assert_eq!(summary.failed, 3);
    assert!(summary.finished_at.is_some());

    assert_eq!(backend.hits("bigfile02"), 2, "warning page then confirmed download");
    assert_eq!(backend.hits("graphs04"), 2);

    let leftovers: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn rerun_skips_files_already_on_disk() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let subject = Subject {
        name: SUBJECT_DIR.to_string(),
        url: format!("{}/ktu-cst201-data-structures-notes-2019/", backend.base),
    };

    let mut first = harvester(&backend, &tmp, branding_only()).await;
    let summary = first.harvest_page(&subject.name, &subject.url).await;
    assert_eq!(summary.downloaded, 2);
    let arrays_hits = backend.hits("arrays01");
    let linked_hits = backend.hits("bigfile02");

    let mut second = harvester(&backend, &tmp, branding_only()).await;
    let summary = second.harvest_page(&subject.name, &subject.url).await;
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.already_present, 2);
    assert_eq!(backend.hits("arrays01"), arrays_hits, "no retrieval for Module_02.pdf");
    assert_eq!(backend.hits("bigfile02"), linked_hits, "unbranded twin counts as present");

    let dir = tmp.path().join(SUBJECT_DIR);
    assert!(!dir.join("Module_02_1.pdf").exists());
}

#[tokio::test]
async fn rerun_without_lookup_reads_headers_only() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let cfg = backend.config(tmp.path());
    let url = format!("{}/ktu-cst201-data-structures-notes-2019/", backend.base);
    let without_lookup = || {
        Harvester::new(&cfg, branding_only(), Box::new(NoProgress))
            .unwrap()
            .with_lookup(Box::new(NoLookup), cfg.discovery.context_window)
    };

    let summary = without_lookup().harvest_page(SUBJECT_DIR, &url).await;
    assert_eq!(summary.downloaded, 2);
    let linked_hits = backend.hits("bigfile02");

    let summary = without_lookup().harvest_page(SUBJECT_DIR, &url).await;
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.already_present, 1, "Module_02.pdf matched by its guessed name");
    assert_eq!(summary.verified_present, 1, "Linked Lists.pdf matched by the server's name");
    // warning page plus confirmed response, whose body is left unread
    assert_eq!(backend.hits("bigfile02"), linked_hits + 2);

    let dir = tmp.path().join(SUBJECT_DIR);
    assert!(!dir.join("Linked Lists_1.pdf").exists());
    assert!(!dir.join("Module_02_1.pdf").exists());
}

#[tokio::test]
async fn rerun_postprocesses_existing_files() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let url = format!("{}/ktu-cst201-data-structures-notes-2019/", backend.base);

    let summary = harvester(&backend, &tmp, branding_only())
        .await
        .harvest_page(SUBJECT_DIR, &url)
        .await;
    assert_eq!(summary.hyperlinks_stripped, 0);

    let both = ProcessOptions {
        strip_branding: true,
        strip_hyperlinks: true,
    };
    let summary = harvester(&backend, &tmp, both)
        .await
        .harvest_page(SUBJECT_DIR, &url)
        .await;
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.already_present, 2);
    assert_eq!(summary.hyperlinks_stripped, 2);

    let dir = tmp.path().join(SUBJECT_DIR);
    assert_eq!(strip_hyperlinks(&dir.join("Module_02.pdf")).unwrap(), 0);
    assert_eq!(strip_hyperlinks(&dir.join("Linked Lists.pdf")).unwrap(), 0);
}

#[tokio::test]
async fn hyperlinks_removed_from_downloads() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let options = ProcessOptions {
        strip_branding: false,
        strip_hyperlinks: true,
    };
    let mut h = harvester(&backend, &tmp, options).await;
    let url = format!("{}/ktu-cst201-data-structures-notes-2019/", backend.base);

    let summary = h.harvest_page(SUBJECT_DIR, &url).await;
    assert_eq!(summary.downloaded, 2);
    assert_eq!(summary.hyperlinks_stripped, 2);
    assert_eq!(summary.renamed, 0);

    let dir = tmp.path().join(SUBJECT_DIR);
    assert!(dir.join("Linked Lists -Ktunotes.in.pdf").exists());
    assert_eq!(strip_hyperlinks(&dir.join("Module_02.pdf")).unwrap(), 0);
}

#[tokio::test]
async fn missing_page_is_a_failed_summary_not_an_error() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let mut h = harvester(&backend, &tmp, branding_only()).await;

    let url = format!("{}/ktu-cst203-logic-notes-2019/", backend.base);
    let summary = h.harvest_page("CST203 Logic System Design", &url).await;
    assert_eq!(summary.subjects, 1);
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.failed, 1);
    assert!(!tmp.path().join("CST203 Logic System Design").exists());
}

#[tokio::test]
async fn retriever_handshake_and_html_rejection() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let cfg = backend.config(tmp.path());
    let client = study_harvest::http::build_client(&cfg.http).unwrap();
    let retriever = Retriever::new(client, &cfg);

    let confirmed = retriever.retrieve("bigfile02").await.unwrap();
    assert!(confirmed.bytes.starts_with(b"%PDF"));
    assert_eq!(confirmed.declared_name.as_deref(), Some(common::BRANDED_DISPOSITION));

    assert!(matches!(
        retriever.retrieve("trees03").await,
        Err(RetrievalError::NoConfirmToken { .. })
    ));
    assert!(matches!(
        retriever.retrieve("graphs04").await,
        Err(RetrievalError::NotBinary { .. })
    ));
    assert!(matches!(
        retriever.retrieve("nothing").await,
        Err(RetrievalError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn retriever_enforces_size_cap() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let mut cfg = backend.config(tmp.path());
    cfg.retrieval.max_bytes = 100;
    let client = study_harvest::http::build_client(&cfg.http).unwrap();
    let retriever = Retriever::new(client, &cfg);

    // Content-Length announced up front
    assert!(matches!(
        retriever.retrieve("arrays01").await,
        Err(RetrievalError::TooLarge { limit: 100, .. })
    ));
    // no length; the cap trips while reading chunks
    assert!(matches!(
        retriever.retrieve("stream05").await,
        Err(RetrievalError::TooLarge { limit: 100, .. })
    ));

    cfg.retrieval.max_bytes = 1 << 20;
    let client = study_harvest::http::build_client(&cfg.http).unwrap();
    let retriever = Retriever::new(client, &cfg);
    let streamed = retriever.retrieve("stream05").await.unwrap();
    assert_eq!(streamed.bytes, common::pdf_with_link());
}

#[tokio::test]
async fn server_filename_replaces_inferred_name() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let cfg = backend.config(tmp.path());
    let mut h = Harvester::new(&cfg, branding_only(), Box::new(NoProgress))
        .unwrap()
        .with_lookup(Box::new(NoLookup), cfg.discovery.context_window);
    let url = format!("{}/ktu-cst201-data-structures-notes-2019/", backend.base);

    let summary = h.harvest_page(SUBJECT_DIR, &url).await;
    assert_eq!(summary.downloaded, 2);

    // Without the title lookup "Download" inherits the preceding "Module 2"
    // label, until the download's own filename takes over.
    let dir = tmp.path().join(SUBJECT_DIR);
    assert!(dir.join("Module_02.pdf").exists());
    assert!(dir.join("Linked Lists.pdf").exists());
    assert!(!dir.join("Module_02_1.pdf").exists());
}

#[tokio::test]
async fn extractor_reads_backend_links() {
    let backend = FakeBackend::start().await;
    let tmp = TempDir::new().unwrap();
    let cfg = backend.config(tmp.path());
    let client = study_harvest::http::build_client(&cfg.http).unwrap();
    let extractor = ReferenceExtractor::new(client, &cfg);

    let url = format!("{}/ktu-cst201-data-structures-notes-2019/", backend.base);
    let refs = extractor.extract_references(&url).await.unwrap();
    let ids: Vec<&str> = refs.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(ids, vec!["arrays01", "bigfile02", "trees03", "graphs04"]);
    assert_eq!(refs[0].context_text, "Module 2 - Arrays");
    assert!(refs.iter().all(|r| r.source_page_url == url));
}
