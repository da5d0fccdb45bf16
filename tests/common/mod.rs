//! Local stand-in for the notes site and the storage backend.
//!
//! Serves one index page, two subject pages (one of them missing), the
//! backend's view pages, and the `/uc` download endpoint with its warning
//! page handshake.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use lopdf::{dictionary, Document, Object};
use tokio::net::TcpListener;

use study_harvest::config::HarvestConfig;

pub const INDEX_PATH: &str = "/ktu-s3-cse-notes-2019/";
pub const SUBJECT_DIR: &str = "CST201 Data Structures";
pub const BRANDED_DISPOSITION: &str = "attachment; filename=\"Linked Lists -Ktunotes.in.pdf\"";

#[derive(Clone)]
struct Site {
    base: String,
    pdf: Arc<Vec<u8>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

pub struct FakeBackend {
    pub base: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let site = Site {
            base: base.clone(),
            pdf: Arc::new(pdf_with_link()),
            hits: hits.clone(),
        };

        let app = Router::new()
            .route(INDEX_PATH, get(index_page))
            .route("/ktu-cst201-data-structures-notes-2019/", get(subject_page))
            .route(
                "/ktu-cst203-logic-notes-2019/",
                get(|| async { StatusCode::NOT_FOUND }),
            )
            .route("/file/d/{id}/view", get(view_page))
            .route("/uc", get(download))
            .with_state(site);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base, hits }
    }

    pub fn index_url(&self) -> String {
        format!("{}{}", self.base, INDEX_PATH)
    }

    /// Number of `/uc` requests seen for `id`.
    pub fn hits(&self, id: &str) -> usize {
        self.hits.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Defaults pointed at this backend, writing into `download_dir`, no pacing.
    pub fn config(&self, download_dir: &Path) -> HarvestConfig {
        let mut cfg = HarvestConfig::minimal();
        cfg.backend.base_url = self.base.clone();
        cfg.pacing.download_interval_ms = 0;
        cfg.pacing.subject_interval_ms = 0;
        cfg.output.download_dir = download_dir.to_path_buf();
        cfg
    }

    /// The same settings as a TOML file for the binary.
    pub fn config_toml(&self, download_dir: &Path) -> String {
        format!(
            r#"[backend]
base_url = "{}"

[pacing]
download_interval_ms = 0
subject_interval_ms = 0

[output]
download_dir = "{}"
"#,
            self.base,
            download_dir.display()
        )
    }
}

async fn index_page() -> Html<&'static str> {
    Html(
        r#"<html><body>
        <a class="elementor-button" href="/ktu-cst201-data-structures-notes-2019/">
          <span class="elementor-button-text">CST201 Data Structures</span></a>
        <a class="elementor-button" href="/ktu-cst203-logic-notes-2019/">
          <span class="elementor-button-text">CST203 Logic System Design</span></a>
        <a class="elementor-button" href="/ktu-s3-syllabus-notes-2019/">
          <span class="elementor-button-text">S3 SYLLABUS</span></a>
        </body></html>"#,
    )
}

async fn subject_page(State(site): State<Site>) -> Html<String> {
    let base = &site.base;
    Html(format!(
        r#"<html><body>
        <h2>Notes</h2>
        <p><a href="{base}/file/d/arrays01/view">Module 2 - Arrays</a></p>
        <p><a href="{base}/open?id=arrays01">Module 2 (mirror)</a></p>
        <p>Linked lists: <a href="{base}/file/d/bigfile02/view?usp=sharing">Download</a></p>
        <p><a href="{base}/file/d/trees03/view">Module 3 - Trees</a></p>
        <p><a href="{base}/file/d/graphs04/view">Module 4 - Graphs</a></p>
        <p><a href="https://example.com/about">About</a></p>
        </body></html>"#
    ))
}

async fn view_page(UrlPath(id): UrlPath<String>) -> Response {
    if id == "bigfile02" {
        Html("<html><head><title>Linked Lists -Ktunotes.in.pdf - Google Drive</title></head></html>")
            .into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// `arrays01` downloads directly, `bigfile02` needs the confirmation
/// handshake, `trees03` is an access-denied page without a token, and
/// `graphs04` answers the handshake with another HTML page. `stream05`
/// is never linked; it sends the PDF in chunks without a length.
async fn download(
    State(site): State<Site>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let id = query.get("id").cloned().unwrap_or_default();
    *site.hits.lock().unwrap().entry(id.clone()).or_default() += 1;
    let confirmed = query.contains_key("confirm");

    match (id.as_str(), confirmed) {
        ("arrays01", _) => pdf_response(&site.pdf, None),
        ("bigfile02", false) | ("graphs04", false) => warning_page(&id),
        ("bigfile02", true) => pdf_response(&site.pdf, Some(BRANDED_DISPOSITION)),
        ("graphs04", true) => Html("<html><body>Quota exceeded</body></html>").into_response(),
        ("trees03", _) => Html("<html><body>Access denied</body></html>").into_response(),
        ("stream05", _) => streamed_pdf(&site.pdf),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn warning_page(id: &str) -> Response {
    Html(format!(
        r#"<html><body><p>Google Drive can't scan this file for viruses.</p>
        <form action="/uc?export=download&amp;confirm=t0k3n&amp;id={id}" method="get">
        <input type="submit" value="Download anyway"/></form></body></html>"#
    ))
    .into_response()
}

fn pdf_response(bytes: &[u8], disposition: Option<&'static str>) -> Response {
    let mut resp = ([(header::CONTENT_TYPE, "application/pdf")], bytes.to_vec()).into_response();
    if let Some(value) = disposition {
        resp.headers_mut()
            .insert(header::CONTENT_DISPOSITION, HeaderValue::from_static(value));
    }
    resp
}

fn streamed_pdf(bytes: &[u8]) -> Response {
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
        bytes.chunks(64).map(|c| Ok(c.to_vec())).collect();
    let mut resp = Body::from_stream(futures::stream::iter(chunks)).into_response();
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    resp
}

/// One-page PDF carrying a single link annotation.
pub fn pdf_with_link() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let link_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
        "A" => dictionary! {
            "S" => "URI",
            "URI" => Object::string_literal("https://www.ktunotes.in"),
        },
    });
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        "Annots" => vec![link_id.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
