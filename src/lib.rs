//! # study-harvest
//!
//! Discovers PDF study notes linked from course pages, downloads them from a
//! Drive-shaped storage backend, and tidies the results on disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌─────────────┐
//! │ Extractor  │──▶│  Naming    │──▶│ Retriever  │──▶│ Store +     │
//! │ HTML links │   │ 5 tiers    │   │ confirm    │   │ postprocess │
//! └────────────┘   └────────────┘   └────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest init                                  # write config/harvest.toml
//! harvest subjects https://notes.example/s6/    # list subject pages
//! harvest fetch https://notes.example/s6/ --select 1-3 --yes
//! harvest process KTU_Notes --strip-hyperlinks --recursive
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors per engine stage |
//! | [`http`] | Shared network session |
//! | [`links`] | HTML link finding and raw identifier scan |
//! | [`identifier`] | Storage URL to identifier |
//! | [`extractor`] | Document references on a page |
//! | [`metadata`] | View-page title lookup |
//! | [`naming`] | Filename fallback chain |
//! | [`retriever`] | Download with confirmation handshake |
//! | [`store`] | Collision-safe writes |
//! | [`postprocess`] | Branding and hyperlink stripping |
//! | [`subjects`] | Subject pages on an index page |
//! | [`selection`] | Selection expressions |
//! | [`pacing`] | Request pacing |
//! | [`pipeline`] | Orchestration and summaries |
//! | [`progress`] | Progress reporting |
//! | [`prompt`] | Interactive prompts |

pub mod config;
pub mod error;
pub mod extractor;
pub mod http;
pub mod identifier;
pub mod links;
pub mod metadata;
pub mod models;
pub mod naming;
pub mod pacing;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod prompt;
pub mod retriever;
pub mod selection;
pub mod store;
pub mod subjects;
