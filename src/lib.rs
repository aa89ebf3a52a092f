//! # tocbind
//!
//! Scrape a chapter index, render each chapter to PDF with a headless
//! browser, and bind the results into one bookmarked volume.
//!
//! ## Why this crate?
//!
//! Plenty of documentation and web-novel sites publish a book only as a
//! table-of-contents page linking to dozens of chapter pages. tocbind turns
//! such a site into a single offline PDF: the page-to-PDF conversion is
//! delegated to whatever headless-browser command you already have, while
//! this crate supplies the orchestration that makes the result usable —
//! stable chapter ordering, idempotent re-runs, retry with backoff, and a
//! proper outline so readers can jump between chapters.
//!
//! ## Pipeline Overview
//!
//! ```text
//! TOC page (HTML)
//!  │
//!  ├─ 1. extract  anchors → ordered manifest (extracted_urls.json)
//!  ├─ 2. render   one subprocess call per record, skip-if-exists, retry
//!  └─ 3. merge    concatenate PDFs in manifest order + outline entries
//! ```
//!
//! The stages run as separate invocations and hand off exclusively through
//! files: the manifest between extract and the rest, the rendered PDF
//! directory between render and merge. A partially rendered directory is
//! safe to resume — existing files are skipped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tocbind::{extract_manifest, render_manifest, merge_manifest};
//! use tocbind::{CommandRenderer, RenderConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let html = std::fs::read_to_string("toc.html")?;
//!     let manifest = extract_manifest(&html, "https://example.com/book");
//!
//!     let config = RenderConfig::default();
//!     let renderer = CommandRenderer::from_config(&config);
//!     let pdf_dir = Path::new("./data/pdfs");
//!     render_manifest(&manifest, pdf_dir, &renderer, &config).await?;
//!
//!     let report = merge_manifest(&manifest, pdf_dir, Path::new("book.pdf"), None).await?;
//!     eprintln!("{} pages, {} bookmarks", report.page_count, report.bookmarks.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tocbind` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! tocbind = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ProxyConfig, RenderConfig, RenderConfigBuilder};
pub use error::{BindError, RecordError};
pub use manifest::{LinkRecord, Manifest};
pub use pipeline::extract::{extract_links, extract_manifest};
pub use pipeline::merge::{merge_manifest, BookmarkEntry, MergeReport};
pub use pipeline::render::{
    render_manifest, CommandRenderer, PageRenderer, RenderFailure, RenderReport, RenderRequest,
    RenderResult, RenderStatus,
};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
