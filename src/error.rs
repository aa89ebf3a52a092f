//! Error types for the tocbind library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BindError`] — **Fatal**: the stage cannot proceed at all (missing
//!   manifest, unreadable HTML, unwritable output directory). Returned as
//!   `Err(BindError)` from the top-level stage drivers.
//!
//! * [`RecordError`] — **Non-fatal**: a single manifest record failed
//!   (render command gave up, chapter PDF missing or corrupt at merge time)
//!   but all other records are fine. Stored inside per-record results so
//!   callers can inspect partial success rather than losing the whole run
//!   to one bad chapter.
//!
//! The separation lets callers decide their own tolerance: abort on the
//! first record failure, log and continue, or collect all errors for a
//! post-run report. The stage drivers themselves always continue.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tocbind library.
///
/// Record-level failures use [`RecordError`] and are stored in the stage
/// reports rather than propagated here.
#[derive(Debug, Error)]
pub enum BindError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required input file was not found at the given path.
    #[error("input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// A required input file exists but could not be read.
    #[error("failed to read '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest file exists but is not the expected JSON shape.
    #[error("manifest '{path}' is not valid JSON: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The base URL does not parse as an absolute http(s) URL.
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create an output directory.
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("failed to write output file '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// lopdf failed while serialising the merged document.
    #[error("failed to write merged PDF '{path}': {detail}")]
    PdfWrite { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single manifest record.
///
/// Stored in the stage reports when a record fails. The overall run
/// continues past any number of these.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// The external render command gave up after all retries.
    #[error("'{file_name}': rendering failed after {attempts} attempts: {detail}")]
    Render {
        file_name: String,
        attempts: u32,
        detail: String,
    },

    /// The chapter PDF was absent from the source directory at merge time.
    #[error("'{file_name}': PDF not found in source directory")]
    PdfMissing { file_name: String },

    /// The chapter PDF exists but lopdf could not parse it.
    #[error("'{file_name}': PDF could not be read: {detail}")]
    PdfUnreadable { file_name: String, detail: String },

    /// The outline tree could not be attached to the merged document.
    /// The merged pages themselves are unaffected.
    #[error("failed to attach outline: {detail}")]
    Outline { detail: String },
}
