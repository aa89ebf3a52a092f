//! The manifest file: the sole contract between pipeline stages.
//!
//! The extract stage writes it, the render and merge stages read it. Each
//! stage runs as its own process, so everything the later stages need —
//! order, titles, derived file names, the base URL — must round-trip through
//! this file exactly.
//!
//! Wire shape (field names are load-bearing; do not rename):
//!
//! ```json
//! {
//!   "totalCount": 2,
//!   "baseUrl": "https://example.com/book",
//!   "links": [
//!     { "url": "/ch1", "title": "Chapter 1", "file_name": "Chapter 1.pdf" }
//!   ]
//! }
//! ```

use crate::error::BindError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// One extracted chapter link.
///
/// Immutable once written to a manifest. `file_name` is unique within the
/// manifest (see [`dedupe_file_names`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Link target as found in the document — relative or absolute.
    pub url: String,
    /// Human-readable title, whitespace-normalised.
    pub title: String,
    /// Derived, filesystem-safe output name, always ending in `.pdf`.
    pub file_name: String,
}

/// The ordered set of chapter links plus the base URL they resolve against.
///
/// Order is significant: it defines both rendering order and final page
/// order in the merged volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub total_count: usize,
    pub base_url: String,
    pub links: Vec<LinkRecord>,
}

impl Manifest {
    /// Build a manifest from an ordered link list. `total_count` is always
    /// derived from the list length.
    pub fn new(links: Vec<LinkRecord>, base_url: impl Into<String>) -> Self {
        Self {
            total_count: links.len(),
            base_url: base_url.into(),
            links,
        }
    }

    /// Read and parse a manifest file.
    pub async fn load(path: &Path) -> Result<Self, BindError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BindError::InputNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                BindError::InputRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| BindError::ManifestParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        debug!("loaded manifest: {} links", manifest.links.len());
        Ok(manifest)
    }

    /// Write the manifest as pretty-printed JSON, creating parent
    /// directories as needed.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn save(&self, path: &Path) -> Result<(), BindError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BindError::Internal(format!("manifest serialisation: {e}")))?;

        let write_err = |e| BindError::OutputWrite {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BindError::CreateDir {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
        Ok(())
    }

    /// Resolve a record's link against the manifest base URL.
    ///
    /// Links that are already absolute are used verbatim; relative links are
    /// joined to `base_url` with exactly one separating slash.
    pub fn resolve_url(&self, record: &LinkRecord) -> String {
        if is_absolute_url(&record.url) {
            return record.url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            record.url.trim_start_matches('/')
        )
    }
}

/// Check if a link target is already an absolute http(s) URL.
pub fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Validate a user-supplied base URL before it is baked into a manifest.
///
/// The string itself is preserved verbatim in the manifest; this only
/// rejects input that could never resolve to a fetchable page, so typos
/// fail at extract time instead of as N render failures later.
pub fn validate_base_url(base_url: &str) -> Result<(), BindError> {
    let parsed = url::Url::parse(base_url).map_err(|e| BindError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(BindError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}

/// Derive a filesystem-safe output name from a chapter title.
///
/// Keeps alphanumerics, spaces, `-`, `_`, and `.`; drops everything else;
/// trims trailing whitespace; appends `.pdf`.
pub fn safe_file_name(title: &str) -> String {
    let safe: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect();
    format!("{}.pdf", safe.trim_end())
}

/// Resolve duplicate derived file names in place.
///
/// Walks the records in order keeping a count per originally-derived name;
/// the Nth repeat of a name becomes `<base>_N.pdf` (N = 2, 3, …). The first
/// occurrence keeps its name, matching the manifest example
/// `A.pdf`, `A_2.pdf`, `A_3.pdf`.
pub fn dedupe_file_names(links: &mut [LinkRecord]) {
    let mut seen: HashMap<String, u32> = HashMap::new();
    for link in links.iter_mut() {
        let count = {
            let c = seen.entry(link.file_name.clone()).or_insert(0);
            *c += 1;
            *c
        };
        if count > 1 {
            let base = link
                .file_name
                .strip_suffix(".pdf")
                .unwrap_or(&link.file_name)
                .to_string();
            link.file_name = format!("{base}_{count}.pdf");
        }
    }
}
