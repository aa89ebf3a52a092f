//! Link extraction: scan a table-of-contents page into an ordered manifest.
//!
//! Parsing is deliberately lenient. TOC pages in the wild are full of
//! unclosed tags and stray markup, and html5ever (via `scraper`) recovers
//! from all of it the way a browser would. A page that yields no anchors
//! produces an empty manifest, never an error — the extract stage only
//! fails when its input file cannot be read at all.

use crate::manifest::{dedupe_file_names, safe_file_name, LinkRecord, Manifest};
use scraper::{Html, Selector};
use tracing::{debug, error};

/// Extract one record per anchor with an `href` attribute and a non-empty
/// title, in document order.
///
/// The title is the concatenation of all text nodes under the anchor
/// (nested tags contribute their text, markup is dropped) with runs of
/// whitespace collapsed to single spaces. Anchors whose collapsed title is
/// empty are discarded: they carry nothing usable as a chapter heading.
///
/// Derived `file_name`s are *not* deduplicated here; see
/// [`extract_manifest`].
pub fn extract_links(html: &str) -> Vec<LinkRecord> {
    let document = Html::parse_document(html);

    let anchor_selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(e) => {
            error!("anchor selector failed to parse: {e:?}");
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.is_empty() {
            continue;
        }

        let title = element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            continue;
        }

        let file_name = safe_file_name(&title);
        records.push(LinkRecord {
            url: href.to_string(),
            title,
            file_name,
        });
    }

    debug!("extracted {} links", records.len());
    records
}

/// Extract links and assemble the stage's output manifest.
///
/// Duplicate derived file names are resolved here, once, so the manifest on
/// disk already satisfies the uniqueness invariant the later stages rely on.
pub fn extract_manifest(html: &str, base_url: &str) -> Manifest {
    let mut links = extract_links(html);
    dedupe_file_names(&mut links);
    Manifest::new(links, base_url)
}
