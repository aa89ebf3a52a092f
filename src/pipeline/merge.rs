//! Merge driver: concatenate rendered chapter PDFs into one bookmarked
//! volume.
//!
//! Every readable chapter contributes its pages, in order, to a fresh page
//! tree; one outline (bookmark) entry per chapter points at that chapter's
//! first page. Missing or unreadable files are counted and excluded — the
//! merged pages are the primary deliverable, and only a failure to write
//! the output file fails the run.
//!
//! Runs on a blocking worker thread via `spawn_blocking`: lopdf is
//! CPU-bound and does synchronous file I/O, neither of which belongs on
//! the async executor's worker threads.

use crate::error::{BindError, RecordError};
use crate::manifest::Manifest;
use crate::progress::ProgressCallback;
use lopdf::{Bookmark, Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One outline entry recorded while concatenating.
///
/// `start_page` is the 0-based offset of the chapter's first page in the
/// merged volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkEntry {
    pub title: String,
    pub start_page: usize,
    pub page_count: usize,
}

/// Structured result of a merge run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub success: bool,
    pub output_path: PathBuf,
    pub file_size: u64,
    pub page_count: usize,
    pub processed_count: usize,
    pub error_count: usize,
    /// Outline entries actually applied to the output document.
    pub bookmarks: Vec<BookmarkEntry>,
    /// Per-record failures, in manifest order.
    pub errors: Vec<RecordError>,
}

/// Merge every rendered chapter listed in the manifest into `output_path`.
///
/// Chapters are visited exactly once, in manifest order; a record either
/// merges, is skipped as missing, or is excluded as unreadable. The run
/// fails only when the merged document cannot be written.
pub async fn merge_manifest(
    manifest: &Manifest,
    pdf_dir: &Path,
    output_path: &Path,
    progress: Option<ProgressCallback>,
) -> Result<MergeReport, BindError> {
    let manifest = manifest.clone();
    let pdf_dir = pdf_dir.to_path_buf();
    let output_path = output_path.to_path_buf();

    tokio::task::spawn_blocking(move || merge_blocking(&manifest, &pdf_dir, &output_path, progress))
        .await
        .map_err(|e| BindError::Internal(format!("merge task panicked: {e}")))?
}

/// Blocking implementation of the merge.
fn merge_blocking(
    manifest: &Manifest,
    pdf_dir: &Path,
    output_path: &Path,
    progress: Option<ProgressCallback>,
) -> Result<MergeReport, BindError> {
    let total = manifest.links.len();
    info!(
        "merging up to {} documents from {}",
        total,
        pdf_dir.display()
    );
    if let Some(ref cb) = progress {
        cb.on_run_start(total);
    }

    let mut document = Document::with_version("1.5");
    let mut max_id: u32 = 1;
    // Pages in final volume order; a map would re-sort them by object id.
    let mut merged_pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut merged_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut bookmarks: Vec<BookmarkEntry> = Vec::new();
    let mut errors: Vec<RecordError> = Vec::new();
    let mut processed_count = 0usize;
    let mut page_offset = 0usize;

    for (idx, record) in manifest.links.iter().enumerate() {
        let index = idx + 1;
        if let Some(ref cb) = progress {
            cb.on_record_start(index, total, &record.title);
        }

        let path = pdf_dir.join(&record.file_name);
        if !path.exists() {
            warn!("'{}' not found in {}", record.file_name, pdf_dir.display());
            errors.push(RecordError::PdfMissing {
                file_name: record.file_name.clone(),
            });
            if let Some(ref cb) = progress {
                cb.on_record_skipped(index, total, &format!("{} (missing)", record.file_name));
            }
            continue;
        }

        let mut doc = match Document::load(&path) {
            Ok(doc) => doc,
            Err(e) => {
                let err = RecordError::PdfUnreadable {
                    file_name: record.file_name.clone(),
                    detail: e.to_string(),
                };
                warn!("{err}");
                if let Some(ref cb) = progress {
                    cb.on_record_error(index, total, &err.to_string());
                }
                errors.push(err);
                continue;
            }
        };

        // Shift this document's object ids into a range disjoint from
        // everything merged so far.
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let pages = doc.get_pages();
        let page_count = pages.len();
        let mut first_page: Option<ObjectId> = None;

        for &page_id in pages.values() {
            if first_page.is_none() {
                first_page = Some(page_id);
            }
            if let Ok(object) = doc.get_object(page_id) {
                merged_pages.push((page_id, object.to_owned()));
            }
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                // Page-tree and outline structure is rebuilt from scratch
                // below; copying the originals would leave dangling refs.
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    merged_objects.insert(object_id, object);
                }
            }
        }

        if page_count > 0 {
            if let Some(first) = first_page {
                document.add_bookmark(
                    Bookmark::new(record.title.clone(), [0.0, 0.0, 0.0], 0, first),
                    None,
                );
            }
            bookmarks.push(BookmarkEntry {
                title: record.title.clone(),
                start_page: page_offset,
                page_count,
            });
            page_offset += page_count;
        }
        processed_count += 1;

        info!("added '{}' ({} pages)", record.title, page_count);
        if let Some(ref cb) = progress {
            cb.on_record_complete(
                index,
                total,
                &format!("{} ({} pages)", record.title, page_count),
            );
        }
    }

    // Read errors are the record-level error count; an outline failure
    // below is reported but does not count against the records.
    let error_count = errors.len();

    for (object_id, object) in merged_objects {
        document.objects.insert(object_id, object);
    }

    // Fresh page tree: every merged page becomes a kid of one new Pages
    // node, in volume order.
    let pages_id = document.new_object_id();
    for (page_id, object) in &merged_pages {
        if let Object::Dictionary(dict) = object {
            let mut dict = dict.clone();
            dict.set("Parent", Object::Reference(pages_id));
            document.objects.insert(*page_id, Object::Dictionary(dict));
        }
    }

    let kids: Vec<Object> = merged_pages
        .iter()
        .map(|(id, _)| Object::Reference(*id))
        .collect();
    let page_count = merged_pages.len();
    document.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(kids)),
            ("Count", Object::Integer(page_count as i64)),
        ])),
    );

    let catalog_id = document.new_object_id();
    document.objects.insert(
        catalog_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ])),
    );
    document.trailer.set("Root", Object::Reference(catalog_id));
    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.adjust_zero_pages();

    // The outline is attached last; if it cannot be, the merged pages are
    // still the deliverable.
    let mut applied_bookmarks = bookmarks;
    if let Some(outline_id) = document.build_outline() {
        if let Err(detail) = attach_outline(&mut document, outline_id) {
            let err = RecordError::Outline { detail };
            warn!("{err}");
            errors.push(err);
            applied_bookmarks.clear();
        }
    }

    document.compress();

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| BindError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    // Atomic write: save to a sibling temp path, then rename.
    let tmp_path = output_path.with_extension("pdf.tmp");
    document
        .save(&tmp_path)
        .map_err(|e| BindError::PdfWrite {
            path: output_path.to_path_buf(),
            detail: e.to_string(),
        })?;
    std::fs::rename(&tmp_path, output_path).map_err(|e| BindError::OutputWrite {
        path: output_path.to_path_buf(),
        source: e,
    })?;

    let file_size = std::fs::metadata(output_path)
        .map_err(|e| BindError::OutputWrite {
            path: output_path.to_path_buf(),
            source: e,
        })?
        .len();

    info!(
        "merged {} documents, {} pages, {} bytes -> {}",
        processed_count,
        page_count,
        file_size,
        output_path.display()
    );
    if let Some(ref cb) = progress {
        cb.on_run_complete(total, processed_count);
    }

    Ok(MergeReport {
        success: true,
        output_path: output_path.to_path_buf(),
        file_size,
        page_count,
        processed_count,
        error_count,
        bookmarks: applied_bookmarks,
        errors,
    })
}

/// Point the catalog at the freshly built outline tree.
///
/// Looks the catalog up through the trailer because `renumber_objects`
/// has rewritten every object id by the time this runs.
fn attach_outline(document: &mut Document, outline_id: ObjectId) -> Result<(), String> {
    let root_id = document
        .trailer
        .get(b"Root")
        .and_then(|o| o.as_reference())
        .map_err(|e| format!("catalog lookup failed: {e}"))?;

    match document.get_object_mut(root_id) {
        Ok(Object::Dictionary(dict)) => {
            dict.set("Outlines", Object::Reference(outline_id));
            Ok(())
        }
        Ok(_) => Err("document root is not a dictionary".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::LinkRecord;
    use lopdf::content::Content;
    use lopdf::{dictionary, Stream};

    fn record(title: &str) -> LinkRecord {
        LinkRecord {
            url: format!("/{}", title.to_lowercase()),
            title: title.to_string(),
            file_name: format!("{title}.pdf"),
        }
    }

    /// Write a minimal valid PDF with the given number of empty pages.
    fn write_pdf(path: &Path, pages: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();

        for _ in 0..pages {
            let content: Content = Content { operations: vec![] };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[tokio::test]
    async fn merges_in_manifest_order_with_bookmarks() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(
            vec![record("One"), record("Two"), record("Three")],
            "https://example.com",
        );
        write_pdf(&dir.path().join("One.pdf"), 2);
        write_pdf(&dir.path().join("Two.pdf"), 3);
        write_pdf(&dir.path().join("Three.pdf"), 1);

        let out = dir.path().join("merged.pdf");
        let report = merge_manifest(&manifest, dir.path(), &out, None)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.page_count, 6);
        assert_eq!(report.processed_count, 3);
        assert_eq!(report.error_count, 0);
        assert_eq!(
            report.bookmarks,
            vec![
                BookmarkEntry { title: "One".into(), start_page: 0, page_count: 2 },
                BookmarkEntry { title: "Two".into(), start_page: 2, page_count: 3 },
                BookmarkEntry { title: "Three".into(), start_page: 5, page_count: 1 },
            ]
        );

        // The written volume must load and carry both pages and outline.
        let merged = Document::load(&out).unwrap();
        assert_eq!(merged.get_pages().len(), 6);
        let catalog = merged.catalog().unwrap();
        assert!(catalog.get(b"Outlines").is_ok());
        assert_eq!(report.file_size, std::fs::metadata(&out).unwrap().len());
    }

    #[tokio::test]
    async fn missing_and_corrupt_files_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(
            vec![record("Good"), record("Missing"), record("Corrupt")],
            "https://example.com",
        );
        write_pdf(&dir.path().join("Good.pdf"), 2);
        std::fs::write(dir.path().join("Corrupt.pdf"), b"not a pdf at all").unwrap();

        let out = dir.path().join("merged.pdf");
        let report = merge_manifest(&manifest, dir.path(), &out, None)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.page_count, 2);
        assert_eq!(report.bookmarks.len(), 1);
        assert!(matches!(report.errors[0], RecordError::PdfMissing { .. }));
        assert!(matches!(report.errors[1], RecordError::PdfUnreadable { .. }));
        assert!(out.exists());
    }

    #[tokio::test]
    async fn zero_processed_records_still_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(vec![record("Ghost")], "https://example.com");

        let out = dir.path().join("merged.pdf");
        let report = merge_manifest(&manifest, dir.path(), &out, None)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.processed_count, 0);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.page_count, 0);
        assert!(report.bookmarks.is_empty());
        assert!(out.exists());
    }

    #[tokio::test]
    async fn output_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new(vec![record("One")], "https://example.com");
        write_pdf(&dir.path().join("One.pdf"), 1);

        let out = dir.path().join("nested").join("deep").join("merged.pdf");
        let report = merge_manifest(&manifest, dir.path(), &out, None)
            .await
            .unwrap();

        assert!(report.success);
        assert!(out.exists());
    }
}
