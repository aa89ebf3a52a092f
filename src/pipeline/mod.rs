//! Pipeline stages for building a bookmarked volume from a chapter index.
//!
//! Each submodule implements exactly one stage. The stages share no process
//! state — each one reads the previous stage's output from disk — so keeping
//! them separate makes each independently testable and lets a run resume at
//! any stage.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ render ──▶ merge
//! (HTML→manifest) (subprocess→PDFs) (PDFs→one volume)
//! ```
//!
//! 1. [`extract`] — scan the TOC page's anchors into an ordered manifest
//! 2. [`render`]  — drive the external page-to-PDF command per record, with
//!    skip-if-exists idempotence and exponential-backoff retry; the only
//!    stage that spawns subprocesses
//! 3. [`merge`]   — concatenate the rendered PDFs in manifest order and
//!    attach one outline entry per chapter; runs on a blocking worker
//!    thread because lopdf is CPU-bound

pub mod extract;
pub mod merge;
pub mod render;
