//! Render driver: produce one PDF per manifest record via an external
//! command.
//!
//! The actual page-to-PDF conversion is delegated to a headless-browser
//! subprocess and treated as opaque: it either leaves the expected file in
//! the output directory or it doesn't. This module owns everything around
//! that call — URL resolution, skip-if-exists idempotence, retry with
//! exponential backoff, and the run summary.
//!
//! ## Retry Strategy
//!
//! Render failures are usually transient (slow page, flaky proxy, browser
//! start-up race). Exponential backoff (`retry_backoff_secs * 2^attempt`)
//! gives the remote site room to recover: with a 1 s base and 3 retries the
//! wait sequence is 1 s → 2 s → 4 s. A record that exhausts its retries is
//! recorded as failed and the run continues with the next record.
//!
//! ## The renderer seam
//!
//! [`PageRenderer`] is a single-operation capability trait so the driver
//! logic can be exercised against fakes in tests without ever spawning a
//! real browser. [`CommandRenderer`] is the production implementation.

use crate::config::RenderConfig;
use crate::error::{BindError, RecordError};
use crate::manifest::{LinkRecord, Manifest};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// One render invocation: fetch `url` and leave `file_name` in `output_dir`.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    /// Fully resolved absolute URL of the page to render.
    pub url: &'a str,
    /// Output file name, unique within the manifest.
    pub file_name: &'a str,
    /// Directory the output file must appear in.
    pub output_dir: &'a Path,
}

/// Why a single render attempt failed.
#[derive(Debug, Error)]
pub enum RenderFailure {
    /// The command exited non-zero.
    #[error("renderer {status}: {stderr}")]
    Command { status: String, stderr: String },

    /// The command exited 0 but the expected file never appeared.
    #[error("renderer exited successfully but '{file_name}' was not created")]
    OutputMissing { file_name: String },

    /// The command could not be spawned at all.
    #[error("failed to launch renderer: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Capability interface for rendering one page to a PDF file.
///
/// Implementations must create `output_dir/file_name` before returning
/// `Ok(())` — the driver trusts the result and does not re-check.
pub trait PageRenderer: Send + Sync {
    /// Render one page, creating the requested output file on success.
    fn render(
        &self,
        request: &RenderRequest<'_>,
    ) -> impl Future<Output = Result<(), RenderFailure>> + Send;
}

/// Production renderer: invokes the configured external command.
///
/// Flags follow the savepdf convention: `--url=`, `--fileName=`,
/// `--outputDir=`, plus `--selector=` and the `--proxy*` family when
/// configured. Success requires both a zero exit status *and* the output
/// file actually existing afterwards.
pub struct CommandRenderer {
    command: Vec<String>,
    selector: Option<String>,
    proxy: Option<crate::config::ProxyConfig>,
}

impl CommandRenderer {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            command: config.command.clone(),
            selector: config.selector.clone(),
            proxy: config.proxy.clone(),
        }
    }

    /// Assemble the full argv for one request, program included.
    fn build_command(&self, request: &RenderRequest<'_>) -> Vec<String> {
        let mut argv = self.command.clone();
        argv.push(format!("--url={}", request.url));
        argv.push(format!("--fileName={}", request.file_name));
        argv.push(format!("--outputDir={}", request.output_dir.display()));

        if let Some(ref selector) = self.selector {
            argv.push(format!("--selector={}", selector));
        }
        if let Some(ref proxy) = self.proxy {
            argv.push(format!("--proxy={}", proxy.url));
            if let Some(ref user) = proxy.username {
                argv.push(format!("--proxyUsername={}", user));
            }
            if let Some(ref pass) = proxy.password {
                argv.push(format!("--proxyPassword={}", pass));
            }
        }
        argv
    }
}

impl PageRenderer for CommandRenderer {
    async fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderFailure> {
        let argv = self.build_command(request);
        debug!("spawning renderer: {:?}", argv);

        let output = Command::new(&argv[0]).args(&argv[1..]).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                "unknown error".to_string()
            } else {
                stderr
            };
            let status = match output.status.code() {
                Some(code) => format!("exited with code {code}"),
                None => "was terminated by a signal".to_string(),
            };
            return Err(RenderFailure::Command { status, stderr });
        }

        // A zero exit is not enough: headless browsers have been seen
        // reporting success after writing nothing.
        if !request.output_dir.join(request.file_name).exists() {
            return Err(RenderFailure::OutputMissing {
                file_name: request.file_name.to_string(),
            });
        }

        Ok(())
    }
}

/// Per-record outcome of a render run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Success,
    Skipped,
    Failed,
}

/// Outcome of one manifest record, including how many command invocations
/// it took. Skipped records never invoke the command (`attempts == 0`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderResult {
    pub file_name: String,
    pub status: RenderStatus,
    pub attempts: u32,
}

/// Summary of a whole render run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<RenderResult>,
}

/// Render every manifest record into `output_dir`, in manifest order.
///
/// Records whose output file already exists are skipped, which makes
/// re-running the stage over a partially rendered directory cheap and safe.
/// A record that fails after all retries is recorded and the run continues;
/// only being unable to create the output directory is fatal.
pub async fn render_manifest<R: PageRenderer>(
    manifest: &Manifest,
    output_dir: &Path,
    renderer: &R,
    config: &RenderConfig,
) -> Result<RenderReport, BindError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| BindError::CreateDir {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

    let total = manifest.links.len();
    info!(
        "rendering {} pages into {}",
        total,
        output_dir.display()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let mut results = Vec::with_capacity(total);
    let (mut succeeded, mut failed, mut skipped) = (0usize, 0usize, 0usize);

    for (idx, record) in manifest.links.iter().enumerate() {
        let index = idx + 1;
        if let Some(ref cb) = config.progress_callback {
            cb.on_record_start(index, total, &record.title);
        }

        if output_dir.join(&record.file_name).exists() {
            debug!("'{}' already exists, skipping", record.file_name);
            skipped += 1;
            results.push(RenderResult {
                file_name: record.file_name.clone(),
                status: RenderStatus::Skipped,
                attempts: 0,
            });
            if let Some(ref cb) = config.progress_callback {
                cb.on_record_skipped(
                    index,
                    total,
                    &format!("{} (already exists)", record.file_name),
                );
            }
            continue;
        }

        let url = manifest.resolve_url(record);
        match render_with_retry(renderer, &url, record, output_dir, config).await {
            Ok(attempts) => {
                succeeded += 1;
                results.push(RenderResult {
                    file_name: record.file_name.clone(),
                    status: RenderStatus::Success,
                    attempts,
                });
                if let Some(ref cb) = config.progress_callback {
                    cb.on_record_complete(index, total, &record.file_name);
                }
            }
            Err(err) => {
                failed += 1;
                warn!("{err}");
                let attempts = match &err {
                    RecordError::Render { attempts, .. } => *attempts,
                    _ => 0,
                };
                results.push(RenderResult {
                    file_name: record.file_name.clone(),
                    status: RenderStatus::Failed,
                    attempts,
                });
                if let Some(ref cb) = config.progress_callback {
                    cb.on_record_error(index, total, &err.to_string());
                }
            }
        }
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, succeeded);
    }
    info!(
        "render run finished: {} ok, {} failed, {} skipped",
        succeeded, failed, skipped
    );

    Ok(RenderReport {
        total,
        succeeded,
        failed,
        skipped,
        results,
    })
}

/// Drive one record through up to `max_retries + 1` attempts.
///
/// Returns the number of attempts it took on success. The backoff sleep
/// before attempt N is `retry_backoff_secs * 2^(N-1)` seconds, i.e. the
/// wait after the failed attempt counted from zero.
async fn render_with_retry<R: PageRenderer>(
    renderer: &R,
    url: &str,
    record: &LinkRecord,
    output_dir: &Path,
    config: &RenderConfig,
) -> Result<u32, RecordError> {
    let request = RenderRequest {
        url,
        file_name: &record.file_name,
        output_dir,
    };

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let wait = config.retry_backoff_secs * 2u64.pow(attempt - 1);
            warn!(
                "'{}': retry {}/{} after {}s",
                record.file_name, attempt, config.max_retries, wait
            );
            sleep(Duration::from_secs(wait)).await;
        }

        info!("visiting: {}", url);
        match renderer.render(&request).await {
            Ok(()) => {
                debug!("'{}' saved on attempt {}", record.file_name, attempt + 1);
                return Ok(attempt + 1);
            }
            Err(e) => {
                warn!(
                    "'{}': attempt {} failed — {}",
                    record.file_name,
                    attempt + 1,
                    e
                );
                last_err = Some(e.to_string());
            }
        }
    }

    Err(RecordError::Render {
        file_name: record.file_name.clone(),
        attempts: config.max_retries + 1,
        detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::safe_file_name;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn manifest(titles: &[&str]) -> Manifest {
        let links = titles
            .iter()
            .enumerate()
            .map(|(i, t)| LinkRecord {
                url: format!("/ch{}", i + 1),
                title: t.to_string(),
                file_name: safe_file_name(t),
            })
            .collect();
        Manifest::new(links, "https://example.com/book")
    }

    /// Fake renderer: fails the first `failures` calls per run, then
    /// succeeds by touching the requested file. Records every URL seen.
    struct FakeRenderer {
        failures: u32,
        calls: AtomicU32,
        urls: Mutex<Vec<String>>,
    }

    impl FakeRenderer {
        fn failing_first(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl PageRenderer for FakeRenderer {
        async fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(request.url.to_string());
            if call < self.failures {
                return Err(RenderFailure::Command {
                    status: "exited with code 1".into(),
                    stderr: "net::ERR_CONNECTION_RESET".into(),
                });
            }
            std::fs::write(request.output_dir.join(request.file_name), b"%PDF-")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn renders_every_record_and_resolves_urls() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(&["One", "Two"]);
        let renderer = FakeRenderer::failing_first(0);
        let config = RenderConfig::default();

        let report = render_manifest(&manifest, dir.path(), &renderer, &config)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(
            *renderer.urls.lock().unwrap(),
            vec![
                "https://example.com/book/ch1".to_string(),
                "https://example.com/book/ch2".to_string(),
            ]
        );
        assert!(dir.path().join("One.pdf").exists());
        assert!(dir.path().join("Two.pdf").exists());
    }

    #[tokio::test]
    async fn second_run_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(&["One", "Two"]);
        let config = RenderConfig::default();

        let first = FakeRenderer::failing_first(0);
        render_manifest(&manifest, dir.path(), &first, &config)
            .await
            .unwrap();

        let second = FakeRenderer::failing_first(0);
        let report = render_manifest(&manifest, dir.path(), &second, &config)
            .await
            .unwrap();

        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.succeeded, 0);
        assert!(report
            .results
            .iter()
            .all(|r| r.status == RenderStatus::Skipped && r.attempts == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(&["One"]);
        let renderer = FakeRenderer::failing_first(2);
        let config = RenderConfig::default();

        let started = tokio::time::Instant::now();
        let report = render_manifest(&manifest, dir.path(), &renderer, &config)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.results[0].attempts, 3);
        // Backoff slept 1 s after the first failure and 2 s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(&["Bad", "Good"]);
        // 4 failures cover every attempt for "Bad" (max_retries 3 ⇒ 4
        // invocations); "Good" then succeeds on its first try.
        let renderer = FakeRenderer::failing_first(4);
        let config = RenderConfig::default();

        let report = render_manifest(&manifest, dir.path(), &renderer, &config)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.results[0].status, RenderStatus::Failed);
        assert_eq!(report.results[0].attempts, 4);
        assert_eq!(report.results[1].status, RenderStatus::Success);
        assert!(dir.path().join("Good.pdf").exists());
        assert!(!dir.path().join("Bad.pdf").exists());
    }

    #[test]
    fn command_renderer_marshals_all_flags() {
        let config = RenderConfig::builder()
            .command(["node", "savepdf.js"])
            .selector("div.book")
            .proxy(crate::config::ProxyConfig {
                url: "http://proxy.example.com:8080".into(),
                username: Some("user".into()),
                password: Some("secret".into()),
            })
            .build()
            .unwrap();
        let renderer = CommandRenderer::from_config(&config);

        let out_dir = Path::new("/tmp/pdfs");
        let argv = renderer.build_command(&RenderRequest {
            url: "https://example.com/book/ch1",
            file_name: "Chapter 1.pdf",
            output_dir: out_dir,
        });

        assert_eq!(argv[0], "node");
        assert_eq!(argv[1], "savepdf.js");
        assert!(argv.contains(&"--url=https://example.com/book/ch1".to_string()));
        assert!(argv.contains(&"--fileName=Chapter 1.pdf".to_string()));
        assert!(argv.contains(&"--outputDir=/tmp/pdfs".to_string()));
        assert!(argv.contains(&"--selector=div.book".to_string()));
        assert!(argv.contains(&"--proxy=http://proxy.example.com:8080".to_string()));
        assert!(argv.contains(&"--proxyUsername=user".to_string()));
        assert!(argv.contains(&"--proxyPassword=secret".to_string()));
    }

    #[test]
    fn command_renderer_omits_unset_flags() {
        let config = RenderConfig::default();
        let renderer = CommandRenderer::from_config(&config);
        let argv = renderer.build_command(&RenderRequest {
            url: "https://example.com/x",
            file_name: "x.pdf",
            output_dir: Path::new("out"),
        });
        assert!(argv.iter().all(|a| !a.starts_with("--selector")));
        assert!(argv.iter().all(|a| !a.starts_with("--proxy")));
    }
}
