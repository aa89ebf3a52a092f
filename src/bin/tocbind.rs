//! CLI binary for tocbind.
//!
//! A thin shim over the library crate that maps CLI flags to the stage
//! drivers and prints per-record progress plus a run summary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tocbind::{
    merge_manifest, render_manifest, CommandRenderer, Manifest, ProxyConfig, RenderConfig,
    RunProgressCallback,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-record
/// log lines. Records are processed strictly in order, so a single slot is
/// enough to track the running record's start time.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new(prefix: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix(prefix);
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_records: usize) {
        self.bar.set_length(total_records as u64);
    }

    fn on_record_start(&self, index: usize, total: usize, title: &str) {
        *self.started.lock().unwrap() = Some(Instant::now());
        self.bar
            .println(format!("[{index}/{total}] Processing: {title}"));
    }

    fn on_record_complete(&self, _index: usize, _total: usize, detail: &str) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            detail,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_record_skipped(&self, _index: usize, _total: usize, detail: &str) {
        self.elapsed_secs();
        self.bar
            .println(format!("  {} {}", yellow("⏭"), dim(detail)));
        self.bar.inc(1);
    }

    fn on_record_error(&self, _index: usize, _total: usize, error: &str) {
        let secs = self.elapsed_secs();
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 120 {
            let cut: String = error.chars().take(119).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _total_records: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # 1. Extract chapter links from a saved table-of-contents page
  tocbind extract --html toc.html --base-url https://example.com/book

  # 2. Render every chapter to ./data/pdfs (re-runs skip existing files)
  tocbind render --json ./data/extracted_urls.json

  # Render only a DOM subtree, through an authenticated proxy
  tocbind render --selector div.book \
      --proxy http://proxy.example.com:8080 \
      --proxy-username user --proxy-password pass

  # Use a different page-to-PDF command
  tocbind render --render-command "node savepdf/savepdf.js"

  # 3. Bind the rendered chapters into one bookmarked volume
  tocbind merge --output book.pdf

  # Machine-readable merge report
  tocbind merge --report-json > report.json

RENDER COMMAND CONTRACT:
  The command configured via --render-command is invoked once per chapter as

      <command> --url=<absolute URL> --fileName=<name> --outputDir=<dir>
                [--selector=<css>] [--proxy=<url>]
                [--proxyUsername=<user>] [--proxyPassword=<pass>]

  and must create <dir>/<name> and exit 0. Anything else counts as a failed
  attempt and is retried with exponential backoff (1s, 2s, 4s, ...).
"#;

/// Scrape a chapter index, render each chapter to PDF, and bind the results
/// into one bookmarked volume.
#[derive(Parser, Debug)]
#[command(
    name = "tocbind",
    version,
    about = "Scrape a chapter index, render each chapter to PDF, and bind them into one bookmarked volume",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TOCBIND_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TOCBIND_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "TOCBIND_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract chapter links from a table-of-contents HTML file.
    Extract {
        /// Path to the input HTML file.
        #[arg(long)]
        html: PathBuf,

        /// Base URL relative chapter links resolve against.
        #[arg(long)]
        base_url: String,

        /// Output manifest path.
        #[arg(long, default_value = "./data/extracted_urls.json")]
        out: PathBuf,
    },

    /// Render every manifest record to a PDF via the external command.
    Render {
        /// Manifest produced by `extract`.
        #[arg(long, default_value = "./data/extracted_urls.json")]
        json: PathBuf,

        /// Directory the rendered PDFs are written to.
        #[arg(long, default_value = "./data/pdfs")]
        output_dir: PathBuf,

        /// Retries per record on render failure.
        #[arg(long, default_value_t = 3, env = "TOCBIND_MAX_RETRIES")]
        max_retries: u32,

        /// CSS selector for the DOM subtree to render (e.g. 'div.book').
        #[arg(long)]
        selector: Option<String>,

        /// Proxy server URL (e.g. 'http://proxy.example.com:8080').
        #[arg(long, env = "TOCBIND_PROXY")]
        proxy: Option<String>,

        /// Username for proxy authentication.
        #[arg(long, requires = "proxy")]
        proxy_username: Option<String>,

        /// Password for proxy authentication.
        #[arg(long, requires = "proxy")]
        proxy_password: Option<String>,

        /// Page-to-PDF command, whitespace-separated (program + fixed args).
        #[arg(long, default_value = "savepdf", env = "TOCBIND_RENDER_COMMAND")]
        render_command: String,
    },

    /// Merge rendered PDFs into one bookmarked volume.
    Merge {
        /// Manifest produced by `extract`.
        #[arg(long, default_value = "./data/extracted_urls.json")]
        json: PathBuf,

        /// Directory containing the rendered PDFs.
        #[arg(long, default_value = "./data/pdfs")]
        pdf_dir: PathBuf,

        /// Output path for the merged volume.
        #[arg(long, default_value = "./data/merged.pdf")]
        output: PathBuf,

        /// Print the structured merge report as JSON on stdout.
        #[arg(long)]
        report_json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Extract { html, base_url, out } => run_extract(html, base_url, out, cli.quiet).await,
        Commands::Render {
            json,
            output_dir,
            max_retries,
            selector,
            proxy,
            proxy_username,
            proxy_password,
            render_command,
        } => {
            run_render(
                json,
                output_dir,
                max_retries,
                selector,
                proxy,
                proxy_username,
                proxy_password,
                render_command,
                cli.quiet,
                show_progress,
            )
            .await
        }
        Commands::Merge {
            json,
            pdf_dir,
            output,
            report_json,
        } => run_merge(json, pdf_dir, output, report_json, cli.quiet, show_progress).await,
    }
}

async fn run_extract(html: PathBuf, base_url: String, out: PathBuf, quiet: bool) -> Result<()> {
    tocbind::manifest::validate_base_url(&base_url)?;

    let text = tokio::fs::read_to_string(&html)
        .await
        .with_context(|| format!("failed to read HTML from '{}'", html.display()))?;

    let manifest = tocbind::extract_manifest(&text, &base_url);
    manifest.save(&out).await?;

    if !quiet {
        println!(
            "Extracted {} links -> {}",
            bold(&manifest.total_count.to_string()),
            out.display()
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_render(
    json: PathBuf,
    output_dir: PathBuf,
    max_retries: u32,
    selector: Option<String>,
    proxy: Option<String>,
    proxy_username: Option<String>,
    proxy_password: Option<String>,
    render_command: String,
    quiet: bool,
    show_progress: bool,
) -> Result<()> {
    let manifest = Manifest::load(&json).await?;

    let command: Vec<String> = render_command
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut builder = RenderConfig::builder()
        .command(command)
        .max_retries(max_retries);
    if let Some(selector) = selector {
        builder = builder.selector(selector);
    }
    if let Some(url) = proxy {
        builder = builder.proxy(ProxyConfig {
            url,
            username: proxy_username,
            password: proxy_password,
        });
    }
    if show_progress {
        builder = builder.progress_callback(CliProgressCallback::new("Rendering"));
    }
    let config = builder.build()?;
    let renderer = CommandRenderer::from_config(&config);

    let report = render_manifest(&manifest, &output_dir, &renderer, &config)
        .await
        .context("render run failed")?;

    if !quiet {
        println!("\n=== Processing completed ===");
        println!("Total: {} pages", report.total);
        println!("Success: {} pages", report.succeeded);
        println!("Skipped: {} pages (already exist)", report.skipped);
        if report.failed > 0 {
            println!("{}", red(&format!("Failed: {} pages", report.failed)));
        } else {
            println!("Failed: 0 pages");
        }
    }
    Ok(())
}

async fn run_merge(
    json: PathBuf,
    pdf_dir: PathBuf,
    output: PathBuf,
    report_json: bool,
    quiet: bool,
    show_progress: bool,
) -> Result<()> {
    let manifest = Manifest::load(&json).await?;

    let progress: Option<tocbind::ProgressCallback> = if show_progress && !report_json {
        Some(CliProgressCallback::new("Merging"))
    } else {
        None
    };

    let report = merge_manifest(&manifest, &pdf_dir, &output, progress)
        .await
        .context("merge failed")?;

    if report_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialise merge report")?
        );
        return Ok(());
    }

    if !quiet {
        let tick = if report.error_count == 0 {
            green("✔")
        } else {
            yellow("⚠")
        };
        println!(
            "{} merged {}/{} documents → {}",
            tick,
            bold(&report.processed_count.to_string()),
            manifest.total_count,
            bold(&report.output_path.display().to_string()),
        );
        println!(
            "   {} pages  /  {} bookmarks  /  {} bytes",
            report.page_count,
            report.bookmarks.len(),
            report.file_size
        );
        if report.error_count > 0 {
            println!(
                "{}",
                red(&format!("   {} records had errors", report.error_count))
            );
            for err in &report.errors {
                println!("   {} {}", red("✗"), err);
            }
        }
    }
    Ok(())
}
