//! Configuration types for the render stage.
//!
//! All render behaviour is controlled through [`RenderConfig`], built via its
//! [`RenderConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs between the CLI and library callers and to diff two runs
//! to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! The render driver grows knobs over time (selector, proxy credentials,
//! command override). The builder lets callers set only what they care about
//! and rely on well-documented defaults for the rest.

use crate::error::BindError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Configuration for rendering manifest entries to PDF files.
///
/// Built via [`RenderConfig::builder()`] or using
/// [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use tocbind::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .max_retries(5)
///     .selector("div.book")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// The external page-to-PDF command: program name followed by any fixed
    /// leading arguments. Default: `["savepdf"]`.
    ///
    /// The command is invoked once per manifest record with
    /// `--url=`, `--fileName=`, and `--outputDir=` appended (plus selector
    /// and proxy flags when configured), and must create
    /// `<outputDir>/<fileName>` and exit 0 on success. Exit 0 *without* the
    /// file appearing is treated as a failure — headless browsers sometimes
    /// report success after silently writing nothing.
    pub command: Vec<String>,

    /// Maximum retry attempts after a failed render. Default: 3.
    ///
    /// A record is invoked up to `max_retries + 1` times in total. Most
    /// render failures are transient (slow page load, proxy hiccup); three
    /// retries catch the vast majority. A record that still fails is
    /// recorded and the run moves on to the next one.
    pub max_retries: u32,

    /// Initial retry delay in seconds (exponential backoff). Default: 1.
    ///
    /// Doubles after each failed attempt: 1 s → 2 s → 4 s. The delay gives
    /// a struggling site or proxy time to recover instead of hammering it
    /// with immediate re-requests.
    pub retry_backoff_secs: u64,

    /// CSS selector restricting which DOM subtree the command renders,
    /// e.g. `div.book`. Forwarded as `--selector=`. Default: none.
    pub selector: Option<String>,

    /// Proxy settings forwarded to the render command. Default: none.
    pub proxy: Option<ProxyConfig>,

    /// Progress callback fired per record. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

/// Proxy settings for the external render command.
#[derive(Clone)]
pub struct ProxyConfig {
    /// Proxy server URL, e.g. `http://proxy.example.com:8080`.
    pub url: String,
    /// Username for proxy authentication.
    pub username: Option<String>,
    /// Password for proxy authentication.
    pub password: Option<String>,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: vec!["savepdf".to_string()],
            max_retries: 3,
            retry_backoff_secs: 1,
            selector: None,
            proxy: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("command", &self.command)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_secs", &self.retry_backoff_secs)
            .field("selector", &self.selector)
            .field("proxy", &self.proxy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RenderConfig`].
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    /// Replace the external render command (program + fixed leading args).
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_secs(mut self, secs: u64) -> Self {
        self.config.retry_backoff_secs = secs;
        self
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.config.selector = Some(selector.into());
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, BindError> {
        let c = &self.config;
        if c.command.is_empty() || c.command[0].trim().is_empty() {
            return Err(BindError::InvalidConfig(
                "render command must name a program".into(),
            ));
        }
        if let Some(ref proxy) = c.proxy {
            if proxy.url.trim().is_empty() {
                return Err(BindError::InvalidConfig("proxy URL must not be empty".into()));
            }
        }
        Ok(self.config)
    }
}
